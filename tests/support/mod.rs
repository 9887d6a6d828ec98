//! Shell-script stand-ins for the downloader and the importer.
//!
//! Each fake records its arguments and relevant environment into files next
//! to the script so tests can check how it was invoked, then prints (or
//! writes) a canned JSON report.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use statement_sync::config::{DownloaderConfig, ImporterConfig, ReportSource};

/// A directory holding fake collaborator scripts and what they recorded.
pub struct Fakes {
    root: PathBuf,
}

impl Fakes {
    pub fn new(root: &Path) -> Self {
        let root = root.join("fakes");
        fs::create_dir_all(&root).expect("fakes directory");
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// A downloader that prints `report` and exits with `code`.
    pub fn downloader(&self, report: &str, code: i32) -> DownloaderConfig {
        let record = self.root.display();
        let body = format!(
            r#"printf '%s\n' "$@" > "{record}/downloader.args"
printf '%s %s\n' "$STATEMENT_FROM" "$STATEMENT_TO" > "{record}/downloader.window"
printf '%s\n' "$STATEMENT_SYNC_RUN_ID" > "{record}/downloader.run_id"
echo "downloader diagnostics" >&2
cat <<'REPORT'
{report}
REPORT
exit {code}
"#
        );
        DownloaderConfig {
            program: "sh".to_string(),
            args: vec![self.script("downloader.sh", &body)],
            ..DownloaderConfig::default()
        }
    }

    /// An importer that prints `report` on standard output and exits with
    /// `code`.
    pub fn importer(&self, report: &str, code: i32) -> ImporterConfig {
        let record = self.root.display();
        let body = format!(
            r#"printf '%s\n' "$@" > "{record}/importer.args"
printf '%s %s\n' "$POHODA_URL" "$POHODA_TOKEN" > "{record}/importer.env"
printf '%s\n' "$STATEMENT_SYNC_RUN_ID" > "{record}/importer.run_id"
echo "importer diagnostics" >&2
cat <<'REPORT'
{report}
REPORT
exit {code}
"#
        );
        ImporterConfig {
            program: "sh".to_string(),
            args: vec![self.script("importer.sh", &body)],
            ..ImporterConfig::default()
        }
    }

    /// An importer that writes `report` into the file named after `-o`.
    pub fn file_importer(&self, report: &str) -> ImporterConfig {
        let record = self.root.display();
        let body = format!(
            r#"out=""
: > "{record}/importer.args"
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    *) printf '%s\n' "$1" >> "{record}/importer.args"; shift ;;
  esac
done
cat > "$out" <<'REPORT'
{report}
REPORT
"#
        );
        ImporterConfig {
            program: "sh".to_string(),
            args: vec![self.script("importer.sh", &body)],
            report_source: ReportSource::File,
            ..ImporterConfig::default()
        }
    }

    pub fn importer_ran(&self) -> bool {
        self.root.join("importer.args").exists()
    }

    pub fn downloader_ran(&self) -> bool {
        self.root.join("downloader.args").exists()
    }

    /// Lines recorded by a fake, e.g. `recorded("importer.args")`.
    pub fn recorded(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.root.join(name))
            .expect("recorded file")
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn script(&self, name: &str, body: &str) -> String {
        let path = self.root.join(name);
        fs::write(&path, body).expect("script written");
        path.to_string_lossy().into_owned()
    }
}

/// Renders a settings file pointing at the given collaborators.
pub fn settings_toml(downloader: &DownloaderConfig, importer: &ImporterConfig) -> String {
    let source = match importer.report_source {
        ReportSource::Stdout => "stdout",
        ReportSource::File => "file",
    };
    format!(
        r#"[downloader]
program = "{}"
args = ["{}"]

[importer]
program = "{}"
args = ["{}"]
report_source = "{source}"
"#,
        downloader.program, downloader.args[0], importer.program, importer.args[0]
    )
}
