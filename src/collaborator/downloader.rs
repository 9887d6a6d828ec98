use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use super::process::{Invocation, RUN_ID_ENV, evaluate};
use super::{StageError, StatementDownloader, StatusPolicy};
use crate::config::{DownloaderConfig, StageReportConfig};
use crate::request::{DATE_FORMAT, DateRange};

/// Marker preceding a statement path in csas-statement-tools'
/// `processed_files` entries, e.g. `Processed /srv/2025-09-01.abo: 12 rows`.
const PROCESSED_MARKER: &str = "Processed ";

/// Runs the bank statement downloader as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandDownloader {
    config: DownloaderConfig,
    policy: StatusPolicy,
}

impl CommandDownloader {
    pub fn new(config: DownloaderConfig, policy: StatusPolicy) -> Self {
        Self { config, policy }
    }

    /// Builds the command line for one download.
    pub fn invocation(&self, run_id: &str, window: &DateRange, output_dir: &Path) -> Invocation {
        let mut directory = OsString::from(&self.config.directory_flag);
        directory.push(output_dir.as_os_str());

        Invocation::new(&self.config.program)
            .args(&self.config.args)
            .arg(directory)
            .arg(format!("{}{}", self.config.format_flag, self.config.format))
            .arg(&self.config.output_flag)
            .arg(&self.config.report_target)
            .env(&self.config.from_env, window.from().format(DATE_FORMAT).to_string())
            .env(&self.config.to_env, window.to().format(DATE_FORMAT).to_string())
            .env(RUN_ID_ENV, run_id)
    }
}

impl StatementDownloader for CommandDownloader {
    #[instrument(
        level = "info",
        skip_all,
        fields(window = %window, output_dir = %output_dir.display())
    )]
    fn download(
        &self,
        run_id: &str,
        window: &DateRange,
        output_dir: &Path,
    ) -> Result<Value, StageError> {
        let invocation = self.invocation(run_id, window, output_dir);
        let output = invocation.run()?;
        let report_text = output.stdout.clone();
        let report = evaluate(invocation.program(), output, &report_text, &self.policy)?;
        info!("downloader report accepted");
        Ok(report)
    }
}

/// Collects the statement files listed in a downloader report.
///
/// The `files` pointers are tried first; their entries are plain paths or
/// objects with a `path` member. The `processed_files` pointers are tried
/// next; only `Processed <path>: ...` lines count there. The first pointer
/// resolving to an array decides the result, so an empty array is a valid
/// empty list. A report where no pointer resolves is rejected.
pub fn extract_statement_files(
    report: &Value,
    config: &StageReportConfig,
) -> Result<Vec<PathBuf>, StageError> {
    let listed = config
        .files
        .iter()
        .map(|pointer| (pointer, EntryStyle::Listed))
        .chain(
            config
                .processed_files
                .iter()
                .map(|pointer| (pointer, EntryStyle::Processed)),
        );

    for (pointer, style) in listed {
        let Some(entries) = report.pointer(pointer).and_then(Value::as_array) else {
            continue;
        };
        let files: Vec<PathBuf> = entries
            .iter()
            .filter_map(|entry| style.path_of(entry))
            .collect();
        debug!(
            pointer = %pointer,
            entries = entries.len(),
            files = files.len(),
            "extracted statement files"
        );
        return Ok(files);
    }

    let pointers: Vec<String> = config
        .files
        .iter()
        .chain(&config.processed_files)
        .cloned()
        .collect();
    warn!(pointers = ?pointers, "downloader report has no statement file list");
    Err(StageError::MissingFileList {
        pointers,
        report: report.clone(),
    })
}

#[derive(Debug, Clone, Copy)]
enum EntryStyle {
    Listed,
    Processed,
}

impl EntryStyle {
    fn path_of(self, entry: &Value) -> Option<PathBuf> {
        match (self, entry) {
            (EntryStyle::Listed, Value::String(text)) => non_blank(text),
            (EntryStyle::Listed, Value::Object(object)) => {
                object.get("path").and_then(Value::as_str).and_then(non_blank)
            }
            (EntryStyle::Processed, Value::String(text)) => processed_path(text),
            _ => None,
        }
    }
}

fn non_blank(text: &str) -> Option<PathBuf> {
    let text = text.trim();
    (!text.is_empty()).then(|| PathBuf::from(text))
}

fn processed_path(text: &str) -> Option<PathBuf> {
    let start = text.find(PROCESSED_MARKER)? + PROCESSED_MARKER.len();
    let rest = &text[start..];
    let end = rest.find(':')?;
    non_blank(&rest[..end])
}
