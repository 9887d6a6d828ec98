use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempPath;
use tracing::{debug, info, instrument};

use super::process::{Invocation, RUN_ID_ENV, evaluate};
use super::{StageError, StatementImporter, StatusPolicy};
use crate::config::{ImporterConfig, ReportSource};
use crate::request::PohodaConnection;

/// Runs the Pohoda ABO importer as a subprocess.
#[derive(Debug, Clone)]
pub struct CommandImporter {
    config: ImporterConfig,
    policy: StatusPolicy,
}

impl CommandImporter {
    pub fn new(config: ImporterConfig, policy: StatusPolicy) -> Self {
        Self { config, policy }
    }

    /// Builds the command line for one import, writing the report to `target`.
    /// The token travels in the environment only.
    pub fn invocation(
        &self,
        run_id: &str,
        statements: &[PathBuf],
        pohoda: &PohodaConnection,
        target: &Path,
    ) -> Invocation {
        Invocation::new(&self.config.program)
            .args(&self.config.args)
            .arg(&self.config.output_flag)
            .arg(target.as_os_str())
            .args(statements.iter().map(|path| path.as_os_str()))
            .env(&self.config.url_env, pohoda.url())
            .env(&self.config.token_env, pohoda.token())
            .env(RUN_ID_ENV, run_id)
    }

    fn import_via_stdout(
        &self,
        run_id: &str,
        statements: &[PathBuf],
        pohoda: &PohodaConnection,
    ) -> Result<Value, StageError> {
        let target = Path::new(&self.config.report_target);
        let invocation = self.invocation(run_id, statements, pohoda, target);
        let output = invocation.run()?;
        let report_text = output.stdout.clone();
        evaluate(invocation.program(), output, &report_text, &self.policy)
    }

    fn import_via_file(
        &self,
        run_id: &str,
        statements: &[PathBuf],
        pohoda: &PohodaConnection,
    ) -> Result<Value, StageError> {
        let report_path = temporary_report_path()?;
        debug!(report = %report_path.display(), "importer writes report to file");

        let invocation = self.invocation(run_id, statements, pohoda, &report_path);
        let output = invocation.run()?;

        let report_text = match fs::read_to_string(&report_path) {
            Ok(text) => text,
            // An unsuccessful run is reported by its exit status.
            Err(_) if !output.success => String::new(),
            Err(err) => return Err(StageError::ReportFile(err)),
        };
        evaluate(invocation.program(), output, &report_text, &self.policy)
    }
}

fn temporary_report_path() -> Result<TempPath, StageError> {
    tempfile::Builder::new()
        .prefix("statement-sync-import-")
        .suffix(".json")
        .tempfile()
        .map(|file| file.into_temp_path())
        .map_err(StageError::ReportFile)
}

impl StatementImporter for CommandImporter {
    #[instrument(
        level = "info",
        skip_all,
        fields(statements = statements.len(), source = ?self.config.report_source)
    )]
    fn import(
        &self,
        run_id: &str,
        statements: &[PathBuf],
        pohoda: &PohodaConnection,
    ) -> Result<Value, StageError> {
        let report = match self.config.report_source {
            ReportSource::Stdout => self.import_via_stdout(run_id, statements, pohoda)?,
            ReportSource::File => self.import_via_file(run_id, statements, pohoda)?,
        };
        info!("importer report accepted");
        Ok(report)
    }
}
