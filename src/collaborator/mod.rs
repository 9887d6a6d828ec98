//! The two external programs the orchestrator drives, and how their failures
//! are described.

pub mod downloader;
pub mod importer;
pub mod process;

use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::config::StageReportConfig;
use crate::request::{DateRange, PohodaConnection};

pub use downloader::{CommandDownloader, extract_statement_files};
pub use importer::CommandImporter;

/// Downloads statements for a window into a directory and returns the
/// downloader's JSON report. `run_id` identifies the run the download belongs
/// to.
#[cfg_attr(test, mockall::automock)]
pub trait StatementDownloader {
    fn download(
        &self,
        run_id: &str,
        window: &DateRange,
        output_dir: &Path,
    ) -> Result<Value, StageError>;
}

/// Imports statement files into Pohoda and returns the importer's JSON report.
#[cfg_attr(test, mockall::automock)]
pub trait StatementImporter {
    fn import(
        &self,
        run_id: &str,
        statements: &[PathBuf],
        pohoda: &PohodaConnection,
    ) -> Result<Value, StageError>;
}

/// Why a collaborator run did not yield a successful report.
#[derive(Debug, Error)]
pub enum StageError {
    /// The program could not be started at all.
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program exited unsuccessfully. The report is kept when the output
    /// still parsed.
    #[error("{program} exited with {}", describe_exit(*.code))]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
        report: Option<Value>,
    },

    /// The output was empty, not JSON, or not a JSON object.
    #[error("{program} produced an unreadable report: {reason}")]
    InvalidReport {
        program: String,
        reason: String,
        stderr: String,
    },

    /// The report parsed but its status marks the run as failed.
    #[error("report status is '{status}'")]
    ReportedFailure { status: String, report: Value },

    /// The downloader report carries no statement file list.
    #[error("report lists no statement files (looked at {})", .pointers.join(", "))]
    MissingFileList { pointers: Vec<String>, report: Value },

    /// The temporary report file could not be prepared or read.
    #[error("report file error: {0}")]
    ReportFile(#[source] std::io::Error),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

impl StageError {
    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Spawn { .. } => "spawn",
            StageError::ExitStatus { .. } => "exit_status",
            StageError::InvalidReport { .. } | StageError::MissingFileList { .. } => {
                "invalid_report"
            }
            StageError::ReportedFailure { .. } => "reported_failure",
            StageError::ReportFile(_) => "report_file",
        }
    }

    /// The collaborator's report, when one could be recovered.
    pub fn report(&self) -> Option<&Value> {
        match self {
            StageError::ExitStatus { report, .. } => report.as_ref(),
            StageError::ReportedFailure { report, .. }
            | StageError::MissingFileList { report, .. } => Some(report),
            _ => None,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            StageError::ExitStatus { code, .. } => *code,
            _ => None,
        }
    }

    pub fn stderr(&self) -> Option<&str> {
        match self {
            StageError::ExitStatus { stderr, .. } | StageError::InvalidReport { stderr, .. }
                if !stderr.is_empty() =>
            {
                Some(stderr.as_str())
            }
            _ => None,
        }
    }
}

/// Decides whether a collaborator report marks its run as failed.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusPolicy {
    key: String,
    failure_values: Vec<String>,
}

impl StatusPolicy {
    pub fn new(key: impl Into<String>, failure_values: &[String]) -> Self {
        Self {
            key: key.into(),
            failure_values: failure_values.iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    /// Returns the failing status value, if any. A missing or null status is
    /// not a failure, `false` always is, and any other value is matched by
    /// its text against the failure values.
    pub fn failed_status(&self, report: &Value) -> Option<String> {
        let status = match report.get(&self.key)? {
            Value::Null | Value::Bool(true) => return None,
            Value::Bool(false) => return Some("false".to_string()),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        self.failure_values
            .iter()
            .any(|value| value.eq_ignore_ascii_case(&status))
            .then_some(status)
    }

    /// Passes successful reports through and turns failed ones into
    /// [`StageError::ReportedFailure`].
    pub fn check(&self, report: Value) -> Result<Value, StageError> {
        match self.failed_status(&report) {
            Some(status) => Err(StageError::ReportedFailure { status, report }),
            None => Ok(report),
        }
    }
}

impl From<&StageReportConfig> for StatusPolicy {
    fn from(config: &StageReportConfig) -> Self {
        StatusPolicy::new(config.status_key.clone(), &config.failure_values)
    }
}
