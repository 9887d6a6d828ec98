//! The merged report handed to MultiFlexi, and where it is written.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use crate::collaborator::StageError;
use crate::config::ReportSchema;
use crate::error::{Result, SyncError};
use crate::request::DateRange;

/// Message used when the importer does not provide one.
pub const IMPORTED_MESSAGE: &str = "Statement(s) successfully imported to Pohoda.";

/// Part of the run a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Configuration,
    Downloader,
    Importer,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Configuration => write!(f, "configuration"),
            Stage::Downloader => write!(f, "downloader"),
            Stage::Importer => write!(f, "importer"),
        }
    }
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Plain description of what went wrong, as embedded in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub stage: Stage,
    pub kind: String,
    pub message: String,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
}

impl FailureRecord {
    pub fn from_stage(stage: Stage, error: &StageError) -> Self {
        Self {
            stage,
            kind: error.kind().to_string(),
            message: error.to_string(),
            exit_code: error.exit_code(),
            stderr: error.stderr().map(str::to_string),
        }
    }

    pub fn configuration(error: &SyncError) -> Self {
        Self {
            stage: Stage::Configuration,
            kind: "configuration".to_string(),
            message: error.to_string(),
            exit_code: None,
            stderr: None,
        }
    }
}

/// Identity and start time of a run, fixed before any stage executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

impl RunStamp {
    /// Starts a run with a fresh random identifier.
    pub fn start() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_id(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
        }
    }
}

/// Unified report of one run. Built once when the run ends; read-only
/// afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedReport {
    stamp: RunStamp,
    finished_at: DateTime<Utc>,
    message: String,
    statements: Vec<PathBuf>,
    downloader: Option<Value>,
    importer: Option<Value>,
    failure: Option<FailureRecord>,
}

impl MergedReport {
    /// Both stages succeeded.
    pub fn imported(
        stamp: RunStamp,
        downloader: Value,
        statements: Vec<PathBuf>,
        importer: Value,
    ) -> Self {
        let message = importer
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or(IMPORTED_MESSAGE)
            .to_string();
        Self::finish(stamp, message, statements, Some(downloader), Some(importer), None)
    }

    /// The downloader succeeded without producing statements.
    pub fn nothing_to_import(stamp: RunStamp, window: &DateRange, downloader: Value) -> Self {
        let message = format!("No statements to import for {window}.");
        Self::finish(stamp, message, Vec::new(), Some(downloader), None, None)
    }

    /// The downloader failed; the importer was not run.
    pub fn downloader_failed(stamp: RunStamp, error: &StageError) -> Self {
        let message = format!("Failed to download statement(s): {error}");
        Self::finish(
            stamp,
            message,
            Vec::new(),
            error.report().cloned(),
            None,
            Some(FailureRecord::from_stage(Stage::Downloader, error)),
        )
    }

    /// The importer failed after a successful download.
    pub fn importer_failed(
        stamp: RunStamp,
        downloader: Value,
        statements: Vec<PathBuf>,
        error: &StageError,
    ) -> Self {
        let message = format!("Failed to import statement(s) to Pohoda: {error}");
        Self::finish(
            stamp,
            message,
            statements,
            Some(downloader),
            error.report().cloned(),
            Some(FailureRecord::from_stage(Stage::Importer, error)),
        )
    }

    /// The run never reached the collaborators.
    pub fn configuration_failed(stamp: RunStamp, error: &SyncError) -> Self {
        let message = format!("Invalid configuration: {error}");
        Self::finish(
            stamp,
            message,
            Vec::new(),
            None,
            None,
            Some(FailureRecord::configuration(error)),
        )
    }

    fn finish(
        stamp: RunStamp,
        message: String,
        statements: Vec<PathBuf>,
        downloader: Option<Value>,
        importer: Option<Value>,
        failure: Option<FailureRecord>,
    ) -> Self {
        Self {
            stamp,
            finished_at: Utc::now(),
            message,
            statements,
            downloader,
            importer,
            failure,
        }
    }

    pub fn outcome(&self) -> Outcome {
        match self.failure {
            Some(_) => Outcome::Failure,
            None => Outcome::Success,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == Outcome::Success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn run_id(&self) -> &str {
        &self.stamp.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.stamp.started_at
    }

    pub fn statements(&self) -> &[PathBuf] {
        &self.statements
    }

    pub fn downloader(&self) -> Option<&Value> {
        self.downloader.as_ref()
    }

    pub fn importer(&self) -> Option<&Value> {
        self.importer.as_ref()
    }

    pub fn failure(&self) -> Option<&FailureRecord> {
        self.failure.as_ref()
    }

    /// Process exit code: 0 on success, otherwise one per failing stage.
    pub fn exit_code(&self) -> u8 {
        match self.failure.as_ref().map(|failure| failure.stage) {
            None => 0,
            Some(Stage::Downloader) => 1,
            Some(Stage::Importer) => 2,
            Some(Stage::Configuration) => 3,
        }
    }

    /// Renders the report as JSON using the configured field names.
    pub fn render(&self, schema: &ReportSchema) -> Result<Value> {
        let status = match self.outcome() {
            Outcome::Success => &schema.success,
            Outcome::Failure => &schema.failure,
        };
        let started = self.started_at().to_rfc3339_opts(SecondsFormat::Millis, true);
        let finished = self.finished_at.to_rfc3339_opts(SecondsFormat::Millis, true);
        let statements: Vec<String> = self
            .statements
            .iter()
            .map(|path| path.to_string_lossy().into_owned())
            .collect();
        let duration_ms = (self.finished_at - self.started_at())
            .num_milliseconds()
            .max(0);
        let error = match &self.failure {
            Some(failure) => serde_json::to_value(failure)?,
            None => Value::Null,
        };

        let mut report = Map::new();
        report.insert(schema.status.clone(), json!(status));
        report.insert(schema.message.clone(), json!(self.message));
        report.insert(schema.run_id.clone(), json!(self.stamp.run_id));
        report.insert(schema.timestamp.clone(), json!(finished));
        report.insert(
            schema.timestamps.clone(),
            json!({"started": started, "finished": finished}),
        );
        report.insert(
            schema.downloader.clone(),
            self.downloader.clone().unwrap_or(Value::Null),
        );
        report.insert(
            schema.importer.clone(),
            self.importer.clone().unwrap_or(Value::Null),
        );
        report.insert(schema.error.clone(), error);
        report.insert(schema.artifacts.clone(), json!({"statements": statements}));
        report.insert(
            schema.metrics.clone(),
            json!({"statements": statements.len(), "duration_ms": duration_ms}),
        );
        Ok(Value::Object(report))
    }
}

/// Where the rendered report goes: standard output, a file, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportDestination {
    file: Option<PathBuf>,
    stdout: bool,
}

impl ReportDestination {
    /// Standard output is used whenever no file is given, or when explicitly
    /// requested alongside one.
    pub fn new(file: Option<PathBuf>, also_stdout: bool) -> Self {
        let stdout = file.is_none() || also_stdout;
        Self { file, stdout }
    }

    pub fn writes_stdout(&self) -> bool {
        self.stdout
    }

    #[instrument(level = "debug", skip_all, fields(file = ?self.file, stdout = self.stdout))]
    pub fn write(&self, report: &Value) -> Result<()> {
        let mut text = serde_json::to_string_pretty(report)?;
        text.push('\n');

        if let Some(path) = &self.file {
            write_atomically(path, &text)?;
            debug!(path = %path.display(), "report file written");
        }
        if self.stdout {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
        }
        Ok(())
    }
}

// The temporary sibling is removed on drop, so a failed write leaves nothing
// behind.
fn write_atomically(path: &Path, text: &str) -> Result<()> {
    let parent = match path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent)?;
            parent
        }
        None => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(text.as_bytes())?;
    file.persist(path).map_err(|err| SyncError::Io(err.error))?;
    Ok(())
}
