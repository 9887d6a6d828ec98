//! Layered settings for the collaborators and the merged report layout.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file
//! (`statement-sync.toml` in the working directory unless a path is given),
//! and `STATEMENT_SYNC_<SECTION>__<KEY>` environment variables.

use std::collections::HashMap;
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

/// Settings file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "statement-sync";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "STATEMENT_SYNC";

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub downloader: DownloaderConfig,
    pub importer: ImporterConfig,
    pub stage_report: StageReportConfig,
    pub report: ReportSchema,
}

impl AppConfig {
    /// Loads the settings using the process environment for overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Loads the settings, taking overrides from `env` instead of the process
    /// environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("downloader.args")
            .with_list_parse_key("importer.args")
            .with_list_parse_key("stage_report.failure_values")
            .with_list_parse_key("stage_report.files")
            .with_list_parse_key("stage_report.processed_files")
            .source(env);

        let settings = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// How the downloader is launched.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    pub program: String,
    /// Arguments placed before the generated ones.
    pub args: Vec<String>,
    /// Prefix joined with the output directory, e.g. `-d/var/statements`.
    pub directory_flag: String,
    /// Prefix joined with `format`, e.g. `-fabo-standard`.
    pub format_flag: String,
    pub format: String,
    pub output_flag: String,
    /// Where the downloader is told to write its JSON report.
    pub report_target: String,
    pub from_env: String,
    pub to_env: String,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            program: "csas-statement-downloader".to_string(),
            args: Vec::new(),
            directory_flag: "-d".to_string(),
            format_flag: "-f".to_string(),
            format: "abo-standard".to_string(),
            output_flag: "-o".to_string(),
            report_target: "php://stdout".to_string(),
            from_env: "STATEMENT_FROM".to_string(),
            to_env: "STATEMENT_TO".to_string(),
        }
    }
}

/// Where the importer delivers its JSON report.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    #[default]
    Stdout,
    /// A temporary file passed as the output target and read back afterwards.
    File,
}

/// How the importer is launched.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImporterConfig {
    pub program: String,
    pub args: Vec<String>,
    pub output_flag: String,
    pub report_source: ReportSource,
    /// Output target used with [`ReportSource::Stdout`].
    pub report_target: String,
    pub url_env: String,
    pub token_env: String,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            program: "pohoda-abo-importer".to_string(),
            args: Vec::new(),
            output_flag: "-o".to_string(),
            report_source: ReportSource::Stdout,
            report_target: "php://stdout".to_string(),
            url_env: "POHODA_URL".to_string(),
            token_env: "POHODA_TOKEN".to_string(),
        }
    }
}

/// How the collaborators' own reports are interpreted.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageReportConfig {
    pub status_key: String,
    /// Status values (compared case-insensitively) that mark a failed stage.
    pub failure_values: Vec<String>,
    /// JSON pointers into the downloader report, tried in order, that may
    /// hold the list of produced statement files.
    pub files: Vec<String>,
    /// Pointers to csas-statement-tools style `Processed <path>: ...` lines,
    /// tried after `files`.
    pub processed_files: Vec<String>,
}

impl Default for StageReportConfig {
    fn default() -> Self {
        Self {
            status_key: "status".to_string(),
            failure_values: vec![
                "error".to_string(),
                "failed".to_string(),
                "failure".to_string(),
            ],
            files: vec!["/files".to_string()],
            processed_files: vec!["/artifacts/processed_files".to_string()],
        }
    }
}

/// Field names and status labels of the merged report.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportSchema {
    pub status: String,
    pub success: String,
    pub failure: String,
    pub message: String,
    pub run_id: String,
    pub timestamp: String,
    pub timestamps: String,
    pub downloader: String,
    pub importer: String,
    pub error: String,
    pub artifacts: String,
    pub metrics: String,
}

impl Default for ReportSchema {
    fn default() -> Self {
        Self {
            status: "status".to_string(),
            success: "success".to_string(),
            failure: "error".to_string(),
            message: "message".to_string(),
            run_id: "run_id".to_string(),
            timestamp: "timestamp".to_string(),
            timestamps: "timestamps".to_string(),
            downloader: "downloader".to_string(),
            importer: "importer".to_string(),
            error: "error".to_string(),
            artifacts: "artifacts".to_string(),
            metrics: "metrics".to_string(),
        }
    }
}
