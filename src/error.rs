use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Error type covering everything that can go wrong before the collaborators
/// run. Failures of the downloader or importer themselves are not raised;
/// they are captured into the merged report instead.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Wrapper for IO failures such as writing the report file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Raised when the settings file or environment overrides cannot be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Raised when a required request value was given neither as an argument
    /// nor through the environment.
    #[error("missing required setting: {0}")]
    MissingSetting(&'static str),

    /// Raised when a date argument is not a `YYYY-MM-DD` calendar date.
    #[error("invalid {field} '{value}': expected YYYY-MM-DD")]
    InvalidDate {
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    /// Raised when the requested window ends before it starts.
    #[error("invalid date range: from-date {from} is after to-date {to}")]
    InvalidDateRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },

    /// Raised when the Pohoda URL is not an http(s) URL.
    #[error("invalid Pohoda URL '{0}': expected an http:// or https:// URL")]
    InvalidPohodaUrl(String),

    /// Raised when the statement output directory cannot be created.
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
