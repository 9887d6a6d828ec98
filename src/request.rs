//! Input of a single synchronisation run and its validation.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::{Result, SyncError};

/// Date format accepted on the command line and handed to the downloader.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Directory used for downloaded statements when none is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "statements";

/// Raw request as assembled from arguments and environment. Values are kept
/// exactly as supplied; [`SyncRequest::validate`] turns them into a
/// [`SyncPlan`].
#[derive(Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub output_dir: PathBuf,
    pub pohoda_url: Option<String>,
    pub pohoda_token: Option<String>,
}

impl SyncRequest {
    /// Builds a request with every required value present.
    pub fn new(
        from_date: impl Into<String>,
        to_date: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        pohoda_url: impl Into<String>,
        pohoda_token: impl Into<String>,
    ) -> Self {
        Self {
            from_date: Some(from_date.into()),
            to_date: Some(to_date.into()),
            output_dir: output_dir.into(),
            pohoda_url: Some(pohoda_url.into()),
            pohoda_token: Some(pohoda_token.into()),
        }
    }

    /// Checks the request and resolves it into typed values.
    pub fn validate(&self) -> Result<SyncPlan> {
        let from = parse_date("from-date", self.from_date.as_deref())?;
        let to = parse_date("to-date", self.to_date.as_deref())?;
        let window = DateRange::new(from, to)?;

        let url = required("pohoda-url", self.pohoda_url.as_deref())?;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SyncError::InvalidPohodaUrl(url.to_string()));
        }
        let token = required("pohoda-token", self.pohoda_token.as_deref())?;

        if self.output_dir.as_os_str().is_empty() {
            return Err(SyncError::MissingSetting("output-dir"));
        }

        Ok(SyncPlan {
            window,
            output_dir: self.output_dir.clone(),
            pohoda: PohodaConnection::new(url, token),
        })
    }
}

impl fmt::Debug for SyncRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRequest")
            .field("from_date", &self.from_date)
            .field("to_date", &self.to_date)
            .field("output_dir", &self.output_dir)
            .field("pohoda_url", &self.pohoda_url)
            .field("pohoda_token", &self.pohoda_token.as_ref().map(|_| "***"))
            .finish()
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(SyncError::MissingSetting(name)),
    }
}

fn parse_date(field: &'static str, value: Option<&str>) -> Result<NaiveDate> {
    let value = required(field, value)?;
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|source| SyncError::InvalidDate {
        field,
        value: value.to_string(),
        source,
    })
}

/// Inclusive calendar window, guaranteed to satisfy `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(SyncError::InvalidDateRange { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.from.format(DATE_FORMAT),
            self.to.format(DATE_FORMAT)
        )
    }
}

/// Connection parameters handed to the importer.
#[derive(Clone, PartialEq, Eq)]
pub struct PohodaConnection {
    url: String,
    token: String,
}

impl PohodaConnection {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// The token never leaves through logs or debug output.
impl fmt::Debug for PohodaConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PohodaConnection")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

/// A validated request, ready to be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub window: DateRange,
    pub output_dir: PathBuf,
    pub pohoda: PohodaConnection,
}

impl SyncPlan {
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}
