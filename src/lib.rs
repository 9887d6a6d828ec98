//! Core library for the statement-sync command line application.
//!
//! A run downloads bank statements with the csas-statement-tools downloader,
//! imports them into Pohoda with the ABO importer, and merges both programs'
//! JSON reports into a single MultiFlexi report. The collaborators are
//! external executables behind the traits in [`collaborator`]; the pipeline
//! lives in [`sync`], the report model and its rendering in [`report`], and
//! layered settings in [`config`].

pub mod collaborator;
pub mod config;
pub mod error;
pub mod logging;
pub mod report;
pub mod request;
pub mod sync;

pub use collaborator::{CommandDownloader, CommandImporter, StageError, StatusPolicy};
pub use config::AppConfig;
pub use error::{Result, SyncError};
pub use report::{MergedReport, Outcome, ReportDestination, RunStamp, Stage};
pub use request::{DateRange, PohodaConnection, SyncRequest};
pub use sync::SyncOrchestrator;
