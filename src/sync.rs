//! The two-stage pipeline: download statements, then import them.

use std::fs;

use tracing::{error, info, instrument, warn};

use crate::collaborator::{StatementDownloader, StatementImporter, extract_statement_files};
use crate::config::StageReportConfig;
use crate::error::{Result, SyncError};
use crate::report::{MergedReport, RunStamp};
use crate::request::SyncRequest;

/// Drives the downloader and the importer in sequence and merges their
/// reports.
pub struct SyncOrchestrator<D, I> {
    downloader: D,
    importer: I,
    stage_report: StageReportConfig,
}

impl<D, I> SyncOrchestrator<D, I>
where
    D: StatementDownloader,
    I: StatementImporter,
{
    pub fn new(downloader: D, importer: I, stage_report: StageReportConfig) -> Self {
        Self {
            downloader,
            importer,
            stage_report,
        }
    }

    /// Runs the pipeline under a fresh run identifier. The same identifier is
    /// handed to both collaborators and recorded in the report.
    pub fn run(&self, request: &SyncRequest) -> Result<MergedReport> {
        self.run_with(RunStamp::start(), request)
    }

    /// Runs the pipeline. Only configuration problems are returned as errors;
    /// collaborator failures end up in the report.
    #[instrument(level = "info", skip_all, fields(run_id = %stamp.run_id))]
    pub fn run_with(&self, stamp: RunStamp, request: &SyncRequest) -> Result<MergedReport> {
        let plan = request.validate()?;
        fs::create_dir_all(plan.output_dir()).map_err(|source| SyncError::OutputDir {
            path: plan.output_dir.clone(),
            source,
        })?;
        info!(window = %plan.window, output_dir = %plan.output_dir().display(), "starting sync");

        let run_id = stamp.run_id.as_str();
        let downloaded = match self
            .downloader
            .download(run_id, &plan.window, plan.output_dir())
        {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "statement download failed");
                return Ok(MergedReport::downloader_failed(stamp, &err));
            }
        };

        let statements = match extract_statement_files(&downloaded, &self.stage_report) {
            Ok(statements) => statements,
            Err(err) => {
                error!(error = %err, "downloader report is unusable");
                return Ok(MergedReport::downloader_failed(stamp, &err));
            }
        };
        if statements.is_empty() {
            info!(window = %plan.window, "no statements to import");
            return Ok(MergedReport::nothing_to_import(stamp, &plan.window, downloaded));
        }
        info!(count = statements.len(), "statements downloaded");

        match self.importer.import(run_id, &statements, &plan.pohoda) {
            Ok(imported) => {
                info!(count = statements.len(), "statements imported");
                Ok(MergedReport::imported(stamp, downloaded, statements, imported))
            }
            Err(err) => {
                warn!(error = %err, "statement import failed");
                Ok(MergedReport::importer_failed(stamp, downloaded, statements, &err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{MockStatementDownloader, MockStatementImporter, StageError};
    use crate::config::ReportSchema;
    use crate::report::{Outcome, Stage};
    use serde_json::{Value, json};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};

    fn request(dir: &TempDir, from: &str, to: &str) -> SyncRequest {
        SyncRequest::new(
            from,
            to,
            dir.path().join("statements"),
            "http://pohoda.local:444",
            "token",
        )
    }

    fn orchestrator(
        downloader: MockStatementDownloader,
        importer: MockStatementImporter,
    ) -> SyncOrchestrator<MockStatementDownloader, MockStatementImporter> {
        SyncOrchestrator::new(downloader, importer, StageReportConfig::default())
    }

    #[test]
    fn scenario_two_files_imported() {
        let dir = tempdir().expect("temporary directory");
        let downloaded = json!({"status": "ok", "files": ["a.abo", "b.abo"]});

        let mut downloader = MockStatementDownloader::new();
        let report = downloaded.clone();
        downloader
            .expect_download()
            .withf(|_, window, _| window.to_string() == "2025-09-01..2025-09-15")
            .times(1)
            .returning(move |_, _, _| Ok(report.clone()));

        let mut importer = MockStatementImporter::new();
        importer
            .expect_import()
            .withf(|_, files, pohoda| {
                files == [PathBuf::from("a.abo"), PathBuf::from("b.abo")]
                    && pohoda.url() == "http://pohoda.local:444"
            })
            .times(1)
            .returning(|_, _, _| Ok(json!({"status": "ok"})));

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");
        let rendered = merged.render(&ReportSchema::default()).unwrap();

        assert_eq!(rendered["status"], "success");
        assert_eq!(rendered["downloader"], downloaded);
        assert_eq!(rendered["importer"], json!({"status": "ok"}));
        assert!(dir.path().join("statements").is_dir());
    }

    #[test]
    fn empty_file_list_never_invokes_importer() {
        let dir = tempdir().expect("temporary directory");
        let mut downloader = MockStatementDownloader::new();
        downloader
            .expect_download()
            .times(1)
            .returning(|_, _, _| Ok(json!({"status": "ok", "files": []})));
        let mut importer = MockStatementImporter::new();
        importer.expect_import().never();

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");

        assert_eq!(merged.outcome(), Outcome::Success);
        assert_eq!(merged.importer(), None);
        assert_eq!(merged.downloader(), Some(&json!({"status": "ok", "files": []})));
        assert_eq!(merged.exit_code(), 0);
    }

    #[test]
    fn downloader_exit_failure_stops_the_run() {
        let dir = tempdir().expect("temporary directory");
        let mut downloader = MockStatementDownloader::new();
        downloader.expect_download().times(1).returning(|_, _, _| {
            Err(StageError::ExitStatus {
                program: "csas-statement-downloader".into(),
                code: Some(1),
                stderr: "invalid API key".into(),
                report: None,
            })
        });
        let mut importer = MockStatementImporter::new();
        importer.expect_import().never();

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");

        assert_eq!(merged.outcome(), Outcome::Failure);
        assert_eq!(merged.importer(), None);
        assert_eq!(merged.failure().map(|f| f.stage), Some(Stage::Downloader));
        assert_eq!(merged.exit_code(), 1);
    }

    #[test]
    fn malformed_downloader_output_stops_the_run() {
        let dir = tempdir().expect("temporary directory");
        let mut downloader = MockStatementDownloader::new();
        downloader.expect_download().returning(|_, _, _| {
            Err(StageError::InvalidReport {
                program: "csas-statement-downloader".into(),
                reason: "expected value at line 1 column 1".into(),
                stderr: String::new(),
            })
        });
        let mut importer = MockStatementImporter::new();
        importer.expect_import().never();

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");

        assert!(!merged.is_success());
        assert_eq!(merged.failure().map(|f| f.kind.as_str()), Some("invalid_report"));
    }

    #[test]
    fn importer_failure_preserves_downloader_report() {
        let dir = tempdir().expect("temporary directory");
        let downloaded = json!({
            "status": "ok",
            "files": ["a.abo"],
            "metrics": {"accounts": 1}
        });

        let mut downloader = MockStatementDownloader::new();
        let report = downloaded.clone();
        downloader
            .expect_download()
            .returning(move |_, _, _| Ok(report.clone()));
        let mut importer = MockStatementImporter::new();
        importer.expect_import().times(1).returning(|_, _, _| {
            Err(StageError::ReportedFailure {
                status: "error".into(),
                report: json!({"status": "error", "message": "duplicate statement"}),
            })
        });

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");

        assert_eq!(merged.outcome(), Outcome::Failure);
        assert_eq!(merged.downloader(), Some(&downloaded));
        assert_eq!(
            merged.importer(),
            Some(&json!({"status": "error", "message": "duplicate statement"}))
        );
        assert_eq!(merged.statements(), [PathBuf::from("a.abo")]);
        assert_eq!(merged.exit_code(), 2);
    }

    #[test]
    fn reversed_window_fails_before_any_collaborator() {
        let dir = tempdir().expect("temporary directory");
        let mut downloader = MockStatementDownloader::new();
        downloader.expect_download().never();
        let mut importer = MockStatementImporter::new();
        importer.expect_import().never();

        let result = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-15", "2025-09-01"));

        assert!(matches!(result, Err(SyncError::InvalidDateRange { .. })));
        assert!(!dir.path().join("statements").exists());
    }

    #[test]
    fn missing_token_fails_before_any_collaborator() {
        let dir = tempdir().expect("temporary directory");
        let mut downloader = MockStatementDownloader::new();
        downloader.expect_download().never();
        let mut importer = MockStatementImporter::new();
        importer.expect_import().never();

        let mut request = request(&dir, "2025-09-01", "2025-09-15");
        request.pohoda_token = None;
        let result = orchestrator(downloader, importer).run(&request);

        assert!(matches!(result, Err(SyncError::MissingSetting("pohoda-token"))));
    }

    #[test]
    fn run_identifier_is_carried_into_the_report() {
        let dir = tempdir().expect("temporary directory");
        let mut downloader = MockStatementDownloader::new();
        downloader
            .expect_download()
            .returning(|_, _, _| Ok(json!({"status": "ok", "files": []})));
        let importer = MockStatementImporter::new();

        let merged = orchestrator(downloader, importer)
            .run_with(
                RunStamp::with_id("fixed-run"),
                &request(&dir, "2025-09-01", "2025-09-01"),
            )
            .expect("run completes");

        assert_eq!(merged.run_id(), "fixed-run");
        assert_eq!(merged.importer(), None::<&Value>);
    }

    #[test]
    fn collaborators_receive_the_reported_run_identifier() {
        let dir = tempdir().expect("temporary directory");
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut downloader = MockStatementDownloader::new();
        let downloader_seen = Arc::clone(&seen);
        downloader
            .expect_download()
            .times(1)
            .returning(move |run_id, _, _| {
                downloader_seen.lock().unwrap().push(run_id.to_string());
                Ok(json!({"status": "ok", "files": ["a.abo"]}))
            });
        let mut importer = MockStatementImporter::new();
        let importer_seen = Arc::clone(&seen);
        importer
            .expect_import()
            .times(1)
            .returning(move |run_id, _, _| {
                importer_seen.lock().unwrap().push(run_id.to_string());
                Ok(json!({"status": "ok"}))
            });

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|run_id| run_id == merged.run_id()));
    }

    #[test]
    fn report_without_file_list_fails_the_download() {
        let dir = tempdir().expect("temporary directory");
        let downloaded = json!({"status": "ok", "statements": ["a.abo"]});

        let mut downloader = MockStatementDownloader::new();
        let report = downloaded.clone();
        downloader
            .expect_download()
            .times(1)
            .returning(move |_, _, _| Ok(report.clone()));
        let mut importer = MockStatementImporter::new();
        importer.expect_import().never();

        let merged = orchestrator(downloader, importer)
            .run(&request(&dir, "2025-09-01", "2025-09-15"))
            .expect("run completes");

        assert_eq!(merged.outcome(), Outcome::Failure);
        assert_eq!(merged.failure().map(|f| f.stage), Some(Stage::Downloader));
        assert_eq!(merged.failure().map(|f| f.kind.as_str()), Some("invalid_report"));
        assert_eq!(merged.downloader(), Some(&downloaded));
        assert_eq!(merged.exit_code(), 1);
    }
}
