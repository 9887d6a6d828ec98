use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use statement_sync::config::ReportSchema;
use statement_sync::request::DEFAULT_OUTPUT_DIR;
use statement_sync::{
    AppConfig, CommandDownloader, CommandImporter, MergedReport, ReportDestination, Result,
    RunStamp, StatusPolicy, SyncError, SyncOrchestrator, SyncRequest, logging,
};
use tracing::{debug, error, info};

/// Exit code when the run finished but its report could not be written.
const REPORT_WRITE_FAILED: u8 = 4;

fn main() -> ExitCode {
    // A missing .env is fine; variables already set in the environment win.
    let env_file = dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(error) = logging::init(cli.verbose) {
        eprintln!("error: {error}");
    }
    if let Some(path) = env_file {
        debug!(path = %path.display(), "loaded environment file");
    }

    let destination = ReportDestination::new(cli.output.clone(), cli.stdout);
    let stamp = RunStamp::start();

    let config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            return emit_configuration_failure(stamp, &err, &ReportSchema::default(), &destination);
        }
    };

    let report = match run(&cli, &config, stamp.clone()) {
        Ok(report) => report,
        Err(err) => return emit_configuration_failure(stamp, &err, &config.report, &destination),
    };

    match emit(&report, &config.report, &destination) {
        Ok(()) => {
            info!(
                success = report.is_success(),
                exit_code = report.exit_code(),
                "sync finished"
            );
            ExitCode::from(report.exit_code())
        }
        Err(err) => {
            error!(error = %err, "failed to write report");
            eprintln!("error: failed to write report: {err}");
            ExitCode::from(REPORT_WRITE_FAILED)
        }
    }
}

fn run(cli: &Cli, config: &AppConfig, stamp: RunStamp) -> Result<MergedReport> {
    let policy = StatusPolicy::from(&config.stage_report);
    let downloader = CommandDownloader::new(config.downloader.clone(), policy.clone());
    let importer = CommandImporter::new(config.importer.clone(), policy);
    let orchestrator = SyncOrchestrator::new(downloader, importer, config.stage_report.clone());
    orchestrator.run_with(stamp, &cli.request())
}

fn emit(report: &MergedReport, schema: &ReportSchema, destination: &ReportDestination) -> Result<()> {
    let rendered = report.render(schema)?;
    destination.write(&rendered)
}

fn emit_configuration_failure(
    stamp: RunStamp,
    err: &SyncError,
    schema: &ReportSchema,
    destination: &ReportDestination,
) -> ExitCode {
    error!(error = %err, "invalid configuration");
    let report = MergedReport::configuration_failed(stamp, err);
    if let Err(write_err) = emit(&report, schema, destination) {
        eprintln!("error: {err}");
        eprintln!("error: failed to write report: {write_err}");
    }
    ExitCode::from(report.exit_code())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Download bank statements and import them into Pohoda, reporting to MultiFlexi."
)]
struct Cli {
    /// First day of the statement window (YYYY-MM-DD).
    #[arg(long, env = "SYNC_FROM_DATE")]
    from_date: Option<String>,

    /// Last day of the statement window (YYYY-MM-DD).
    #[arg(long, env = "SYNC_TO_DATE")]
    to_date: Option<String>,

    /// Directory the downloader saves statements into.
    #[arg(long, env = "STATEMENTS_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Pohoda mServer URL.
    #[arg(long, env = "POHODA_URL")]
    pohoda_url: Option<String>,

    /// Pohoda API token.
    #[arg(long, env = "POHODA_TOKEN", hide_env_values = true)]
    pohoda_token: Option<String>,

    /// Write the report to this file instead of standard output.
    #[arg(short, long, env = "RESULT_FILE")]
    output: Option<PathBuf>,

    /// Also print the report when writing it to a file.
    #[arg(long)]
    stdout: bool,

    /// Settings file (TOML) describing the collaborators and report layout.
    #[arg(short, long, env = "STATEMENT_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (repeatable).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn request(&self) -> SyncRequest {
        SyncRequest {
            from_date: self.from_date.clone(),
            to_date: self.to_date.clone(),
            output_dir: self.output_dir.clone(),
            pohoda_url: self.pohoda_url.clone(),
            pohoda_token: self.pohoda_token.clone(),
        }
    }
}
