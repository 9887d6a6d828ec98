use std::ffi::OsString;
use std::fmt;
use std::process::{Command, Stdio};

use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{StageError, StatusPolicy};

/// Environment variable carrying the run identifier to both collaborators.
pub const RUN_ID_ENV: &str = "STATEMENT_SYNC_RUN_ID";

/// A fully described collaborator command line.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<OsString>,
    envs: Vec<(String, OsString)>,
}

// Environment values may hold credentials; only their names are shown.
impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_names: Vec<&str> = self.envs.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("envs", &env_names)
            .finish()
    }
}

/// What a finished collaborator left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds a variable on top of the inherited environment.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn env_value(&self, key: &str) -> Option<&OsString> {
        self.envs
            .iter()
            .rev()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value)
    }

    /// Runs the program to completion, capturing both output streams.
    #[instrument(level = "debug", skip_all, fields(program = %self.program))]
    pub fn run(&self) -> Result<CapturedOutput, StageError> {
        debug!(args = ?self.args, "launching collaborator");
        let output = Command::new(&self.program)
            .args(&self.args)
            .envs(self.envs.iter().map(|(key, value)| (key, value)))
            .stdin(Stdio::null())
            .output()
            .map_err(|source| StageError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let captured = CapturedOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        };
        debug!(
            code = ?captured.code,
            stdout_bytes = captured.stdout.len(),
            stderr_bytes = captured.stderr.len(),
            "collaborator finished"
        );
        Ok(captured)
    }
}

/// Parses a collaborator report, which must be a single JSON object.
pub fn parse_report(text: &str) -> Result<Value, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("no report was produced".to_string());
    }
    let value: Value = serde_json::from_str(text).map_err(|err| err.to_string())?;
    if !value.is_object() {
        return Err(format!("expected a JSON object, found {}", kind_of(&value)));
    }
    Ok(value)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Turns a finished run and its report text into the stage outcome: the exit
/// status is checked first, then the report shape, then its status field.
pub fn evaluate(
    program: &str,
    output: CapturedOutput,
    report_text: &str,
    policy: &StatusPolicy,
) -> Result<Value, StageError> {
    if !output.success {
        let report = parse_report(report_text).ok();
        warn!(
            program,
            code = ?output.code,
            stderr = %output.stderr,
            "collaborator exited unsuccessfully"
        );
        return Err(StageError::ExitStatus {
            program: program.to_string(),
            code: output.code,
            stderr: output.stderr,
            report,
        });
    }

    let report = parse_report(report_text).map_err(|reason| StageError::InvalidReport {
        program: program.to_string(),
        reason,
        stderr: output.stderr.clone(),
    })?;

    if !output.stderr.is_empty() {
        debug!(program, stderr = %output.stderr, "collaborator wrote diagnostics");
    }
    policy.check(report)
}
