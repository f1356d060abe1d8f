use std::{
    ffi::OsStr,
    io::ErrorKind,
    process::{Command, Output, Stdio},
};

use crate::error::{Result, StemError};

/// Captured output of a finished external tool.
#[derive(Debug)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr, the way the tools interleave on a terminal.
    pub fn combined(&self) -> String {
        let mut log = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !log.is_empty() && !err.is_empty() {
            log.push('\n');
        }
        log.push_str(err);
        log
    }

    /// stderr if present, else a generic message with the exit code.
    pub fn failure_message(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            format!("process exited with code {:?}", self.code)
        } else {
            err.to_string()
        }
    }
}

impl From<Output> for ToolOutput {
    fn from(o: Output) -> Self {
        Self {
            success: o.status.success(),
            code: o.status.code(),
            stdout: String::from_utf8_lossy(&o.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&o.stderr).into_owned(),
        }
    }
}

/// Runs `program` to completion. A missing executable becomes
/// `MissingDependency`; a non-zero exit is returned as a normal output.
pub fn run_tool<I, S>(program: &OsStr, args: I) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args).stdout(Stdio::piped()).stderr(Stdio::piped());
    log::debug!("exec {:?}", cmd);

    match cmd.output() {
        Ok(out) => Ok(out.into()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StemError::MissingDependency {
            tool: program.to_string_lossy().into_owned(),
        }),
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("Failed to execute {}", program.to_string_lossy()))
            .into()),
    }
}

/// True if `program <flag>` runs and exits successfully.
pub fn tool_available(program: &OsStr, flag: &str) -> bool {
    matches!(run_tool(program, [flag]), Ok(out) if out.success)
}
