//! External command execution with an enforced deadline.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {}: {}", exit_label(.code), .output.diagnostic().trim())]
    Failed {
        program: String,
        code: Option<i32>,
        output: CommandOutput,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Stderr verbatim, or stdout when stderr is empty.
    pub fn diagnostic(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

/// Run `argv` to completion. A non-zero exit is returned as output, not as an
/// error; only spawn failures and timeouts are errors here.
pub async fn run(argv: &[String], timeout: Duration) -> Result<CommandOutput, ProcessError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ProcessError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        });
    };

    debug!(program = %program, args = ?args, "Running command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    // Dropping the future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| ProcessError::Timeout {
            program: program.clone(),
            timeout,
        })?
        .map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

    Ok(CommandOutput {
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`run`], but a non-zero exit becomes [`ProcessError::Failed`].
pub async fn run_checked(argv: &[String], timeout: Duration) -> Result<CommandOutput, ProcessError> {
    let output = run(argv, timeout).await?;
    if output.success() {
        Ok(output)
    } else {
        Err(ProcessError::Failed {
            program: argv.first().cloned().unwrap_or_default(),
            code: output.code,
            output,
        })
    }
}
