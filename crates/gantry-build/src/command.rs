//! Synchronous external commands.

use std::path::Path;
use std::process::Command;

/// Errors from running an external command.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Runs a program to completion and returns its trimmed stdout.
///
/// Task code goes through this trait so tests can record the exact
/// command sequence without touching a real repository.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cwd: &Path, program: &str, args: &[&str]) -> Result<String, CommandError>;
}

/// Runs commands with `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cwd: &Path, program: &str, args: &[&str]) -> Result<String, CommandError> {
        let command = render(program, args);
        tracing::debug!("$ {}", command);

        let output = Command::new(program)
            .current_dir(cwd)
            .args(args)
            .output()
            .map_err(|e| CommandError::Spawn {
                program: program.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Render a command line for logs and error messages.
pub fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
