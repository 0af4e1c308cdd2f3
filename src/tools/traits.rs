//! Trait definitions for external command execution
//!
//! The pipeline and the bucket uploader are opaque programs. They are run
//! through `CommandExecutor` so tests can substitute a fake that records
//! invocations instead of spawning processes.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub stdout_log: Option<PathBuf>,
    pub stderr_log: Option<PathBuf>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            stdout_log: None,
            stderr_log: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.current_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Send stdout and stderr to files instead of capturing them
    pub fn log_to(mut self, stdout: impl AsRef<Path>, stderr: impl AsRef<Path>) -> Self {
        self.stdout_log = Some(stdout.as_ref().to_path_buf());
        self.stderr_log = Some(stderr.as_ref().to_path_buf());
        self
    }

    /// Shell-style rendering for logs and error messages
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@+%,".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// How a finished command exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Human-readable exit status
    pub status: String,
    /// Captured output; empty when redirected to log files
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            code: Some(0),
            status: "exit status: 0".to_string(),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            status: format!("exit status: {}", code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands to completion
pub trait CommandExecutor: Send + Sync {
    /// Run `command` and wait for it. `Err` means it could not be started.
    fn execute(&self, command: &ExternalCommand) -> io::Result<CommandOutput>;
}

/// Spawns real processes
#[derive(Debug, Default, Clone)]
pub struct SystemExecutor;

impl CommandExecutor for SystemExecutor {
    fn execute(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null());
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        if let (Some(stdout), Some(stderr)) = (&command.stdout_log, &command.stderr_log) {
            cmd.stdout(File::create(stdout)?).stderr(File::create(stderr)?);
            let status = cmd.status()?;
            return Ok(CommandOutput {
                success: status.success(),
                code: status.code(),
                status: status.to_string(),
                stdout: String::new(),
                stderr: String::new(),
            });
        }

        let output = cmd.output()?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::Mutex;

    type Handler = Box<dyn Fn(&ExternalCommand, usize) -> io::Result<CommandOutput> + Send + Sync>;

    /// Records every command and answers with a scripted handler; the
    /// handler also receives the 0-based call number
    pub struct FakeExecutor {
        calls: Mutex<Vec<ExternalCommand>>,
        handler: Handler,
    }

    impl FakeExecutor {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&ExternalCommand, usize) -> io::Result<CommandOutput> + Send + Sync + 'static,
        {
            Self {
                calls: Mutex::new(Vec::new()),
                handler: Box::new(handler),
            }
        }

        pub fn succeeding() -> Self {
            Self::new(|_, _| Ok(CommandOutput::success()))
        }

        pub fn calls(&self) -> Vec<ExternalCommand> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CommandExecutor for FakeExecutor {
        fn execute(&self, command: &ExternalCommand) -> io::Result<CommandOutput> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(command.clone());
                calls.len() - 1
            };
            (self.handler)(command, call)
        }
    }
}
