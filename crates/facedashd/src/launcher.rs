//! Starts the dashboard the first time someone is recognized and restarts
//! it if it has exited since.
//!
//! The dashboard keeps the terminal's stdout to itself. Its stderr goes to a
//! log file so diagnostics never land on top of the rendered screen.

use crate::logging::open_append;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// A new dashboard process was spawned.
    Launched(u32),
    AlreadyRunning(u32),
    /// No dashboard command is configured.
    Disabled,
}

/// Supervises a single dashboard child process.
#[derive(Debug)]
pub struct DashboardLauncher {
    command: Vec<String>,
    stderr_log: Option<PathBuf>,
    child: Option<Child>,
}

impl DashboardLauncher {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            stderr_log: None,
            child: None,
        }
    }

    /// Append the dashboard's stderr to `path` instead of discarding it.
    pub fn with_stderr_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.stderr_log = Some(path.into());
        self
    }

    fn stderr(&self) -> Stdio {
        let Some(path) = &self.stderr_log else {
            return Stdio::null();
        };
        match open_append(path) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot open dashboard log, discarding its stderr");
                Stdio::null()
            }
        }
    }

    /// Whether the supervised dashboard process is alive.
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                tracing::info!(%status, "dashboard exited");
                self.child = None;
                false
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "cannot poll dashboard process");
                self.child = None;
                false
            }
            None => false,
        }
    }

    /// Spawn the dashboard unless it is already running.
    pub fn ensure_running(&mut self) -> std::io::Result<LaunchOutcome> {
        if self.command.is_empty() {
            return Ok(LaunchOutcome::Disabled);
        }
        if self.is_running() {
            if let Some(child) = &self.child {
                return Ok(LaunchOutcome::AlreadyRunning(child.id()));
            }
        }

        let Some((program, args)) = self.command.split_first() else {
            return Ok(LaunchOutcome::Disabled);
        };
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(self.stderr())
            .spawn()?;
        let pid = child.id();
        tracing::info!(pid, program = %program, "dashboard launched");
        self.child = Some(child);
        Ok(LaunchOutcome::Launched(pid))
    }
}
