use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use anyhow::Context;
use tokio::process::{Child, Command};

/// Program, arguments, working directory and extra environment for one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandSpec {
    pub(crate) program: PathBuf,
    pub(crate) args: Vec<String>,
    pub(crate) cwd: Option<PathBuf>,
    pub(crate) env: Vec<(String, String)>,
}

impl CommandSpec {
    pub(crate) fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into(), args: Vec::new(), cwd: None, env: Vec::new() }
    }

    pub(crate) fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub(crate) fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub(crate) fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub(crate) fn display(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command.envs(self.env.iter().map(|(key, value)| (key.as_str(), value.as_str())));
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
    }

    /// Runs the command to completion with inherited stdio.
    pub(crate) async fn status(&self) -> anyhow::Result<ExitStatus> {
        self.to_command()
            .status()
            .await
            .with_context(|| format!("failed to run `{}`", self.display()))
    }
}

pub(crate) struct ManagedChild {
    name: &'static str,
    child: Child,
}

impl ManagedChild {
    pub(crate) fn spawn(name: &'static str, spec: &CommandSpec) -> anyhow::Result<Self> {
        let child = spec
            .to_command()
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {name}: `{}`", spec.display()))?;
        tracing::info!(process = name, pid = ?child.id(), command = %spec.display(), "Process started");
        Ok(Self { name, child })
    }

    pub(crate) async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    pub(crate) fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Asks a running child to stop: SIGINT where available, a hard kill otherwise.
    pub(crate) fn interrupt(&mut self) {
        if !self.is_running() {
            return;
        }
        tracing::info!(process = self.name, "Terminating process");

        #[cfg(unix)]
        if let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid), Signal::SIGINT) {
                Ok(()) => return,
                Err(err) => {
                    tracing::warn!(process = self.name, error = %err, "SIGINT failed; killing")
                }
            }
        }

        if let Err(err) = self.child.start_kill() {
            tracing::warn!(process = self.name, error = %err, "Failed to kill process");
        }
    }

    /// Waits up to `grace` for the child to exit, then kills it.
    pub(crate) async fn wait_or_kill(&mut self, grace: Duration) {
        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => tracing::info!(process = self.name, %status, "Process stopped"),
            Ok(Err(err)) => {
                tracing::warn!(process = self.name, error = %err, "Failed to wait for process")
            }
            Err(_) => {
                tracing::warn!(
                    process = self.name,
                    grace_secs = grace.as_secs(),
                    "Process did not stop in time; killing"
                );
                if let Err(err) = self.child.kill().await {
                    tracing::warn!(process = self.name, error = %err, "Failed to kill process");
                }
            }
        }
    }
}
