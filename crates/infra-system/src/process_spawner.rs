// Process spawner implementation
// Workers are launched verbatim from the configured command line and keep
// the supervisor's stdout/stderr; they own their own logging.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use queueherd_core::domain::{ExitInfo, WorkerCommand};
use queueherd_core::port::{ProcessSpawner, SpawnError, WorkerProcess};

/// Spawns worker children via `tokio::process`.
pub struct TokioProcessSpawner;

impl TokioProcessSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TokioProcessSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSpawner for TokioProcessSpawner {
    async fn spawn(&self, command: &WorkerCommand) -> Result<Box<dyn WorkerProcess>, SpawnError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| SpawnError(e.to_string()))?;
        let pid = child
            .id()
            .ok_or_else(|| SpawnError("child exited before a pid was observed".to_string()))?;

        debug!(pid, command = %command, "spawned worker process");
        Ok(Box::new(TokioWorkerProcess { pid, child }))
    }
}

/// A live child. Signals are delivered straight to the pid so delivery
/// never blocks; exit status comes from the non-blocking `try_wait`.
pub struct TokioWorkerProcess {
    pid: u32,
    child: Child,
}

impl WorkerProcess for TokioWorkerProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn signal_term(&mut self) {
        send_signal(self.pid, nix::sys::signal::Signal::SIGTERM);
    }

    fn signal_kill(&mut self) {
        send_signal(self.pid, nix::sys::signal::Signal::SIGKILL);
    }

    fn try_wait(&mut self) -> Option<ExitInfo> {
        match self.child.try_wait() {
            Ok(Some(status)) => Some(exit_info(status)),
            Ok(None) => None,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "failed to poll worker exit");
                None
            }
        }
    }
}

fn send_signal(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if let Err(e) = kill(Pid::from_raw(pid as i32), signal) {
        // Races with exit are expected; the reaper collects the status
        debug!(pid, signal = %signal, error = %e, "signal delivery failed");
    }
}

fn exit_info(status: std::process::ExitStatus) -> ExitInfo {
    use std::os::unix::process::ExitStatusExt;

    ExitInfo {
        code: status.code(),
        signaled: status.signal().is_some(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_for_exit(process: &mut Box<dyn WorkerProcess>) -> ExitInfo {
        for _ in 0..100 {
            if let Some(exit) = process.try_wait() {
                return exit;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("worker did not exit in time");
    }

    #[tokio::test]
    async fn test_spawn_and_clean_exit() {
        let spawner = TokioProcessSpawner::new();
        let command = WorkerCommand::parse("true").unwrap();
        let mut process = spawner.spawn(&command).await.unwrap();
        assert!(process.pid() > 0);

        let exit = wait_for_exit(&mut process).await;
        assert_eq!(exit.code, Some(0));
        assert!(!exit.signaled);
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let spawner = TokioProcessSpawner::new();
        let command = WorkerCommand::parse("/nonexistent/worker-binary").unwrap();
        assert!(spawner.spawn(&command).await.is_err());
    }

    #[tokio::test]
    async fn test_sigterm_stops_worker() {
        let spawner = TokioProcessSpawner::new();
        let command = WorkerCommand::parse("sleep 30").unwrap();
        let mut process = spawner.spawn(&command).await.unwrap();

        assert!(process.try_wait().is_none(), "worker should still be running");
        process.signal_term();
        let exit = wait_for_exit(&mut process).await;
        assert!(exit.signaled);
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn test_sigkill_stops_stubborn_worker() {
        let spawner = TokioProcessSpawner::new();
        // A shell that traps SIGTERM and keeps going
        let command = WorkerCommand {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "trap '' TERM; sleep 30".to_string(),
            ],
        };
        let mut process = spawner.spawn(&command).await.unwrap();

        process.signal_term();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(process.try_wait().is_none(), "SIGTERM is trapped");

        process.signal_kill();
        let exit = wait_for_exit(&mut process).await;
        assert!(exit.signaled);
    }

    #[tokio::test]
    async fn test_signals_after_exit_are_harmless() {
        let spawner = TokioProcessSpawner::new();
        let command = WorkerCommand::parse("true").unwrap();
        let mut process = spawner.spawn(&command).await.unwrap();
        wait_for_exit(&mut process).await;

        // Idempotent by contract: no panic, no error surfaced
        process.signal_term();
        process.signal_kill();
    }
}
