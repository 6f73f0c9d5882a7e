// Process Port
// Abstraction for spawning and controlling worker child processes.
// The fleet owns every spawned process outright; a worker never holds a
// reference back to the fleet.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{ExitInfo, WorkerCommand};

/// The OS refused the launch (command not found, permission denied,
/// resource exhaustion).
#[derive(Error, Debug, Clone)]
#[error("Spawn failed: {0}")]
pub struct SpawnError(pub String);

/// Spawner port: launches the configured worker command as a child process.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    async fn spawn(&self, command: &WorkerCommand) -> Result<Box<dyn WorkerProcess>, SpawnError>;
}

/// A live child process.
///
/// Signal delivery is non-blocking by contract; both signal methods are
/// called while the fleet lock is held. `try_wait` is the non-blocking
/// exit poll.
pub trait WorkerProcess: Send + Sync {
    fn pid(&self) -> u32;

    /// Deliver the platform's polite termination request.
    fn signal_term(&mut self);

    /// Deliver an unignorable termination signal.
    fn signal_kill(&mut self);

    /// Non-blocking exit poll: `Some` once the child has exited.
    fn try_wait(&mut self) -> Option<ExitInfo>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// How a mock worker reacts to SIGTERM.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum TermBehavior {
        /// Exit promptly on the polite request.
        Exit,
        /// Ignore SIGTERM; only SIGKILL ends the process.
        Ignore,
    }

    #[derive(Debug)]
    struct ProcState {
        alive: bool,
        exit: Option<ExitInfo>,
        term_count: u32,
        kill_count: u32,
        behavior: TermBehavior,
    }

    /// Handle a test keeps to inspect or externally kill a mock worker.
    #[derive(Clone)]
    pub struct MockProcessControl {
        pid: u32,
        state: Arc<Mutex<ProcState>>,
    }

    impl MockProcessControl {
        pub fn pid(&self) -> u32 {
            self.pid
        }

        /// Simulate an unexpected death (the process exits on its own).
        pub fn exit(&self, code: i32) {
            let mut st = self.state.lock().unwrap();
            if st.alive {
                st.alive = false;
                st.exit = Some(ExitInfo {
                    code: Some(code),
                    signaled: false,
                });
            }
        }

        pub fn is_alive(&self) -> bool {
            self.state.lock().unwrap().alive
        }

        pub fn term_count(&self) -> u32 {
            self.state.lock().unwrap().term_count
        }

        pub fn kill_count(&self) -> u32 {
            self.state.lock().unwrap().kill_count
        }
    }

    pub struct MockWorkerProcess {
        pid: u32,
        state: Arc<Mutex<ProcState>>,
    }

    impl WorkerProcess for MockWorkerProcess {
        fn pid(&self) -> u32 {
            self.pid
        }

        fn signal_term(&mut self) {
            let mut st = self.state.lock().unwrap();
            st.term_count += 1;
            if st.alive && st.behavior == TermBehavior::Exit {
                st.alive = false;
                st.exit = Some(ExitInfo {
                    code: Some(0),
                    signaled: false,
                });
            }
        }

        fn signal_kill(&mut self) {
            let mut st = self.state.lock().unwrap();
            st.kill_count += 1;
            if st.alive {
                st.alive = false;
                st.exit = Some(ExitInfo {
                    code: None,
                    signaled: true,
                });
            }
        }

        fn try_wait(&mut self) -> Option<ExitInfo> {
            let st = self.state.lock().unwrap();
            if st.alive {
                None
            } else {
                st.exit
            }
        }
    }

    /// Mock spawner: hands out workers with increasing pids and keeps a
    /// control handle per spawn for the test to drive.
    pub struct MockProcessSpawner {
        next_pid: AtomicU32,
        behavior: Mutex<TermBehavior>,
        fail_after: Mutex<Option<usize>>,
        spawn_count: AtomicUsize,
        spawned: Mutex<Vec<MockProcessControl>>,
    }

    impl MockProcessSpawner {
        pub fn new() -> Self {
            Self::with_behavior(TermBehavior::Exit)
        }

        pub fn with_behavior(behavior: TermBehavior) -> Self {
            Self {
                next_pid: AtomicU32::new(1000),
                behavior: Mutex::new(behavior),
                fail_after: Mutex::new(None),
                spawn_count: AtomicUsize::new(0),
                spawned: Mutex::new(Vec::new()),
            }
        }

        /// Fail every spawn after the first `n` succeed.
        pub fn fail_after(&self, n: usize) {
            *self.fail_after.lock().unwrap() = Some(n);
        }

        pub fn spawn_count(&self) -> usize {
            self.spawn_count.load(Ordering::SeqCst)
        }

        pub fn spawned(&self) -> Vec<MockProcessControl> {
            self.spawned.lock().unwrap().clone()
        }
    }

    impl Default for MockProcessSpawner {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ProcessSpawner for MockProcessSpawner {
        async fn spawn(
            &self,
            _command: &WorkerCommand,
        ) -> Result<Box<dyn WorkerProcess>, SpawnError> {
            let count = self.spawn_count.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = *self.fail_after.lock().unwrap() {
                if count >= limit {
                    return Err(SpawnError("mock spawn refused".to_string()));
                }
            }

            let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
            let state = Arc::new(Mutex::new(ProcState {
                alive: true,
                exit: None,
                term_count: 0,
                kill_count: 0,
                behavior: *self.behavior.lock().unwrap(),
            }));
            self.spawned.lock().unwrap().push(MockProcessControl {
                pid,
                state: Arc::clone(&state),
            });
            Ok(Box::new(MockWorkerProcess { pid, state }))
        }
    }
}
