// Fleet - the set of live worker handles
//
// The fleet is the only shared mutable state in the supervisor. Every
// membership change happens under a single lock; spawning is performed
// outside the lock and the handle is committed afterwards, while signal
// delivery (non-blocking) happens inside it so state transitions stay
// atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::{ExitInfo, WorkerCommand, WorkerState};
use crate::port::{ProcessSpawner, SpawnError, TimeProvider, WorkerProcess};

/// How often blocking waits re-poll child exits.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// One live child process, owned exclusively by the fleet from creation
/// to disposal.
struct WorkerHandle {
    pid: u32,
    started_at: i64,
    state: WorkerState,
    stop_requested_at: Option<i64>,
    force_killed: bool,
    process: Box<dyn WorkerProcess>,
}

impl WorkerHandle {
    async fn spawn(
        spawner: &dyn ProcessSpawner,
        command: &WorkerCommand,
        now: i64,
    ) -> Result<Self, SpawnError> {
        let process = spawner.spawn(command).await?;
        Ok(Self {
            pid: process.pid(),
            started_at: now,
            state: WorkerState::Starting,
            stop_requested_at: None,
            force_killed: false,
            process,
        })
    }

    /// Polite stop request. Idempotent; a no-op on `Dead` handles.
    fn stop_graceful(&mut self, now: i64) {
        match self.state {
            WorkerState::Starting | WorkerState::Running => {
                self.state = WorkerState::Stopping;
                self.stop_requested_at = Some(now);
                self.process.signal_term();
            }
            WorkerState::Stopping | WorkerState::Dead => {}
        }
    }

    /// Unignorable termination. Delivered at most once per handle.
    fn kill_forced(&mut self) {
        if self.state == WorkerState::Dead || self.force_killed {
            return;
        }
        self.force_killed = true;
        self.process.signal_kill();
    }

    /// Non-blocking exit poll; transitions to `Dead` on the first `Some`.
    fn poll_exit(&mut self) -> Option<ExitInfo> {
        if self.state == WorkerState::Dead {
            return None;
        }
        let info = self.process.try_wait()?;
        self.state = WorkerState::Dead;
        Some(info)
    }
}

/// Observation of the fleet's composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSize {
    pub starting: usize,
    pub running: usize,
    pub total: usize,
}

/// Per-worker view for status reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    pub pid: u32,
    pub state: WorkerState,
    pub started_at: i64,
}

/// The worker fleet. Grows and shrinks atomically within the configured
/// bounds, reaps OS-exited children, and escalates stops that outlive the
/// graceful window.
pub struct Fleet {
    handles: Mutex<Vec<WorkerHandle>>,
    spawner: Arc<dyn ProcessSpawner>,
    time: Arc<dyn TimeProvider>,
    command: WorkerCommand,
    min_processes: usize,
    max_processes: usize,
    startup_delay_ms: i64,
    graceful_timeout_ms: i64,
    unexpected_exits: AtomicU64,
}

impl Fleet {
    pub fn new(
        config: &Config,
        spawner: Arc<dyn ProcessSpawner>,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            spawner,
            time,
            command: config.worker_command.clone(),
            min_processes: config.min_processes,
            max_processes: config.max_processes,
            startup_delay_ms: config.process_startup_delay.as_millis() as i64,
            graceful_timeout_ms: config.graceful_shutdown_timeout.as_millis() as i64,
            unexpected_exits: AtomicU64::new(0),
        }
    }

    pub fn min_processes(&self) -> usize {
        self.min_processes
    }

    pub fn max_processes(&self) -> usize {
        self.max_processes
    }

    /// Workers that died without a stop request, since startup.
    pub fn unexpected_exits(&self) -> u64 {
        self.unexpected_exits.load(Ordering::Relaxed)
    }

    /// Reap pass, run at the start of every public operation while the
    /// lock is held: polls exits, promotes warmed-up workers, escalates
    /// expired graceful stops, and drops dead handles.
    fn reap_locked(&self, handles: &mut Vec<WorkerHandle>) {
        let now = self.time.now_millis();
        for handle in handles.iter_mut() {
            let state_before = handle.state;
            if let Some(exit) = handle.poll_exit() {
                match state_before {
                    WorkerState::Stopping => {
                        debug!(
                            pid = handle.pid,
                            exit_code = ?exit.code,
                            signaled = exit.signaled,
                            "worker stopped"
                        );
                    }
                    WorkerState::Starting | WorkerState::Running => {
                        self.unexpected_exits.fetch_add(1, Ordering::Relaxed);
                        warn!(
                            pid = handle.pid,
                            state = %state_before,
                            exit_code = ?exit.code,
                            signaled = exit.signaled,
                            "worker exited unexpectedly"
                        );
                    }
                    WorkerState::Dead => {}
                }
                continue;
            }
            match handle.state {
                WorkerState::Starting
                    if now - handle.started_at >= self.startup_delay_ms =>
                {
                    handle.state = WorkerState::Running;
                    debug!(pid = handle.pid, "worker warmed up");
                }
                WorkerState::Stopping
                    if !handle.force_killed
                        && handle
                            .stop_requested_at
                            .is_some_and(|at| now - at >= self.graceful_timeout_ms) =>
                {
                    warn!(pid = handle.pid, "graceful window elapsed, force-killing");
                    handle.kill_forced();
                }
                _ => {}
            }
        }
        handles.retain(|h| h.state != WorkerState::Dead);
    }

    fn count(handles: &[WorkerHandle]) -> FleetSize {
        let starting = handles
            .iter()
            .filter(|h| h.state == WorkerState::Starting)
            .count();
        let running = handles
            .iter()
            .filter(|h| h.state == WorkerState::Running)
            .count();
        FleetSize {
            starting,
            running,
            total: handles.len(),
        }
    }

    pub async fn size(&self) -> FleetSize {
        let mut handles = self.handles.lock().await;
        self.reap_locked(&mut handles);
        Self::count(&handles)
    }

    /// Consistent per-worker view; no partially-applied mutation is visible.
    pub async fn snapshot(&self) -> Vec<WorkerSnapshot> {
        let mut handles = self.handles.lock().await;
        self.reap_locked(&mut handles);
        handles
            .iter()
            .map(|h| WorkerSnapshot {
                pid: h.pid,
                state: h.state,
                started_at: h.started_at,
            })
            .collect()
    }

    /// Spawn one worker and commit it. The spawn syscall happens outside
    /// the lock; the handle is discarded if the fleet filled up meanwhile.
    async fn spawn_one(&self) -> Result<(), SpawnError> {
        let now = self.time.now_millis();
        let handle = match WorkerHandle::spawn(self.spawner.as_ref(), &self.command, now).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, command = %self.command, "failed to spawn worker");
                return Err(e);
            }
        };

        let mut handles = self.handles.lock().await;
        if handles.len() >= self.max_processes {
            warn!(
                pid = handle.pid,
                max = self.max_processes,
                "fleet filled concurrently, discarding fresh spawn"
            );
            let mut handle = handle;
            handle.kill_forced();
            return Err(SpawnError("fleet at capacity".to_string()));
        }
        info!(
            pid = handle.pid,
            total = handles.len() + 1,
            "worker spawned"
        );
        handles.push(handle);
        Ok(())
    }

    /// Attempt to add `k` workers, clamped to `max_processes`. Returns the
    /// number actually added; falling short of `k` is a normal result. A
    /// spawn failure aborts the remainder of the call without rolling back
    /// workers already started.
    pub async fn grow(&self, k: usize) -> usize {
        let mut added = 0;
        while added < k {
            let at_capacity = {
                let mut handles = self.handles.lock().await;
                self.reap_locked(&mut handles);
                handles.len() >= self.max_processes
            };
            if at_capacity {
                debug!(max = self.max_processes, "fleet at capacity, not growing");
                break;
            }
            if self.spawn_one().await.is_err() {
                break;
            }
            added += 1;
        }
        if added < k {
            debug!(requested = k, added, "grow clamped");
        }
        self.ensure_min().await;
        added
    }

    /// Request a graceful stop for up to `k` of the oldest `Running`
    /// workers (ties broken by lower pid), clamped so the fleet never goes
    /// below `min_processes`. `Starting` workers are not eligible. Returns
    /// once the stops have been requested; actual removal happens via
    /// reaping.
    pub async fn shrink(&self, k: usize) -> usize {
        let removed = {
            let mut handles = self.handles.lock().await;
            self.reap_locked(&mut handles);
            let total = handles.len();
            if total <= self.min_processes {
                debug!(min = self.min_processes, "fleet at minimum, not shrinking");
                0
            } else {
                let allowance = total - self.min_processes;
                let now = self.time.now_millis();
                let mut candidates: Vec<usize> = (0..handles.len())
                    .filter(|&i| handles[i].state == WorkerState::Running)
                    .collect();
                candidates.sort_by_key(|&i| (handles[i].started_at, handles[i].pid));
                candidates.truncate(k.min(allowance));
                for &i in &candidates {
                    handles[i].stop_graceful(now);
                    info!(pid = handles[i].pid, "requested graceful stop for scale-down");
                }
                candidates.len()
            }
        };
        if removed < k {
            debug!(requested = k, removed, "shrink clamped");
        }
        self.ensure_min().await;
        removed
    }

    /// Min-enforcement: spawn workers until the fleet is back at
    /// `min_processes`. The only unconditional replace-on-death path.
    pub async fn ensure_min(&self) -> usize {
        let mut spawned = 0;
        loop {
            let deficit = {
                let mut handles = self.handles.lock().await;
                self.reap_locked(&mut handles);
                self.min_processes.saturating_sub(handles.len())
            };
            if deficit == 0 {
                break;
            }
            if self.spawn_one().await.is_err() {
                break;
            }
            spawned += 1;
        }
        if spawned > 0 {
            info!(
                spawned,
                min = self.min_processes,
                "restored minimum fleet size"
            );
        }
        spawned
    }

    /// Request a graceful stop for every live worker, wait up to the
    /// graceful window, force-kill survivors, and block until every handle
    /// is dead.
    pub async fn stop_all(&self) {
        {
            let mut handles = self.handles.lock().await;
            self.reap_locked(&mut handles);
            info!(total = handles.len(), "stopping all workers");
            let now = self.time.now_millis();
            for handle in handles.iter_mut() {
                handle.stop_graceful(now);
            }
        }

        let deadline = self.time.now_millis() + self.graceful_timeout_ms;
        loop {
            {
                let mut handles = self.handles.lock().await;
                self.reap_locked(&mut handles);
                if handles.is_empty() {
                    break;
                }
                if self.time.now_millis() >= deadline {
                    for handle in handles.iter_mut() {
                        warn!(
                            pid = handle.pid,
                            "graceful shutdown window elapsed, force-killing"
                        );
                        handle.kill_forced();
                    }
                }
            }
            tokio::time::sleep(REAP_POLL_INTERVAL).await;
        }
        info!("all workers stopped");
    }
}
