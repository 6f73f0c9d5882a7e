// Queue Depth Probe Port
// Abstraction over the broker: the only thing the supervisor observes is
// the instantaneous length of the monitored queue.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Probe failures. A failed probe never drives a scaling decision; the
/// autoscaler skips the tick and retries on the next interval.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Broker unreachable: {0}")]
    Unreachable(String),

    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed broker response: {0}")]
    MalformedResponse(String),
}

/// Queue depth probe port
///
/// Any implementation satisfying this contract is acceptable; tests use a
/// deterministic in-memory implementation.
#[async_trait]
pub trait QueueDepthProbe: Send + Sync {
    /// Number of queued but not-yet-claimed messages at this instant.
    /// No smoothing is promised.
    async fn depth(&self, queue: &str) -> Result<u64, ProbeError>;

    /// Reachability check, used by status reporting and strict startup.
    async fn ping(&self) -> Result<(), ProbeError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted probe: yields one result per call, holding the last
    /// result once the script runs out.
    pub struct MockQueueProbe {
        script: Mutex<VecDeque<Result<u64, ProbeError>>>,
        last: Mutex<Result<u64, ProbeError>>,
    }

    impl MockQueueProbe {
        pub fn fixed(depth: u64) -> Self {
            Self {
                script: Mutex::new(VecDeque::new()),
                last: Mutex::new(Ok(depth)),
            }
        }

        pub fn scripted(results: Vec<Result<u64, ProbeError>>) -> Self {
            let last = results
                .last()
                .cloned()
                .unwrap_or(Ok(0));
            Self {
                script: Mutex::new(results.into()),
                last: Mutex::new(last),
            }
        }
    }

    #[async_trait]
    impl QueueDepthProbe for MockQueueProbe {
        async fn depth(&self, _queue: &str) -> Result<u64, ProbeError> {
            if let Some(next) = self.script.lock().unwrap().pop_front() {
                *self.last.lock().unwrap() = next.clone();
                return next;
            }
            self.last.lock().unwrap().clone()
        }

        async fn ping(&self) -> Result<(), ProbeError> {
            Ok(())
        }
    }
}
