// Redis queue depth probe
// One multiplexed connection is reused across ticks; transient failures
// retry once within the tick after a short backoff, and every attempt is
// bounded by a timeout well under the check interval.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::ErrorKind;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use queueherd_core::port::{ProbeError, QueueDepthProbe};

const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Observes queue depth with LLEN against the configured Redis instance.
pub struct RedisQueueProbe {
    client: redis::Client,
    conn: Mutex<Option<ConnectionManager>>,
    timeout: Duration,
}

impl RedisQueueProbe {
    /// `url` is a `redis://` connection string; `timeout` bounds every
    /// individual connect and query attempt.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProbeError> {
        let client =
            redis::Client::open(url).map_err(|e| ProbeError::Unreachable(e.to_string()))?;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            timeout,
        })
    }

    fn map_error(&self, e: redis::RedisError) -> ProbeError {
        if e.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else if matches!(e.kind(), ErrorKind::TypeError | ErrorKind::ResponseError) {
            ProbeError::MalformedResponse(e.to_string())
        } else {
            ProbeError::Unreachable(e.to_string())
        }
    }

    /// Pooled connection, established lazily and reused across ticks.
    async fn connection(&self) -> Result<ConnectionManager, ProbeError> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let manager = tokio::time::timeout(
            self.timeout,
            ConnectionManager::new(self.client.clone()),
        )
        .await
        .map_err(|_| ProbeError::Timeout(self.timeout))?
        .map_err(|e| self.map_error(e))?;

        info!("connected to redis broker");
        *guard = Some(manager.clone());
        Ok(manager)
    }

    async fn drop_connection(&self) {
        *self.conn.lock().await = None;
    }

    async fn query_depth(&self, queue: &str) -> Result<u64, ProbeError> {
        let mut conn = self.connection().await?;
        let depth: i64 = tokio::time::timeout(
            self.timeout,
            redis::cmd("LLEN").arg(queue).query_async(&mut conn),
        )
        .await
        .map_err(|_| ProbeError::Timeout(self.timeout))?
        .map_err(|e| self.map_error(e))?;

        if depth < 0 {
            return Err(ProbeError::MalformedResponse(format!(
                "negative queue length {}",
                depth
            )));
        }
        Ok(depth as u64)
    }

    async fn query_ping(&self) -> Result<(), ProbeError> {
        let mut conn = self.connection().await?;
        let reply: String =
            tokio::time::timeout(self.timeout, redis::cmd("PING").query_async(&mut conn))
                .await
                .map_err(|_| ProbeError::Timeout(self.timeout))?
                .map_err(|e| self.map_error(e))?;
        if reply != "PONG" {
            return Err(ProbeError::MalformedResponse(format!(
                "unexpected ping reply {:?}",
                reply
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl QueueDepthProbe for RedisQueueProbe {
    async fn depth(&self, queue: &str) -> Result<u64, ProbeError> {
        match self.query_depth(queue).await {
            Ok(depth) => {
                debug!(queue, depth, "queue depth observed");
                Ok(depth)
            }
            // A bad reply shape will not improve on retry
            Err(e @ ProbeError::MalformedResponse(_)) => Err(e),
            Err(first) => {
                debug!(queue, error = %first, "probe attempt failed, retrying once");
                self.drop_connection().await;
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.query_depth(queue).await
            }
        }
    }

    async fn ping(&self) -> Result<(), ProbeError> {
        match self.query_ping().await {
            Ok(()) => Ok(()),
            Err(e @ ProbeError::MalformedResponse(_)) => Err(e),
            Err(_) => {
                self.drop_connection().await;
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.query_ping().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_unreachable() {
        let result = RedisQueueProbe::new("not-a-redis-url", Duration::from_secs(1));
        assert!(matches!(result, Err(ProbeError::Unreachable(_))));
    }

    #[tokio::test]
    async fn test_depth_against_dead_broker_fails() {
        // Port 1 is never a redis server; both attempts must fail fast
        let probe =
            RedisQueueProbe::new("redis://127.0.0.1:1/0", Duration::from_millis(300)).unwrap();
        let result = probe.depth("tasks").await;
        assert!(result.is_err());
    }
}
