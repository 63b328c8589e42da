//! SSE keep-alive sessions for the MCP streaming endpoint
//!
//! A session is one open `GET /mcp` response. It owns its heartbeat timer:
//! the timer lives inside the body stream, so it is dropped together with the
//! stream when the peer disconnects, a write fails, or the server shuts down.

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::Stream;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics;

/// SSE comment frame used as the heartbeat
pub const HEARTBEAT_FRAME: &[u8] = b":\n\n";

/// Session error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("Too many concurrent sessions")]
    TooManySessions,
    #[error("Server is shutting down")]
    ShuttingDown,
}

/// Tracks open SSE streams and ends them all on shutdown
pub struct SseSessions {
    active: Arc<AtomicUsize>,
    max_sessions: usize,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SseSessions {
    pub fn new(interval: Duration, max_sessions: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max_sessions,
            interval,
            shutdown: CancellationToken::new(),
        }
    }

    /// Open a session and return its heartbeat stream.
    ///
    /// The first heartbeat is emitted one interval after the call. The
    /// stream ends when [`SseSessions::shutdown`] is called; dropping it
    /// releases the session slot.
    pub fn open(
        &self,
    ) -> Result<impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static, SessionError> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::ShuttingDown);
        }

        let guard = SessionGuard::acquire(self.active.clone(), self.max_sessions)?;
        let shutdown = self.shutdown.clone();
        let period = self.interval;

        tracing::debug!(session = %guard.id, "SSE session opened");

        Ok(async_stream::stream! {
            let _guard = guard;
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                let beat = tokio::select! {
                    _ = shutdown.cancelled() => false,
                    _ = ticker.tick() => true,
                };
                if !beat {
                    break;
                }
                metrics::record_heartbeat();
                yield std::result::Result::<Bytes, Infallible>::Ok(Bytes::from_static(HEARTBEAT_FRAME));
            }
        })
    }

    /// End every open stream and refuse new ones
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Get active session count
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Occupies one session slot until dropped
struct SessionGuard {
    id: Uuid,
    active: Arc<AtomicUsize>,
}

impl SessionGuard {
    fn acquire(active: Arc<AtomicUsize>, max: usize) -> Result<Self, SessionError> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < max).then_some(n + 1)
            })
            .map_err(|_| SessionError::TooManySessions)?;
        metrics::set_sse_sessions(active.load(Ordering::Acquire));

        Ok(Self {
            id: Uuid::new_v4(),
            active,
        })
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let remaining = self.active.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::set_sse_sessions(remaining);
        tracing::debug!(session = %self.id, "SSE session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test(start_paused = true)]
    async fn test_first_heartbeat_after_interval() {
        let sessions = SseSessions::new(Duration::from_secs(30), 10);
        let stream = sessions.open().unwrap();
        tokio::pin!(stream);

        let start = Instant::now();
        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], HEARTBEAT_FRAME);
        assert!(start.elapsed() >= Duration::from_secs(30));

        let frame = stream.next().await.unwrap().unwrap();
        assert_eq!(&frame[..], HEARTBEAT_FRAME);
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_session() {
        let sessions = SseSessions::new(Duration::from_secs(30), 10);
        let stream = sessions.open().unwrap();
        assert_eq!(sessions.active_count(), 1);

        drop(stream);
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_after_heartbeats_releases_session() {
        let sessions = SseSessions::new(Duration::from_secs(1), 10);
        let mut stream = Box::pin(sessions.open().unwrap());
        stream.next().await.unwrap().unwrap();
        stream.next().await.unwrap().unwrap();
        assert_eq!(sessions.active_count(), 1);

        drop(stream);
        assert_eq!(sessions.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_limit() {
        let sessions = SseSessions::new(Duration::from_secs(30), 1);
        let first = sessions.open().unwrap();
        assert!(matches!(
            sessions.open().err(),
            Some(SessionError::TooManySessions)
        ));

        drop(first);
        assert!(sessions.open().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ends_streams() {
        let sessions = SseSessions::new(Duration::from_secs(30), 10);
        let mut stream = Box::pin(sessions.open().unwrap());

        sessions.shutdown();
        assert!(stream.next().await.is_none());
        drop(stream);
        assert_eq!(sessions.active_count(), 0);
        assert!(matches!(
            sessions.open().err(),
            Some(SessionError::ShuttingDown)
        ));
    }
}
