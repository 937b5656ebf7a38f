//! Liveness Watchdog
//!
//! Tracks when the last frame arrived on a connection. A connection with no
//! frame of any kind (heartbeats included) for the idle timeout is treated as
//! dead and handed to the reconnect policy, without waiting for TCP to notice.

use std::time::Duration;

use tokio::time::Instant;

/// Idle deadline for one connection.
#[derive(Debug, Clone)]
pub struct Liveness {
    idle_timeout: Duration,
    last_activity: Instant,
}

impl Liveness {
    /// Start the clock now.
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            last_activity: Instant::now(),
        }
    }

    /// Record that a frame or keep-alive comment arrived.
    pub fn record_activity(&mut self) {
        self.last_activity = Instant::now();
    }

    /// When the connection is considered dead.
    #[must_use]
    pub fn deadline(&self) -> Instant {
        self.last_activity + self.idle_timeout
    }

    /// Whether the deadline has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.deadline()
    }

    /// Configured idle timeout.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Time since the last activity.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Resolves once the current deadline passes.
    pub async fn expired(&self) {
        tokio::time::sleep_until(self.deadline()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expires_after_idle_timeout() {
        let liveness = Liveness::new(Duration::from_secs(20));
        let started = Instant::now();

        liveness.expired().await;

        assert!(started.elapsed() >= Duration::from_secs(20));
        assert!(started.elapsed() < Duration::from_secs(21));
        assert!(liveness.is_expired_at(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn activity_pushes_deadline() {
        let mut liveness = Liveness::new(Duration::from_secs(20));
        let started = Instant::now();

        tokio::time::advance(Duration::from_secs(15)).await;
        assert!(!liveness.is_expired_at(Instant::now()));
        liveness.record_activity();
        assert!(liveness.idle_for() < Duration::from_secs(1));

        liveness.expired().await;
        assert!(started.elapsed() >= Duration::from_secs(35));
        assert!(started.elapsed() < Duration::from_secs(36));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_is_pending_until_deadline() {
        let liveness = Liveness::new(Duration::from_secs(10));
        let mut expired = tokio_test::task::spawn(liveness.expired());

        tokio_test::assert_pending!(expired.poll());
        tokio::time::advance(Duration::from_secs(9)).await;
        tokio_test::assert_pending!(expired.poll());
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio_test::assert_ready!(expired.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_races_cleanly_with_cancellation() {
        let liveness = Liveness::new(Duration::from_secs(3600));
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();

        let expired = tokio::select! {
            () = cancel.cancelled() => false,
            () = liveness.expired() => true,
        };
        assert!(!expired);
        assert_eq!(liveness.idle_timeout(), Duration::from_secs(3600));
    }
}
