//! Background signing-key rotation.
//!
//! A dedicated task ticks every `rotation_check_interval` and calls
//! [`KeyRing::rotate_if_due`]. Checking more often than the rotation period
//! means a delayed or skipped tick only postpones rotation by one interval.
//! Failures are logged and retried on the next tick; the previous Current key
//! keeps signing meanwhile.

use crate::keys::KeyRing;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic key rotation worker.
///
/// # Example
///
/// ```ignore
/// let (task, shutdown) = KeyRotationTask::new(Arc::clone(&key_ring));
/// let handle = task.spawn();
///
/// // On shutdown:
/// shutdown.send(true).ok();
/// handle.await.ok();
/// ```
pub struct KeyRotationTask {
    keys: Arc<KeyRing>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl KeyRotationTask {
    /// Create the task and its shutdown sender. Send `true` (or drop the
    /// sender) to stop it.
    #[must_use]
    pub fn new(keys: Arc<KeyRing>) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = keys.config().rotation_check_interval;

        let task = Self {
            keys,
            interval,
            shutdown: shutdown_rx,
        };

        (task, shutdown_tx)
    }

    /// Override the check interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run on a new tokio task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until shutdown. The first check happens immediately.
    pub async fn run(mut self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Starting key rotation task"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*self.shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.keys.rotate_if_due().await {
                        Ok(true) => tracing::debug!("Scheduled key rotation completed"),
                        Ok(false) => tracing::trace!("Key rotation not due"),
                        Err(e) => tracing::warn!(
                            error = %e,
                            "Scheduled key rotation failed, retrying next tick"
                        ),
                    }
                }
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Key rotation task stopped");
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::TokenConfig;
    use crate::mocks::MockClock;

    async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_rotates_on_schedule_and_stops() {
        let clock = MockClock::default();
        let ring = Arc::new(KeyRing::new(TokenConfig::default(), Arc::new(clock.clone())).unwrap());

        let (task, shutdown) = KeyRotationTask::new(Arc::clone(&ring));
        let handle = task.with_interval(Duration::from_millis(20)).spawn();

        assert!(wait_for(|| ring.current_key().is_ok()).await);
        let first = ring.current_key().unwrap().kid().to_string();

        clock.advance(Duration::from_secs(24 * 60 * 60));
        assert!(wait_for(|| ring.current_key().unwrap().kid() != first).await);

        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropping_sender_stops_task() {
        let ring = Arc::new(
            KeyRing::new(TokenConfig::default(), Arc::new(MockClock::default())).unwrap(),
        );
        let (task, shutdown) = KeyRotationTask::new(ring);
        let handle = task.with_interval(Duration::from_secs(3600)).spawn();

        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(30), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
