//! Reconnection supervisor.
//!
//! Drives a bounded, fixed-interval retry loop against the last remembered
//! device after a session failure. One supervisor per client: starting a
//! second while one is running is a no-op, and the ticker is cancelled the
//! moment a session reaches active or the owning client is torn down; a
//! dangling timer must never drive connection attempts against a session
//! that is already live.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use scalelink_types::DeviceIdentity;

/// Default interval between reconnection attempts.
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Default retry ceiling before the supervisor gives up.
const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Policy for automatic reconnection.
///
/// A fixed interval with a hard ceiling: the bound exists to keep a
/// permanently absent scale from draining the kiosk's radio and battery
/// with indefinite polling.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub interval: Duration,
    /// Attempts before the supervisor stops and surfaces a terminal status.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RETRY_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the delay between attempts.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the retry ceiling.
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Validate the policy and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::invalid_config("retry interval must be > 0"));
        }
        if self.max_attempts == 0 {
            return Err(Error::invalid_config("max_attempts must be >= 1"));
        }
        Ok(())
    }
}

/// Callbacks the supervisor drives on its owner.
///
/// The client implements this; a mock implementation makes the retry loop
/// testable without a radio.
#[async_trait]
pub(crate) trait SupervisorHooks: Send + Sync + 'static {
    /// Whether a session is currently active (streaming).
    async fn session_is_active(&self) -> bool;

    /// Start attempt `attempt` of `max` against `device`.
    async fn retry_tick(&self, device: &DeviceIdentity, attempt: u32, max: u32);

    /// The ceiling was reached with no successful connection.
    async fn retries_exhausted(&self, device: &DeviceIdentity, attempts: u32);
}

/// Handle to a running supervisor task.
pub(crate) struct Supervisor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Supervisor {
    /// Spawn the retry loop.
    ///
    /// The task holds only a weak reference to its owner: a dropped client
    /// ends the loop on the next tick.
    pub(crate) fn spawn<H: SupervisorHooks>(
        hooks: Weak<H>,
        device: DeviceIdentity,
        policy: RetryPolicy,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(policy.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval() fires immediately; consume the first tick so the
            // first retry waits a full interval after the failure.
            ticker.tick().await;

            let mut attempts: u32 = 0;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        info!("Reconnect supervisor cancelled for {}", device);
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                let Some(hooks) = hooks.upgrade() else {
                    debug!("Supervisor owner dropped, stopping");
                    return;
                };

                if hooks.session_is_active().await {
                    debug!("Session active again, supervisor stopping");
                    return;
                }

                if attempts >= policy.max_attempts {
                    warn!(
                        "Giving up on {} after {} attempts; manual reconnect required",
                        device, attempts
                    );
                    hooks.retries_exhausted(&device, attempts).await;
                    return;
                }

                attempts += 1;
                info!(
                    "Reconnection attempt {}/{} for {}",
                    attempts, policy.max_attempts, device
                );
                hooks.retry_tick(&device, attempts, policy.max_attempts).await;
            }
        });

        Self { cancel, handle }
    }

    /// Whether the retry loop is still running.
    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished() && !self.cancel.is_cancelled()
    }

    /// Stop the retry loop.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;

    #[derive(Default)]
    struct TestHooks {
        active: AtomicBool,
        ticks: AtomicU32,
        exhausted_after: AtomicU32,
        exhausted: AtomicBool,
        /// Become active once this many ticks have fired (0 = never).
        activate_after: AtomicU32,
    }

    #[async_trait]
    impl SupervisorHooks for TestHooks {
        async fn session_is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        async fn retry_tick(&self, _device: &DeviceIdentity, attempt: u32, _max: u32) {
            let ticks = self.ticks.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(attempt, ticks);
            let threshold = self.activate_after.load(Ordering::SeqCst);
            if threshold > 0 && ticks >= threshold {
                self.active.store(true, Ordering::SeqCst);
            }
        }

        async fn retries_exhausted(&self, _device: &DeviceIdentity, attempts: u32) {
            self.exhausted.store(true, Ordering::SeqCst);
            self.exhausted_after.store(attempts, Ordering::SeqCst);
        }
    }

    fn device() -> DeviceIdentity {
        DeviceIdentity::with_name("AA:BB", "Refill Scale 01")
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.interval, Duration::from_secs(3));
        assert_eq!(policy.max_attempts, 10);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetryPolicy::new().interval(Duration::ZERO).validate().is_err());
        assert!(RetryPolicy::new().max_attempts(0).validate().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_stops_after_exactly_max_attempts() {
        let hooks = Arc::new(TestHooks::default());
        let supervisor = Supervisor::spawn(
            Arc::downgrade(&hooks),
            device(),
            RetryPolicy::default(),
        );

        // 10 attempts at 3 s plus the exhaustion tick.
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert!(hooks.exhausted.load(Ordering::SeqCst));
        assert_eq!(hooks.ticks.load(Ordering::SeqCst), 10);
        assert_eq!(hooks.exhausted_after.load(Ordering::SeqCst), 10);
        assert!(!supervisor.is_running());

        // No further ticks after giving up.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hooks.ticks.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_supervisor_stops_once_session_is_active() {
        let hooks = Arc::new(TestHooks::default());
        hooks.activate_after.store(3, Ordering::SeqCst);
        let supervisor = Supervisor::spawn(
            Arc::downgrade(&hooks),
            device(),
            RetryPolicy::default(),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(hooks.ticks.load(Ordering::SeqCst), 3);
        assert!(!hooks.exhausted.load(Ordering::SeqCst));
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticking() {
        let hooks = Arc::new(TestHooks::default());
        let supervisor = Supervisor::spawn(
            Arc::downgrade(&hooks),
            device(),
            RetryPolicy::default(),
        );

        tokio::time::sleep(Duration::from_secs(7)).await;
        let ticks_at_cancel = hooks.ticks.load(Ordering::SeqCst);
        assert!(ticks_at_cancel >= 1);
        supervisor.cancel();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hooks.ticks.load(Ordering::SeqCst), ticks_at_cancel);
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_owner_ends_the_loop() {
        let hooks = Arc::new(TestHooks::default());
        let weak = Arc::downgrade(&hooks);
        drop(hooks);
        let supervisor = Supervisor::spawn(weak, device(), RetryPolicy::default());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_waits_a_full_interval() {
        let hooks = Arc::new(TestHooks::default());
        let _supervisor = Supervisor::spawn(
            Arc::downgrade(&hooks),
            device(),
            RetryPolicy::default(),
        );

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(hooks.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(hooks.ticks.load(Ordering::SeqCst), 1);
    }
}
