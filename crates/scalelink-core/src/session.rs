//! GATT session state machine.
//!
//! One [`Session`] owns one physical connection attempt and its lifecycle:
//!
//! ```text
//! Idle -> Connecting -> Subscribing -> Active -> Closing -> Idle
//! ```
//!
//! with any state able to fail into `Failed(reason)` on an I/O error, and
//! `Active -> Failed(LinkLost)` when the platform reports an unexpected
//! disconnect. Each connection attempt builds a fresh session; nothing is
//! reused across attempts, which is what keeps notification subscriptions
//! from accumulating across reconnects.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, WireProfile};
use crate::events::{DisconnectReason, EventDispatcher, ScaleEvent};
use crate::transport::{DisconnectStream, PayloadStream, ScaleLink, ScaleTransport};
use scalelink_types::{DeviceIdentity, WeightReading, decode_grams};

/// State of a GATT session. Rebuilt from `Idle` on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No connection activity.
    Idle,
    /// Opening the transport connection.
    Connecting,
    /// Resolving the service and weight characteristic.
    Subscribing,
    /// Streaming payloads.
    Active,
    /// Releasing the subscription and transport connection.
    Closing,
    /// The session died; the reason decides whether the supervisor runs.
    Failed(SessionFailure),
}

/// Why a session failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    /// The platform reported an unexpected mid-session disconnect.
    LinkLost,
    /// The characteristic supports neither notify nor read. Terminal for
    /// this device.
    Unsupported,
    /// A transport operation (connect/resolve/subscribe/read) failed.
    Transport(String),
}

impl SessionFailure {
    /// The disconnect reason to publish for this failure.
    pub(crate) fn disconnect_reason(&self) -> DisconnectReason {
        match self {
            Self::LinkLost => DisconnectReason::LinkLost,
            Self::Unsupported => DisconnectReason::Unsupported,
            Self::Transport(msg) => DisconnectReason::TransportError(msg.clone()),
        }
    }

    /// Whether the reconnection supervisor may recover from this failure.
    pub(crate) fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// How an active session receives payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The scale pushes value changes as notifications.
    Notify,
    /// The session reads the characteristic on a fixed interval.
    Poll,
}

/// Handle to a running session task.
///
/// Dropping the handle cancels the task; [`shutdown`](Self::shutdown)
/// additionally waits for the link to be released.
pub(crate) struct Session {
    device: DeviceIdentity,
    cancel: CancellationToken,
    state_rx: watch::Receiver<SessionState>,
    handle: Option<JoinHandle<()>>,
}

impl Session {
    /// Spawn a session against `device` over the given transport.
    pub(crate) fn spawn<T: ScaleTransport>(
        transport: Arc<T>,
        device: DeviceIdentity,
        profile: WireProfile,
        config: SessionConfig,
        weight: watch::Sender<WeightReading>,
        events: EventDispatcher,
    ) -> Self {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let task = SessionTask {
            transport,
            device: device.clone(),
            profile,
            config,
            cancel: cancel.clone(),
            state: state_tx,
            weight,
            events,
        };
        let handle = tokio::spawn(task.run());

        Self {
            device,
            cancel,
            state_rx,
            handle: Some(handle),
        }
    }

    pub(crate) fn device(&self) -> &DeviceIdentity {
        &self.device
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    pub(crate) fn is_active(&self) -> bool {
        matches!(self.state(), SessionState::Active)
    }

    /// Whether the session is still making progress (connecting, resolving,
    /// or streaming). A second `connect()` is a no-op while this holds.
    pub(crate) fn is_alive(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Connecting | SessionState::Subscribing | SessionState::Active
        )
    }

    /// Cancel the session and wait for the link to be released.
    pub(crate) async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            debug!("Session task join error: {}", e);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // A dropped handle must not leave a pump task driving the radio.
        self.cancel.cancel();
    }
}

/// The session task body; owns the link for the lifetime of the attempt.
struct SessionTask<T: ScaleTransport> {
    transport: Arc<T>,
    device: DeviceIdentity,
    profile: WireProfile,
    config: SessionConfig,
    cancel: CancellationToken,
    state: watch::Sender<SessionState>,
    weight: watch::Sender<WeightReading>,
    events: EventDispatcher,
}

impl<T: ScaleTransport> SessionTask<T> {
    fn set_state(&self, next: SessionState) {
        debug!(device = %self.device, state = ?next, "session state change");
        self.state.send_replace(next);
    }

    fn fail_transport(&self, error: &crate::error::Error) -> SessionState {
        self.events.send(ScaleEvent::Error {
            message: error.to_string(),
        });
        SessionState::Failed(SessionFailure::Transport(error.to_string()))
    }

    /// Decode one inbound payload and publish it. Bad frames are dropped;
    /// one undecodable sample does not justify tearing down the link.
    fn publish(&self, payload: &[u8]) {
        match decode_grams(payload) {
            Ok(grams) => {
                self.weight.send_replace(WeightReading::new(grams));
                self.events.send(ScaleEvent::Reading { grams });
            }
            Err(e) => {
                debug!(device = %self.device, error = %e, len = payload.len(), "dropping undecodable payload");
            }
        }
    }

    fn enter_active(&self, delivery: Delivery) {
        self.set_state(SessionState::Active);
        self.events.send(ScaleEvent::Connected {
            device: self.device.clone(),
            delivery,
        });
    }

    async fn run(self) {
        self.set_state(SessionState::Connecting);
        let link = match self.transport.open(&self.device, &self.config).await {
            Ok(link) => link,
            Err(e) => {
                warn!("Failed to open link to {}: {}", self.device, e);
                let failed = self.fail_transport(&e);
                self.set_state(failed);
                return;
            }
        };

        // connect() can win a race against a disconnect() issued while it
        // was in flight; honour the cancellation before going further.
        if self.cancel.is_cancelled() {
            self.set_state(SessionState::Closing);
            let _ = link.close().await;
            self.set_state(SessionState::Idle);
            return;
        }

        self.set_state(SessionState::Subscribing);
        let caps = match link.resolve(&self.profile).await {
            Ok(caps) => caps,
            Err(e) => {
                warn!(
                    "Failed to resolve weight characteristic on {}: {}",
                    self.device, e
                );
                let failed = self.fail_transport(&e);
                let _ = link.close().await;
                self.set_state(failed);
                return;
            }
        };

        let disconnects = match link.disconnects().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to watch disconnect events for {}: {}", self.device, e);
                let failed = self.fail_transport(&e);
                let _ = link.close().await;
                self.set_state(failed);
                return;
            }
        };

        let failure = if caps.notify {
            match link.subscribe().await {
                Ok(payloads) => {
                    self.enter_active(Delivery::Notify);
                    self.pump_notify(payloads, disconnects).await
                }
                Err(e) => {
                    warn!("Subscribe failed on {}: {}", self.device, e);
                    self.events.send(ScaleEvent::Error {
                        message: e.to_string(),
                    });
                    Some(SessionFailure::Transport(e.to_string()))
                }
            }
        } else if caps.read {
            info!(
                "Scale {} lacks notify support, polling every {:?}",
                self.device, self.config.poll_interval
            );
            self.enter_active(Delivery::Poll);
            self.pump_poll(&link, disconnects).await
        } else {
            warn!(
                "Scale {} supports neither notifications nor reads",
                self.device
            );
            Some(SessionFailure::Unsupported)
        };

        // Single teardown path: deliberate disconnects, link losses, and
        // capability failures all release the subscription and link here.
        self.set_state(SessionState::Closing);
        if let Err(e) = link.close().await {
            debug!("Error closing link to {}: {}", self.device, e);
        }

        match failure {
            None => self.set_state(SessionState::Idle),
            Some(failure) => {
                self.events.send(ScaleEvent::Disconnected {
                    device: self.device.clone(),
                    reason: failure.disconnect_reason(),
                });
                self.set_state(SessionState::Failed(failure));
            }
        }
    }

    async fn pump_notify(
        &self,
        mut payloads: PayloadStream,
        mut disconnects: DisconnectStream,
    ) -> Option<SessionFailure> {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = disconnects.next() => {
                    warn!("Platform reported disconnect for {}", self.device);
                    return Some(SessionFailure::LinkLost);
                }
                payload = payloads.next() => match payload {
                    Some(bytes) => self.publish(&bytes),
                    None => {
                        warn!("Notification stream ended for {}", self.device);
                        return Some(SessionFailure::LinkLost);
                    }
                },
            }
        }
    }

    async fn pump_poll(
        &self,
        link: &T::Link,
        mut disconnects: DisconnectStream,
    ) -> Option<SessionFailure> {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = disconnects.next() => {
                    warn!("Platform reported disconnect for {}", self.device);
                    return Some(SessionFailure::LinkLost);
                }
                _ = ticker.tick() => match link.read_payload().await {
                    Ok(bytes) => self.publish(&bytes),
                    Err(e) => {
                        warn!("Poll read failed for {}: {}", self.device, e);
                        self.events.send(ScaleEvent::Error { message: e.to_string() });
                        return Some(SessionFailure::Transport(e.to_string()));
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::MockTransport;

    fn test_frame(grams: u64) -> Vec<u8> {
        let mut payload = vec![0u8; 15];
        payload[8..15].copy_from_slice(&grams.to_be_bytes()[1..]);
        payload
    }

    fn spawn_session(
        transport: &Arc<MockTransport>,
    ) -> (Session, watch::Receiver<WeightReading>) {
        let (weight_tx, weight_rx) = watch::channel(WeightReading::default());
        let session = Session::spawn(
            Arc::clone(transport),
            DeviceIdentity::with_name("AA:BB:CC:DD:EE:FF", "Refill Scale 01"),
            WireProfile::default(),
            SessionConfig::default(),
            weight_tx,
            EventDispatcher::new(32),
        );
        (session, weight_rx)
    }

    #[tokio::test]
    async fn test_notify_path_publishes_decoded_weights() {
        let transport = Arc::new(MockTransport::builder().notify().build());
        let (session, mut weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| *s == SessionState::Active)
            .await
            .unwrap();

        transport.push_payload(test_frame(50));
        weight_rx.wait_for(|w| w.grams == 50).await.unwrap();

        transport.push_payload(test_frame(1250));
        weight_rx.wait_for(|w| w.grams == 1250).await.unwrap();

        assert_eq!(transport.open_count(), 1);
        assert_eq!(transport.subscribe_count(), 1);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_bad_frame_is_dropped_and_session_stays_active() {
        let transport = Arc::new(MockTransport::builder().notify().build());
        let (session, mut weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| *s == SessionState::Active)
            .await
            .unwrap();

        // Too short to carry a weight field; must be dropped, not zeroed.
        transport.push_payload(vec![0x01, 0x02, 0x03]);
        transport.push_payload(test_frame(75));

        weight_rx.wait_for(|w| w.grams == 75).await.unwrap();
        assert_eq!(session.state(), SessionState::Active);
        session.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fallback_reads_on_interval() {
        let transport = Arc::new(MockTransport::builder().read_only().build());
        transport.set_poll_frame(test_frame(320));
        let (session, mut weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| *s == SessionState::Active)
            .await
            .unwrap();

        weight_rx.wait_for(|w| w.grams == 320).await.unwrap();

        let reads_before = transport.read_count();
        tokio::time::sleep(Duration::from_millis(1600)).await;
        let reads_after = transport.read_count();
        // 500 ms cadence: roughly three more reads in 1.6 s of virtual time.
        assert!(reads_after >= reads_before + 2);
        assert_eq!(transport.subscribe_count(), 0);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_unsupported_characteristic_fails_terminally() {
        let transport = Arc::new(MockTransport::builder().no_capabilities().build());
        let (session, _weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| *s == SessionState::Failed(SessionFailure::Unsupported))
            .await
            .unwrap();
        assert!(!SessionFailure::Unsupported.is_recoverable());
    }

    #[tokio::test]
    async fn test_severed_link_fails_with_link_lost() {
        let transport = Arc::new(MockTransport::builder().notify().build());
        let (session, _weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| *s == SessionState::Active)
            .await
            .unwrap();

        transport.sever_link();
        state_rx
            .wait_for(|s| *s == SessionState::Failed(SessionFailure::LinkLost))
            .await
            .unwrap();
        assert!(SessionFailure::LinkLost.is_recoverable());
    }

    #[tokio::test]
    async fn test_shutdown_closes_link_and_returns_to_idle() {
        let transport = Arc::new(MockTransport::builder().notify().build());
        let (session, _weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| *s == SessionState::Active)
            .await
            .unwrap();

        session.shutdown().await;
        assert_eq!(*state_rx.borrow(), SessionState::Idle);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_reports_transport_failure() {
        let transport = Arc::new(MockTransport::builder().notify().fail_connects(1).build());
        let (session, _weight_rx) = spawn_session(&transport);

        let mut state_rx = session.watch_state();
        state_rx
            .wait_for(|s| matches!(s, SessionState::Failed(SessionFailure::Transport(_))))
            .await
            .unwrap();
        drop(session);
    }
}
