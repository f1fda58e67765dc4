//! Scale client façade.
//!
//! The only surface the rest of the application depends on: `connect`,
//! `disconnect`, the live weight value, a status projection, and the event
//! bus. The façade owns at most one GATT session and one reconnection
//! supervisor at a time, and serializes every transition through one
//! internal lock so no two operations race to open a link to the same
//! scale.
//!
//! Public operations never panic across this boundary; every call resolves
//! to a status update.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, WireProfile};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, ScaleEvent};
use crate::registry::DeviceRegistry;
use crate::session::{Session, SessionFailure, SessionState};
use crate::supervisor::{RetryPolicy, Supervisor, SupervisorHooks};
use crate::transport::ScaleTransport;
use scalelink_types::{DeviceIdentity, WeightReading};

/// Status projection surfaced to the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleStatus {
    /// A session is active and streaming.
    pub connected: bool,
    /// A connection attempt (or retry) is in flight.
    pub connecting: bool,
    /// Display name of the targeted scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    /// User-visible error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Configuration for a [`ScaleClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// GATT addresses for the deployed hardware revision.
    pub profile: WireProfile,
    /// Session timeouts and cadences.
    pub session: SessionConfig,
    /// Reconnection policy.
    pub retry: RetryPolicy,
    /// Event bus capacity.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            profile: WireProfile::default(),
            session: SessionConfig::default(),
            retry: RetryPolicy::default(),
            event_capacity: 100,
        }
    }
}

impl ClientConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the wire profile.
    #[must_use]
    pub fn profile(mut self, profile: WireProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Set the session config.
    #[must_use]
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.session.validate()?;
        self.retry.validate()?;
        if self.event_capacity == 0 {
            return Err(crate::error::Error::invalid_config(
                "event_capacity must be > 0",
            ));
        }
        Ok(())
    }
}

/// Client façade owning the scale connection lifecycle.
///
/// Cloning is cheap and shares the underlying connection; one physical
/// scale per client instance.
pub struct ScaleClient<T: ScaleTransport> {
    inner: Arc<Inner<T>>,
}

impl<T: ScaleTransport> Clone for ScaleClient<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ScaleTransport> std::fmt::Debug for ScaleClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaleClient")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl<T: ScaleTransport> ScaleClient<T> {
    /// Create a client with default configuration and the per-user registry.
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ClientConfig::default(), DeviceRegistry::open_default())
    }

    /// Create a client with explicit configuration and registry.
    pub fn with_config(transport: T, config: ClientConfig, registry: DeviceRegistry) -> Self {
        let (weight_tx, _) = watch::channel(WeightReading::default());
        let (status_tx, _) = watch::channel(ScaleStatus::default());
        let events = EventDispatcher::new(config.event_capacity);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<T>>| Inner {
            transport: Arc::new(transport),
            registry,
            config,
            events,
            weight_tx,
            status_tx,
            active: Mutex::new(ActiveParts::default()),
            weak_self: weak.clone(),
        });

        Self { inner }
    }

    /// Connect to a scale.
    ///
    /// With `explicit_pick`, runs discovery against the wire profile's
    /// service filter and remembers the selected device; a declined
    /// selection returns quietly to idle. Without it, targets the
    /// remembered device, or does nothing when none is remembered.
    ///
    /// Idempotent while a session is alive: a second call returns the
    /// current status instead of opening a second physical link.
    pub async fn connect(&self, explicit_pick: bool) -> ScaleStatus {
        self.inner.connect(explicit_pick).await;
        self.inner.status()
    }

    /// Stop the supervisor, close the session, and optionally forget the
    /// remembered device.
    pub async fn disconnect(&self, clear_remembered: bool) -> ScaleStatus {
        self.inner.disconnect(clear_remembered).await;
        self.inner.status()
    }

    /// Current status snapshot.
    pub fn status(&self) -> ScaleStatus {
        self.inner.status()
    }

    /// Watch channel following status changes.
    pub fn status_watch(&self) -> watch::Receiver<ScaleStatus> {
        self.inner.status_tx.subscribe()
    }

    /// The most recent weight reading.
    pub fn weight(&self) -> WeightReading {
        *self.inner.weight_tx.borrow()
    }

    /// Watch channel following the live weight value.
    pub fn weight_watch(&self) -> watch::Receiver<WeightReading> {
        self.inner.weight_tx.subscribe()
    }

    /// Subscribe to the event bus.
    pub fn events(&self) -> EventReceiver {
        self.inner.events.subscribe()
    }

    /// The remembered device, if any.
    pub fn remembered_device(&self) -> Option<DeviceIdentity> {
        self.inner.registry.load()
    }
}

/// Mutable connection state; every transition goes through this lock.
#[derive(Default)]
struct ActiveParts {
    session: Option<Session>,
    supervisor: Option<Supervisor>,
    /// Incremented on every session start and deliberate teardown so
    /// monitors of superseded sessions can tell they are stale.
    epoch: u64,
    /// Attempt number of the supervisor's latest tick.
    last_attempt: u32,
}

struct Inner<T: ScaleTransport> {
    transport: Arc<T>,
    registry: DeviceRegistry,
    config: ClientConfig,
    events: EventDispatcher,
    weight_tx: watch::Sender<WeightReading>,
    status_tx: watch::Sender<ScaleStatus>,
    active: Mutex<ActiveParts>,
    weak_self: Weak<Inner<T>>,
}

impl<T: ScaleTransport> Inner<T> {
    fn status(&self) -> ScaleStatus {
        self.status_tx.borrow().clone()
    }

    fn update_status(&self, f: impl FnOnce(&mut ScaleStatus)) {
        self.status_tx.send_modify(f);
    }

    async fn connect(&self, explicit_pick: bool) {
        let mut active = self.active.lock().await;

        if let Some(session) = &active.session
            && session.is_alive()
        {
            debug!("connect() while a session is alive; returning current status");
            return;
        }

        self.update_status(|s| {
            s.connecting = true;
            s.error = None;
        });

        let device = if explicit_pick {
            match self
                .transport
                .pick_device(&self.config.profile, self.config.session.pick_timeout)
                .await
            {
                Ok(Some(device)) => {
                    info!("Scale selected: {}", device);
                    self.registry.save(&device);
                    self.events.send(ScaleEvent::Discovered {
                        device: device.clone(),
                    });
                    device
                }
                Ok(None) => {
                    // A declined selection is not an error.
                    info!("Scale selection cancelled");
                    self.update_status(|s| s.connecting = false);
                    return;
                }
                Err(e) => {
                    warn!("Discovery failed: {}", e);
                    self.events.send(ScaleEvent::Error {
                        message: e.to_string(),
                    });
                    self.update_status(|s| {
                        s.connecting = false;
                        s.error = Some(e.to_string());
                    });
                    return;
                }
            }
        } else {
            match self.registry.load() {
                Some(device) => device,
                None => {
                    debug!("No remembered scale; silent connect is a no-op");
                    self.update_status(|s| s.connecting = false);
                    return;
                }
            }
        };

        self.start_session_locked(&mut active, device).await;
    }

    async fn disconnect(&self, clear_remembered: bool) {
        let mut active = self.active.lock().await;

        // Supervisor first, so a tick cannot race the session teardown and
        // reopen a link we are about to close.
        if let Some(supervisor) = active.supervisor.take() {
            supervisor.cancel();
        }

        if let Some(session) = active.session.take() {
            let device = session.device().clone();
            info!("Disconnecting from {}", device);
            session.shutdown().await;
            self.events.send(ScaleEvent::Disconnected {
                device,
                reason: DisconnectReason::UserRequested,
            });
        }
        active.epoch += 1;
        active.last_attempt = 0;

        if clear_remembered {
            self.registry.clear();
        }

        self.weight_tx.send_replace(WeightReading::default());
        self.update_status(|s| *s = ScaleStatus::default());
    }

    /// Replace any previous session with a fresh one against `device`.
    /// Caller holds the `active` lock.
    async fn start_session_locked(&self, active: &mut ActiveParts, device: DeviceIdentity) {
        if let Some(old) = active.session.take() {
            // Also the abandon path for a hung attempt: closing the old
            // link cancels its outstanding radio operations.
            old.shutdown().await;
        }
        active.epoch += 1;
        let epoch = active.epoch;

        self.update_status(|s| {
            s.connecting = true;
            s.connected = false;
            s.device_name = Some(device.label().to_string());
        });

        let session = Session::spawn(
            Arc::clone(&self.transport),
            device.clone(),
            self.config.profile,
            self.config.session.clone(),
            self.weight_tx.clone(),
            self.events.clone(),
        );
        self.spawn_monitor(session.watch_state(), device, epoch);
        active.session = Some(session);
    }

    /// Watch one session's state transitions and react to them.
    fn spawn_monitor(
        &self,
        mut state_rx: watch::Receiver<SessionState>,
        device: DeviceIdentity,
        epoch: u64,
    ) {
        let weak = self.weak_self.clone();
        tokio::spawn(async move {
            loop {
                if state_rx.changed().await.is_err() {
                    break;
                }
                let state = state_rx.borrow_and_update().clone();
                let Some(inner) = weak.upgrade() else { break };
                match state {
                    SessionState::Active => inner.on_session_active(&device, epoch).await,
                    SessionState::Failed(failure) => {
                        inner.on_session_failed(&device, failure, epoch).await;
                        break;
                    }
                    SessionState::Idle => break,
                    SessionState::Connecting
                    | SessionState::Subscribing
                    | SessionState::Closing => {}
                }
            }
        });
    }

    async fn on_session_active(&self, device: &DeviceIdentity, epoch: u64) {
        let mut active = self.active.lock().await;
        if active.epoch != epoch {
            return;
        }

        if let Some(supervisor) = active.supervisor.take() {
            supervisor.cancel();
            self.events.send(ScaleEvent::ReconnectSucceeded {
                device: device.clone(),
                attempts: active.last_attempt,
            });
        }
        active.last_attempt = 0;

        self.update_status(|s| {
            s.connected = true;
            s.connecting = false;
            s.device_name = Some(device.label().to_string());
            s.error = None;
        });
    }

    async fn on_session_failed(&self, device: &DeviceIdentity, failure: SessionFailure, epoch: u64) {
        let mut active = self.active.lock().await;
        if active.epoch != epoch {
            return;
        }

        active.session = None;

        let message = match &failure {
            SessionFailure::LinkLost => "scale connection lost".to_string(),
            SessionFailure::Unsupported => {
                "scale supports neither notifications nor reads".to_string()
            }
            SessionFailure::Transport(message) => message.clone(),
        };
        self.update_status(|s| {
            s.connected = false;
            s.connecting = false;
            s.error = Some(message);
        });

        if failure.is_recoverable() && self.registry.load().is_some() {
            self.ensure_supervisor_locked(&mut active, device.clone());
        } else if let Some(supervisor) = active.supervisor.take() {
            supervisor.cancel();
        }
    }

    /// Start the reconnect supervisor unless one is already running.
    fn ensure_supervisor_locked(&self, active: &mut ActiveParts, device: DeviceIdentity) {
        if active.supervisor.as_ref().is_some_and(|s| s.is_running()) {
            debug!("Reconnect supervisor already running");
            return;
        }
        info!("Starting reconnect supervisor for {}", device);
        active.supervisor = Some(Supervisor::spawn(
            self.weak_self.clone(),
            device,
            self.config.retry.clone(),
        ));
    }
}

#[async_trait]
impl<T: ScaleTransport> SupervisorHooks for Inner<T> {
    async fn session_is_active(&self) -> bool {
        let active = self.active.lock().await;
        active.session.as_ref().is_some_and(|s| s.is_active())
    }

    async fn retry_tick(&self, device: &DeviceIdentity, attempt: u32, max: u32) {
        let mut active = self.active.lock().await;

        // The client may have been deliberately disconnected while this
        // tick was in flight.
        if !active.supervisor.as_ref().is_some_and(|s| s.is_running()) {
            return;
        }
        if active.session.as_ref().is_some_and(|s| s.is_active()) {
            return;
        }

        active.last_attempt = attempt;
        self.events.send(ScaleEvent::ReconnectStarted {
            device: device.clone(),
            attempt,
            max,
        });
        self.update_status(|s| {
            s.connecting = true;
            s.error = Some(format!("retrying ({attempt}/{max})"));
        });

        self.start_session_locked(&mut active, device.clone()).await;
    }

    async fn retries_exhausted(&self, device: &DeviceIdentity, attempts: u32) {
        let mut active = self.active.lock().await;
        active.supervisor = None;

        self.events.send(ScaleEvent::RetriesExhausted {
            device: device.clone(),
            attempts,
        });
        self.update_status(|s| {
            s.connecting = false;
            s.connected = false;
            s.error = Some(format!(
                "scale unreachable after {attempts} attempts; reconnect manually"
            ));
        });
    }
}
