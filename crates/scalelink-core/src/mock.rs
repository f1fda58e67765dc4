//! Mock transport for testing without BLE hardware.
//!
//! Implements the transport seam in memory with scripted behavior:
//! capability selection (notify / read-only / neither), transient connect
//! failures, injectable payload frames, and a severable link that fires
//! the platform disconnect stream.
//!
//! Cloning a [`MockTransport`] shares the underlying state, so tests can
//! hand one clone to the client and keep another to drive the script.

use std::sync::Mutex as StdMutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::config::{SessionConfig, WireProfile};
use crate::error::{ConnectionFailureReason, Error, Result};
use crate::transport::{
    CharacteristicCaps, DisconnectStream, PayloadStream, ScaleLink, ScaleTransport,
};
use scalelink_types::DeviceIdentity;

fn channel_stream<T: Send + 'static>(rx: mpsc::UnboundedReceiver<T>) -> BoxStream<'static, T> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

struct MockShared {
    identity: DeviceIdentity,
    caps: CharacteristicCaps,
    pick_available: bool,
    connect_failures: AtomicU32,
    open_count: AtomicU32,
    subscribe_count: AtomicU32,
    read_count: AtomicU32,
    close_count: AtomicU32,
    pick_count: AtomicU32,
    poll_frame: StdMutex<Option<Vec<u8>>>,
    payload_subscribers: StdMutex<Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    disconnect_subscribers: StdMutex<Vec<mpsc::UnboundedSender<()>>>,
}

/// A scripted in-memory scale transport.
#[derive(Clone)]
pub struct MockTransport {
    shared: Arc<MockShared>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("identity", &self.shared.identity)
            .field("caps", &self.shared.caps)
            .field("open_count", &self.shared.open_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Start building a mock transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// The identity this mock advertises.
    pub fn identity(&self) -> DeviceIdentity {
        self.shared.identity.clone()
    }

    /// Push a notification payload to every subscribed link.
    pub fn push_payload(&self, payload: Vec<u8>) {
        let mut subscribers = self.shared.payload_subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
    }

    /// Set the frame returned by poll reads.
    pub fn set_poll_frame(&self, payload: Vec<u8>) {
        *self.shared.poll_frame.lock().unwrap() = Some(payload);
    }

    /// Report an unexpected platform disconnect and end all payload streams.
    pub fn sever_link(&self) {
        let mut disconnects = self.shared.disconnect_subscribers.lock().unwrap();
        disconnects.retain(|tx| tx.send(()).is_ok());
        // Dropping the senders ends the notification streams too.
        self.shared.payload_subscribers.lock().unwrap().clear();
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_next_connects(&self, count: u32) {
        self.shared.connect_failures.store(count, Ordering::SeqCst);
    }

    /// Number of transport connections opened.
    pub fn open_count(&self) -> u32 {
        self.shared.open_count.load(Ordering::SeqCst)
    }

    /// Number of notification subscriptions created.
    pub fn subscribe_count(&self) -> u32 {
        self.shared.subscribe_count.load(Ordering::SeqCst)
    }

    /// Number of poll reads issued.
    pub fn read_count(&self) -> u32 {
        self.shared.read_count.load(Ordering::SeqCst)
    }

    /// Number of links closed.
    pub fn close_count(&self) -> u32 {
        self.shared.close_count.load(Ordering::SeqCst)
    }

    /// Number of interactive discovery requests.
    pub fn pick_count(&self) -> u32 {
        self.shared.pick_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScaleTransport for MockTransport {
    type Link = MockLink;

    async fn pick_device(
        &self,
        _profile: &WireProfile,
        _timeout: Duration,
    ) -> Result<Option<DeviceIdentity>> {
        self.shared.pick_count.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .shared
            .pick_available
            .then(|| self.shared.identity.clone()))
    }

    async fn open(&self, identity: &DeviceIdentity, _config: &SessionConfig) -> Result<MockLink> {
        self.shared.open_count.fetch_add(1, Ordering::SeqCst);

        if self.shared.connect_failures.load(Ordering::SeqCst) > 0 {
            self.shared.connect_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(Error::connection_failed(
                Some(identity.id.clone()),
                ConnectionFailureReason::OutOfRange,
            ));
        }

        Ok(MockLink {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportBuilder {
    identity: DeviceIdentity,
    caps: CharacteristicCaps,
    pick_available: bool,
    connect_failures: u32,
}

impl Default for MockTransportBuilder {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::with_name(
                format!("MOCK-{:06X}", rand::random::<u32>() % 0xFF_FFFF),
                "Mock Scale",
            ),
            caps: CharacteristicCaps {
                notify: true,
                read: false,
            },
            pick_available: true,
            connect_failures: 0,
        }
    }
}

impl MockTransportBuilder {
    /// Set the advertised identity.
    #[must_use]
    pub fn device(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.identity = DeviceIdentity::with_name(id, name);
        self
    }

    /// Characteristic supports notifications (the default).
    #[must_use]
    pub fn notify(mut self) -> Self {
        self.caps = CharacteristicCaps {
            notify: true,
            read: false,
        };
        self
    }

    /// Characteristic supports on-demand reads only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.caps = CharacteristicCaps {
            notify: false,
            read: true,
        };
        self
    }

    /// Characteristic supports neither notify nor read.
    #[must_use]
    pub fn no_capabilities(mut self) -> Self {
        self.caps = CharacteristicCaps::default();
        self
    }

    /// Discovery finds nothing (the user declined / no scale in range).
    #[must_use]
    pub fn pick_nothing(mut self) -> Self {
        self.pick_available = false;
        self
    }

    /// Make the first `count` open attempts fail.
    #[must_use]
    pub fn fail_connects(mut self, count: u32) -> Self {
        self.connect_failures = count;
        self
    }

    /// Build the transport.
    pub fn build(self) -> MockTransport {
        MockTransport {
            shared: Arc::new(MockShared {
                identity: self.identity,
                caps: self.caps,
                pick_available: self.pick_available,
                connect_failures: AtomicU32::new(self.connect_failures),
                open_count: AtomicU32::new(0),
                subscribe_count: AtomicU32::new(0),
                read_count: AtomicU32::new(0),
                close_count: AtomicU32::new(0),
                pick_count: AtomicU32::new(0),
                poll_frame: StdMutex::new(None),
                payload_subscribers: StdMutex::new(Vec::new()),
                disconnect_subscribers: StdMutex::new(Vec::new()),
            }),
        }
    }
}

/// A link produced by [`MockTransport`].
pub struct MockLink {
    shared: Arc<MockShared>,
}

#[async_trait]
impl ScaleLink for MockLink {
    async fn resolve(&self, _profile: &WireProfile) -> Result<CharacteristicCaps> {
        Ok(self.shared.caps)
    }

    async fn subscribe(&self) -> Result<PayloadStream> {
        self.shared.subscribe_count.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.payload_subscribers.lock().unwrap().push(tx);
        Ok(channel_stream(rx))
    }

    async fn read_payload(&self) -> Result<Vec<u8>> {
        self.shared.read_count.fetch_add(1, Ordering::SeqCst);
        let frame = self.shared.poll_frame.lock().unwrap().clone();
        // No scripted frame means an empty platter.
        Ok(frame.unwrap_or_else(|| vec![0u8; scalelink_types::decode::MIN_PAYLOAD_LEN]))
    }

    async fn disconnects(&self) -> Result<DisconnectStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.disconnect_subscribers.lock().unwrap().push(tx);
        Ok(channel_stream(rx))
    }

    async fn close(&self) -> Result<()> {
        self.shared.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
