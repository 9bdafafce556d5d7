//! Producer side: channel registration, the control-plane server, and the
//! data-plane transmitter.
//!
//! Built through [`ScopeProducerBuilder`]; [`ScopeProducer::tick`] drives
//! the data plane at whatever rate the caller's loop runs.

pub mod control;
pub mod registry;
pub mod transmitter;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::error::{Result, ScopeError};
use crate::protocol::Protocol;
use crate::server::control::ControlPlane;
use crate::server::registry::ClientRegistry;
use crate::server::transmitter::Transmitter;
use crate::types::{Channel, ChannelHandle, ChannelKind, ChannelValue};

/// A monotonic source of relative time in seconds.
///
/// Timestamps only ever feed deltas and window spans on the consumer, so
/// the epoch is arbitrary; monotonicity is what matters.
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// [`TimeSource`] over [`Instant`], zeroed at construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Builder for a [`ScopeProducer`].
///
/// Channels are registered before start and fixed afterwards; the handle
/// returned at registration is the key for later value updates.
#[derive(Debug, Default)]
pub struct ScopeProducerBuilder {
    channels: Vec<Channel>,
    config: ServerConfig,
}

impl ScopeProducerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a channel of the given kind. Names must be unique.
    pub fn channel(&mut self, name: impl Into<String>, kind: ChannelKind) -> Result<ChannelHandle> {
        let name = name.into();
        if self.channels.iter().any(|c| c.name() == name) {
            return Err(ScopeError::DuplicateChannel { name });
        }
        self.channels.push(Channel::new(name, kind));
        Ok(ChannelHandle(self.channels.len() - 1))
    }

    pub fn numeric(&mut self, name: impl Into<String>) -> Result<ChannelHandle> {
        self.channel(name, ChannelKind::Numeric)
    }

    pub fn boolean(&mut self, name: impl Into<String>) -> Result<ChannelHandle> {
        self.channel(name, ChannelKind::Boolean)
    }

    pub fn pose(&mut self, name: impl Into<String>) -> Result<ChannelHandle> {
        self.channel(name, ChannelKind::Pose)
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Bind the sockets, start the control plane, and return the producer.
    pub async fn start(self) -> Result<ScopeProducer> {
        self.config.validate()?;
        let protocol = Protocol::new(self.channels)?;

        let bind = (self.config.bind_addr.as_str(), self.config.control_port);
        let listener = TcpListener::bind(bind).await.map_err(|e| {
            ScopeError::connection_failed_with_source(
                format!("binding control listener on {}:{}", bind.0, bind.1),
                Box::new(e),
            )
        })?;
        let control_addr = listener.local_addr().map_err(|e| {
            ScopeError::connection_failed_with_source("resolving control address", Box::new(e))
        })?;

        let registry = Arc::new(ClientRegistry::new());
        let transmitter = Transmitter::bind(Arc::clone(&registry)).await?;

        let header_line = protocol.header_line();
        let ctx = Arc::new(ControlPlane {
            header: header_line.clone().into_bytes().into(),
            registry: Arc::clone(&registry),
            read_timeout: self.config.read_timeout,
            data_port: self.config.data_port,
        });

        let cancel = CancellationToken::new();
        tokio::spawn(control::accept_loop(listener, ctx, cancel.clone()));

        info!(
            %control_addr,
            data_port = self.config.data_port,
            channels = protocol.channels().len(),
            frame_size = protocol.frame_size(),
            "scope producer started"
        );

        let scratch = vec![0u8; protocol.frame_size()];
        Ok(ScopeProducer {
            protocol,
            scratch,
            transmitter,
            registry,
            control_addr,
            header_line,
            cancel,
        })
    }
}

/// A running telemetry producer.
///
/// The control plane runs in the background; the caller owns the sampling
/// loop and calls [`ScopeProducer::tick`] to publish the current channel
/// state. Dropping the producer stops the control plane and every session.
pub struct ScopeProducer {
    protocol: Protocol,
    scratch: Vec<u8>,
    transmitter: Transmitter,
    registry: Arc<ClientRegistry>,
    control_addr: SocketAddr,
    header_line: String,
    cancel: CancellationToken,
}

impl ScopeProducer {
    /// Set a channel's current value. Kind-checked against registration.
    pub fn update(&mut self, handle: ChannelHandle, value: ChannelValue) -> Result<()> {
        self.protocol
            .channel_mut(handle.0)
            .ok_or(ScopeError::UnknownChannel { index: handle.0 })?
            .update(value)
    }

    pub fn update_numeric(&mut self, handle: ChannelHandle, value: f64) -> Result<()> {
        self.update(handle, ChannelValue::Numeric(value))
    }

    pub fn update_boolean(&mut self, handle: ChannelHandle, value: bool) -> Result<()> {
        self.update(handle, ChannelValue::Boolean(value))
    }

    pub fn update_pose(&mut self, handle: ChannelHandle, x: f64, y: f64, theta: f64) -> Result<()> {
        self.update(handle, ChannelValue::Pose { x, y, theta })
    }

    /// Publish the current channel state stamped with `now`.
    ///
    /// Encodes the frame once, then sends it to every registered consumer.
    /// Send failures are logged per peer and never surfaced here.
    pub async fn tick(&mut self, now: f64) -> Result<()> {
        self.protocol.populate_buffer(now, &mut self.scratch)?;
        self.transmitter.broadcast(&self.scratch).await;
        Ok(())
    }

    /// Publish using a [`TimeSource`] for the timestamp.
    pub async fn tick_with(&mut self, clock: &impl TimeSource) -> Result<()> {
        self.tick(clock.now()).await
    }

    /// Number of currently registered consumers.
    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Actual control listener address, useful with an ephemeral port.
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// The header line consumers receive, newline included.
    pub fn header_line(&self) -> &str {
        &self.header_line
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }
}

impl Drop for ScopeProducer {
    fn drop(&mut self) {
        debug!("dropping scope producer");
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_rejects_duplicate_names() {
        let mut builder = ScopeProducerBuilder::new();
        builder.numeric("rpm").unwrap();
        let err = builder.boolean("rpm").unwrap_err();
        assert!(matches!(err, ScopeError::DuplicateChannel { .. }));
    }

    #[test]
    fn handles_index_in_registration_order() {
        let mut builder = ScopeProducerBuilder::new();
        let a = builder.numeric("a").unwrap();
        let b = builder.pose("b").unwrap();
        assert_eq!(a, ChannelHandle(0));
        assert_eq!(b, ChannelHandle(1));
    }

    #[test]
    fn monotonic_clock_is_nondecreasing() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a >= 0.0);
    }

    #[tokio::test]
    async fn producer_rejects_unknown_handle() {
        let mut builder = ScopeProducerBuilder::new();
        builder.numeric("rpm").unwrap();
        let config = ServerConfig { control_port: 0, ..ServerConfig::default() };
        let mut producer = builder.config(config).start().await.unwrap();

        producer.update_numeric(ChannelHandle(0), 1.0).unwrap();
        let err = producer.update_numeric(ChannelHandle(9), 1.0).unwrap_err();
        assert!(matches!(err, ScopeError::UnknownChannel { index: 9 }));
    }

    #[tokio::test]
    async fn tick_without_clients_is_ok() {
        let config = ServerConfig { control_port: 0, ..ServerConfig::default() };
        let mut builder = ScopeProducerBuilder::new();
        let rpm = builder.numeric("rpm").unwrap();
        let mut producer = builder.config(config).start().await.unwrap();

        producer.update_numeric(rpm, 4200.0).unwrap();
        producer.tick(0.5).await.unwrap();
        assert_eq!(producer.client_count(), 0);
        assert_eq!(producer.header_line(), "rpm:0\n");
    }
}
