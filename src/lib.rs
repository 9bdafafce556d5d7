//! Real-time telemetry streaming for oscilloscope-style visualization.
//!
//! Scopewire moves typed signal samples (numeric, boolean, 2D pose) from a
//! producer process to consumer processes with low overhead and best-effort
//! delivery: the channel layout is negotiated once over a TCP control
//! connection, then fixed-size binary frames flow over UDP. Consumers
//! buffer history in lock-light ring buffers sized for high-rate ingestion
//! while a renderer reads time windows concurrently.
//!
//! # Architecture
//!
//! - **Control plane** (TCP): header negotiation, heartbeats, liveness.
//!   One session per consumer host; reconnects supersede.
//! - **Data plane** (UDP): one frame per tick to every live consumer.
//!   Lost or reordered frames are simply absent from the history.
//! - **Ingestion**: frames decode into per-channel ring buffers guarded by
//!   the draw-lock discipline (see [`client::engine`]).
//!
//! # Example (producer)
//!
//! ```rust,no_run
//! use scopewire::{MonotonicClock, Scope, TimeSource};
//!
//! #[tokio::main]
//! async fn main() -> scopewire::Result<()> {
//!     let mut builder = Scope::builder();
//!     let rpm = builder.numeric("rpm")?;
//!     let mut producer = builder.start().await?;
//!
//!     let clock = MonotonicClock::new();
//!     loop {
//!         producer.update_numeric(rpm, 4200.0)?;
//!         producer.tick(clock.now()).await?;
//!         tokio::time::sleep(std::time::Duration::from_millis(10)).await;
//!     }
//! }
//! ```
//!
//! # Example (consumer)
//!
//! ```rust,no_run
//! use scopewire::{ClientConfig, Scope};
//!
//! #[tokio::main]
//! async fn main() -> scopewire::Result<()> {
//!     let client = Scope::connect(ClientConfig::default()).await?;
//!     let buffers = client.buffers();
//!
//!     loop {
//!         if let Some(window) = buffers.window() {
//!             let set = buffers.read();
//!             for (info, ring) in set.channels().iter().zip(set.rings()) {
//!                 let newest = ring.value_at(window.last_index);
//!                 println!("{}: {:?}", info.name, newest);
//!             }
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(16)).await;
//!     }
//! }
//! ```

// Core types and error handling
mod config;
mod error;
#[cfg_attr(any(test, feature = "benchmark"), path = "test_utils.rs")]
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Wire protocol and the two endpoints
pub mod client;
pub mod protocol;
pub mod server;

// Core exports
pub use config::{ClientConfig, DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, ServerConfig};
pub use error::{Result, ScopeError};
pub use types::{Channel, ChannelHandle, ChannelKind, ChannelValue};

// Endpoint exports
pub use client::{
    BufferSet, ChannelInfo, DisplaySettings, ScopeBuffers, ScopeClient, Window,
};
pub use protocol::Protocol;
pub use server::{MonotonicClock, ScopeProducer, ScopeProducerBuilder, TimeSource};

/// Unified entry point for scope endpoints.
///
/// A process is usually one or the other: [`Scope::builder`] for the
/// producer that owns the signals, [`Scope::connect`] for a consumer that
/// mirrors them.
pub struct Scope;

impl Scope {
    /// Start building a producer.
    pub fn builder() -> ScopeProducerBuilder {
        ScopeProducerBuilder::new()
    }

    /// Connect to a producer as a consumer.
    ///
    /// # Errors
    ///
    /// Returns an error if the control connection cannot be established,
    /// the header does not arrive within the configured timeout, the
    /// header is malformed, or the local data socket cannot be bound.
    pub async fn connect(config: ClientConfig) -> Result<ScopeClient> {
        ScopeClient::connect(config).await
    }
}
