//! Consumer side: connection management, ingestion, and buffered history.
//!
//! [`ScopeClient`] owns the sockets and background tasks; [`ScopeEngine`]
//! decodes frames into the shared [`ScopeBuffers`], which renderers read
//! under the draw lock. See [`engine`] for the locking contract.

pub mod connection;
pub mod engine;
pub mod ring;

pub use connection::ScopeClient;
pub use engine::{
    BufferSet, ChannelInfo, DEFAULT_CAPACITY, DisplaySettings, ScopeBuffers, ScopeEngine, Window,
};
pub use ring::{ChannelRing, TIME_EPSILON, TimestampHistory};
