//! Core types for scope telemetry representation.
//!
//! The channel model is the shared vocabulary of the whole crate: the
//! producer registers [`Channel`]s, the wire protocol derives its frame
//! layout from their [`ChannelKind`]s, and the consumer's ring buffers are
//! typed per kind. [`ChannelValue`] is the tagged union that flows through
//! encode, decode, and buffer updates with an exhaustive match at each
//! dispatch point.

mod channel;

pub use channel::{Channel, ChannelHandle, ChannelKind, ChannelValue};
