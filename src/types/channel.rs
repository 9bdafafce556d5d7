//! Channel model: named, typed signal sources.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScopeError};

/// Supported channel kinds.
///
/// The wire enum indices (0 = Numeric, 1 = Boolean, 2 = Pose) and payload
/// widths are part of the protocol and must never change for an existing
/// header format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// One f64 value.
    Numeric,
    /// One byte, 1 = true.
    Boolean,
    /// 2D pose: x, y, theta as three consecutive f64.
    Pose,
}

impl ChannelKind {
    /// Payload width of this kind in a binary frame, in bytes.
    pub const fn width(&self) -> usize {
        match self {
            ChannelKind::Numeric => 8,
            ChannelKind::Boolean => 1,
            ChannelKind::Pose => 24,
        }
    }

    /// Wire enum index used in the text header.
    pub const fn index(&self) -> u8 {
        match self {
            ChannelKind::Numeric => 0,
            ChannelKind::Boolean => 1,
            ChannelKind::Pose => 2,
        }
    }

    /// Inverse of [`ChannelKind::index`]. Out-of-range indices are a header error.
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(ChannelKind::Numeric),
            1 => Some(ChannelKind::Boolean),
            2 => Some(ChannelKind::Pose),
            _ => None,
        }
    }
}

/// Runtime value of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ChannelValue {
    Numeric(f64),
    Boolean(bool),
    Pose { x: f64, y: f64, theta: f64 },
}

impl ChannelValue {
    /// Kind of this value.
    pub const fn kind(&self) -> ChannelKind {
        match self {
            ChannelValue::Numeric(_) => ChannelKind::Numeric,
            ChannelValue::Boolean(_) => ChannelKind::Boolean,
            ChannelValue::Pose { .. } => ChannelKind::Pose,
        }
    }

    /// Zero value for a kind, used for freshly mirrored channels.
    pub const fn zero(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Numeric => ChannelValue::Numeric(0.0),
            ChannelKind::Boolean => ChannelValue::Boolean(false),
            ChannelKind::Pose => ChannelValue::Pose { x: 0.0, y: 0.0, theta: 0.0 },
        }
    }
}

/// A named, typed signal source.
///
/// Names are unique within one protocol instance and channel order is
/// significant: it determines binary frame offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    name: String,
    value: ChannelValue,
}

impl Channel {
    /// Create a zero-valued channel of the given kind.
    pub fn new(name: impl Into<String>, kind: ChannelKind) -> Self {
        Self { name: name.into(), value: ChannelValue::zero(kind) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ChannelKind {
        self.value.kind()
    }

    /// Current value of the channel.
    pub fn value(&self) -> ChannelValue {
        self.value
    }

    /// Update the current value. The kind is immutable for the lifetime of
    /// the protocol, so a value of a different kind is rejected.
    pub fn update(&mut self, value: ChannelValue) -> Result<()> {
        if value.kind() != self.kind() {
            return Err(ScopeError::KindMismatch {
                channel: self.name.clone(),
                expected: self.kind(),
                got: value.kind(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Kind-unchecked setter for the decode path, where the value was built
    /// from this channel's own kind.
    pub(crate) fn set(&mut self, value: ChannelValue) {
        debug_assert_eq!(value.kind(), self.kind());
        self.value = value;
    }
}

/// Opaque handle to a registered channel, handed out by the producer
/// builder and accepted by the producer's update entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(pub(crate) usize);
