//! Wire protocol: header negotiation and the binary frame codec.
//!
//! A [`Protocol`] is an ordered channel list plus derived layout metadata.
//! Both ends agree on the layout once, at connection time, through the text
//! header; after that only fixed-size binary frames are exchanged.
//!
//! # Header line
//!
//! One segment per channel, `name:kindIndex`, segments joined by `;` and the
//! whole line newline-terminated on the socket:
//!
//! ```text
//! rpm:0;enabled:1;pose:2
//! ```
//!
//! # Frame layout
//!
//! Offset 0 holds the f64 timestamp in seconds; each channel's payload
//! follows at its precomputed offset, in declared order:
//!
//! | kind    | width | encoding                     |
//! |---------|-------|------------------------------|
//! | Numeric | 8     | f64                          |
//! | Boolean | 1     | one byte, 1 = true           |
//! | Pose    | 24    | x, y, theta as three f64     |
//!
//! All multi-byte values are little-endian.

use crate::error::{Result, ScopeError};
use crate::types::{Channel, ChannelKind, ChannelValue};

/// Size of the f64 timestamp at the start of every frame.
pub const TIMESTAMP_SIZE: usize = 8;

/// Command bytes a client sends on the control socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Keeps the session's read timeout from firing. No response.
    Heartbeat,
    /// Asks the server to write the header line back.
    HeaderRequest,
    /// Any unrecognized byte; closes the session.
    Disconnect,
}

impl Command {
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Command::Heartbeat,
            1 => Command::HeaderRequest,
            _ => Command::Disconnect,
        }
    }

    pub const fn as_byte(&self) -> u8 {
        match self {
            Command::Heartbeat => 0,
            Command::HeaderRequest => 1,
            Command::Disconnect => 0xff,
        }
    }
}

/// An ordered channel list plus its derived binary layout.
///
/// Immutable after construction except for the current value inside each
/// channel, which `populate_channels` overwrites on decode.
#[derive(Debug, Clone, PartialEq)]
pub struct Protocol {
    channels: Vec<Channel>,
    offsets: Vec<usize>,
    frame_size: usize,
}

impl Protocol {
    /// Build a protocol from an ordered channel list.
    ///
    /// Fails with [`ScopeError::DuplicateChannel`] if two channels share a
    /// name. Offsets are computed once here: `offsets[i]` is the timestamp
    /// size plus the widths of every channel before `i`.
    pub fn new(channels: Vec<Channel>) -> Result<Self> {
        for (i, channel) in channels.iter().enumerate() {
            if channels[..i].iter().any(|c| c.name() == channel.name()) {
                return Err(ScopeError::DuplicateChannel { name: channel.name().to_string() });
            }
        }

        let mut offsets = Vec::with_capacity(channels.len());
        let mut current = TIMESTAMP_SIZE;
        for channel in &channels {
            offsets.push(current);
            current += channel.kind().width();
        }

        Ok(Self { channels, offsets, frame_size: current })
    }

    /// A protocol with no channels. Frames consist of the timestamp only.
    pub fn empty() -> Self {
        Self { channels: Vec::new(), offsets: Vec::new(), frame_size: TIMESTAMP_SIZE }
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub(crate) fn channel_mut(&mut self, index: usize) -> Option<&mut Channel> {
        self.channels.get_mut(index)
    }

    /// Byte offset of each channel's payload within a frame.
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Total frame size in bytes: timestamp plus every channel payload.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Serialize the channel layout to a header string (no terminator).
    pub fn serialize_header(&self) -> String {
        self.channels
            .iter()
            .map(|c| format!("{}:{}", c.name(), c.kind().index()))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Header string with the trailing newline, ready for the socket.
    pub fn header_line(&self) -> String {
        let mut line = self.serialize_header();
        line.push('\n');
        line
    }

    /// Reconstruct a protocol from a received header string.
    ///
    /// The mirrored channels are zero-valued; order is preserved. A segment
    /// that does not split into exactly two fields, an empty name, or an
    /// out-of-range kind index fails with [`ScopeError::MalformedHeader`].
    pub fn deserialize_header(header: &str) -> Result<Self> {
        let header = header.trim_end_matches(['\r', '\n']);
        if header.is_empty() {
            return Ok(Self::empty());
        }

        let mut channels = Vec::new();
        for segment in header.split(';') {
            let fields: Vec<&str> = segment.split(':').collect();
            let [name, kind_index] = fields[..] else {
                return Err(ScopeError::malformed_header(
                    segment,
                    "expected exactly two ':'-separated fields",
                ));
            };
            if name.is_empty() {
                return Err(ScopeError::malformed_header(segment, "empty channel name"));
            }
            let index: u8 = kind_index.parse().map_err(|_| {
                ScopeError::malformed_header(segment, format!("invalid kind index '{kind_index}'"))
            })?;
            let kind = ChannelKind::from_index(index).ok_or_else(|| {
                ScopeError::malformed_header(segment, format!("kind index {index} out of range"))
            })?;
            channels.push(Channel::new(name, kind));
        }
        Self::new(channels)
    }

    /// Encode the current channel values into `buf`.
    ///
    /// Writes the timestamp at offset 0 and each channel at its precomputed
    /// offset. `buf` must hold at least [`Protocol::frame_size`] bytes.
    pub fn populate_buffer(&self, timestamp: f64, buf: &mut [u8]) -> Result<()> {
        if buf.len() < self.frame_size {
            return Err(ScopeError::BufferTooSmall { needed: self.frame_size, got: buf.len() });
        }

        put_f64(buf, 0, timestamp);
        for (channel, &offset) in self.channels.iter().zip(&self.offsets) {
            match channel.value() {
                ChannelValue::Numeric(v) => put_f64(buf, offset, v),
                ChannelValue::Boolean(b) => buf[offset] = b as u8,
                ChannelValue::Pose { x, y, theta } => {
                    put_f64(buf, offset, x);
                    put_f64(buf, offset + 8, y);
                    put_f64(buf, offset + 16, theta);
                }
            }
        }
        Ok(())
    }

    /// Decode a frame, updating every channel's current value.
    ///
    /// Exact inverse of [`Protocol::populate_buffer`] for any representable
    /// value; NaN and infinities pass through untouched. Only short buffers
    /// are rejected.
    ///
    /// Returns the frame's timestamp.
    pub fn populate_channels(&mut self, buf: &[u8]) -> Result<f64> {
        if buf.len() < self.frame_size {
            return Err(ScopeError::BufferTooSmall { needed: self.frame_size, got: buf.len() });
        }

        let timestamp = get_f64(buf, 0);
        for (channel, &offset) in self.channels.iter_mut().zip(&self.offsets) {
            let value = match channel.kind() {
                ChannelKind::Numeric => ChannelValue::Numeric(get_f64(buf, offset)),
                ChannelKind::Boolean => ChannelValue::Boolean(buf[offset] == 1),
                ChannelKind::Pose => ChannelValue::Pose {
                    x: get_f64(buf, offset),
                    y: get_f64(buf, offset + 8),
                    theta: get_f64(buf, offset + 16),
                },
            };
            channel.set(value);
        }
        Ok(timestamp)
    }
}

fn put_f64(buf: &mut [u8], offset: usize, value: f64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn get_f64(buf: &[u8], offset: usize) -> f64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    f64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn demo_channels() -> Vec<Channel> {
        vec![
            Channel::new("rpm", ChannelKind::Numeric),
            Channel::new("enabled", ChannelKind::Boolean),
            Channel::new("pose", ChannelKind::Pose),
        ]
    }

    #[test]
    fn offsets_and_frame_size() {
        let protocol = Protocol::new(demo_channels()).unwrap();
        // timestamp 8, numeric 8, boolean 1, pose 24
        assert_eq!(protocol.offsets(), &[8, 16, 17]);
        assert_eq!(protocol.frame_size(), 8 + 8 + 1 + 24);
    }

    #[test]
    fn empty_protocol_is_timestamp_only() {
        let protocol = Protocol::empty();
        assert_eq!(protocol.frame_size(), TIMESTAMP_SIZE);
        assert!(protocol.channels().is_empty());
    }

    #[test]
    fn duplicate_names_rejected() {
        let channels = vec![
            Channel::new("rpm", ChannelKind::Numeric),
            Channel::new("rpm", ChannelKind::Boolean),
        ];
        let err = Protocol::new(channels).unwrap_err();
        assert!(matches!(err, ScopeError::DuplicateChannel { .. }));
    }

    #[test]
    fn header_roundtrip() {
        let protocol = Protocol::new(demo_channels()).unwrap();
        assert_eq!(protocol.serialize_header(), "rpm:0;enabled:1;pose:2");

        let mirrored = Protocol::deserialize_header(&protocol.header_line()).unwrap();
        assert_eq!(mirrored.channels().len(), 3);
        for (a, b) in protocol.channels().iter().zip(mirrored.channels()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.kind(), b.kind());
        }
        assert_eq!(mirrored.offsets(), protocol.offsets());
    }

    #[test]
    fn malformed_headers_rejected() {
        for (header, why) in [
            ("rpm", "missing kind"),
            ("rpm:0:extra", "three fields"),
            (":0", "empty name"),
            ("rpm:x", "non-numeric kind"),
            ("rpm:3", "kind out of range"),
            ("rpm:0;rpm:0", "duplicate name"),
        ] {
            let result = Protocol::deserialize_header(header);
            assert!(result.is_err(), "header '{header}' should fail ({why})");
        }
    }

    #[test]
    fn encode_rejects_short_buffer() {
        let protocol = Protocol::new(demo_channels()).unwrap();
        let mut buf = vec![0u8; protocol.frame_size() - 1];
        let err = protocol.populate_buffer(0.0, &mut buf).unwrap_err();
        assert!(matches!(err, ScopeError::BufferTooSmall { .. }));
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let mut protocol = Protocol::new(demo_channels()).unwrap();
        let buf = vec![0u8; protocol.frame_size() - 1];
        let err = protocol.populate_channels(&buf).unwrap_err();
        assert!(matches!(err, ScopeError::BufferTooSmall { .. }));
    }

    #[test]
    fn frame_roundtrip_exact() {
        let mut protocol = Protocol::new(demo_channels()).unwrap();
        protocol.channel_mut(0).unwrap().update(ChannelValue::Numeric(1234.5)).unwrap();
        protocol.channel_mut(1).unwrap().update(ChannelValue::Boolean(true)).unwrap();
        protocol
            .channel_mut(2)
            .unwrap()
            .update(ChannelValue::Pose { x: -3.5, y: 12.25, theta: 0.125 })
            .unwrap();

        let mut buf = vec![0u8; protocol.frame_size()];
        protocol.populate_buffer(42.5, &mut buf).unwrap();

        // Decode into a freshly mirrored protocol, as a consumer would
        let mut mirrored = Protocol::deserialize_header(&protocol.serialize_header()).unwrap();
        let timestamp = mirrored.populate_channels(&buf).unwrap();

        assert_eq!(timestamp, 42.5);
        assert_eq!(mirrored.channels()[0].value(), ChannelValue::Numeric(1234.5));
        assert_eq!(mirrored.channels()[1].value(), ChannelValue::Boolean(true));
        assert_eq!(
            mirrored.channels()[2].value(),
            ChannelValue::Pose { x: -3.5, y: 12.25, theta: 0.125 }
        );
    }

    #[test]
    fn decode_accepts_nan_and_infinity() {
        let mut protocol =
            Protocol::new(vec![Channel::new("n", ChannelKind::Numeric)]).unwrap();
        let mut buf = vec![0u8; protocol.frame_size()];
        buf[8..16].copy_from_slice(&f64::NAN.to_le_bytes());
        buf[0..8].copy_from_slice(&f64::INFINITY.to_le_bytes());

        let timestamp = protocol.populate_channels(&buf).unwrap();
        assert!(timestamp.is_infinite());
        let ChannelValue::Numeric(v) = protocol.channels()[0].value() else {
            panic!("expected numeric value");
        };
        assert!(v.is_nan());
    }

    #[test]
    fn command_byte_mapping() {
        assert_eq!(Command::from_byte(0), Command::Heartbeat);
        assert_eq!(Command::from_byte(1), Command::HeaderRequest);
        assert_eq!(Command::from_byte(2), Command::Disconnect);
        assert_eq!(Command::from_byte(255), Command::Disconnect);
        assert_eq!(Command::from_byte(Command::Heartbeat.as_byte()), Command::Heartbeat);
        assert_eq!(Command::from_byte(Command::HeaderRequest.as_byte()), Command::HeaderRequest);
    }

    prop_compose! {
        fn arb_kind()(index in 0u8..3) -> ChannelKind {
            ChannelKind::from_index(index).unwrap()
        }
    }

    fn arb_protocol() -> impl Strategy<Value = Protocol> {
        prop::collection::vec(("[a-z][a-z0-9_]{0,10}", arb_kind()), 0..8).prop_map(|entries| {
            let mut channels = Vec::new();
            for (i, (name, kind)) in entries.into_iter().enumerate() {
                // Index suffix keeps generated names unique
                channels.push(Channel::new(format!("{name}_{i}"), kind));
            }
            Protocol::new(channels).unwrap()
        })
    }

    proptest! {
        #[test]
        fn prop_offsets_monotonic_and_consistent(protocol in arb_protocol()) {
            let offsets = protocol.offsets();
            let channels = protocol.channels();
            for i in 0..channels.len() {
                let expected_next = offsets[i] + channels[i].kind().width();
                if i + 1 < channels.len() {
                    prop_assert_eq!(offsets[i + 1], expected_next);
                } else {
                    prop_assert_eq!(protocol.frame_size(), expected_next);
                }
            }
            if channels.is_empty() {
                prop_assert_eq!(protocol.frame_size(), TIMESTAMP_SIZE);
            }
        }

        #[test]
        fn prop_header_roundtrip_preserves_layout(protocol in arb_protocol()) {
            let mirrored = Protocol::deserialize_header(&protocol.serialize_header()).unwrap();
            prop_assert_eq!(mirrored.channels().len(), protocol.channels().len());
            for (a, b) in protocol.channels().iter().zip(mirrored.channels()) {
                prop_assert_eq!(a.name(), b.name());
                prop_assert_eq!(a.kind(), b.kind());
            }
        }

        #[test]
        fn prop_frame_roundtrip_bit_exact(
            protocol in arb_protocol(),
            timestamp in any::<f64>(),
            seed in any::<u64>(),
        ) {
            let mut protocol = protocol;
            // Derive per-channel values from the seed, bit-pattern heavy
            for i in 0..protocol.channels().len() {
                let channel = protocol.channel_mut(i).unwrap();
                let bits = seed.wrapping_mul(i as u64 + 1).wrapping_add(0x9e3779b97f4a7c15);
                let value = match channel.kind() {
                    ChannelKind::Numeric => ChannelValue::Numeric(f64::from_bits(bits)),
                    ChannelKind::Boolean => ChannelValue::Boolean(bits & 1 == 1),
                    ChannelKind::Pose => ChannelValue::Pose {
                        x: f64::from_bits(bits),
                        y: f64::from_bits(bits.rotate_left(17)),
                        theta: f64::from_bits(bits.rotate_left(41)),
                    },
                };
                channel.update(value).unwrap();
            }

            let mut buf = vec![0u8; protocol.frame_size()];
            protocol.populate_buffer(timestamp, &mut buf).unwrap();

            let mut mirrored =
                Protocol::deserialize_header(&protocol.serialize_header()).unwrap();
            let decoded = mirrored.populate_channels(&buf).unwrap();

            prop_assert_eq!(decoded.to_bits(), timestamp.to_bits());
            for (a, b) in protocol.channels().iter().zip(mirrored.channels()) {
                match (a.value(), b.value()) {
                    (ChannelValue::Numeric(x), ChannelValue::Numeric(y)) => {
                        prop_assert_eq!(x.to_bits(), y.to_bits());
                    }
                    (ChannelValue::Boolean(x), ChannelValue::Boolean(y)) => {
                        prop_assert_eq!(x, y);
                    }
                    (
                        ChannelValue::Pose { x, y, theta },
                        ChannelValue::Pose { x: x2, y: y2, theta: t2 },
                    ) => {
                        prop_assert_eq!(x.to_bits(), x2.to_bits());
                        prop_assert_eq!(y.to_bits(), y2.to_bits());
                        prop_assert_eq!(theta.to_bits(), t2.to_bits());
                    }
                    _ => prop_assert!(false, "kind changed across roundtrip"),
                }
            }
        }
    }
}
