//! Shared fixtures for tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use crate::protocol::Protocol;
use crate::types::{Channel, ChannelKind, ChannelValue};

/// A protocol with one channel of each kind, the standard fixture for
/// codec and ingestion tests.
pub fn demo_protocol() -> Protocol {
    Protocol::new(vec![
        Channel::new("rpm", ChannelKind::Numeric),
        Channel::new("intake_open", ChannelKind::Boolean),
        Channel::new("robot_pose", ChannelKind::Pose),
    ])
    .expect("demo channel names are unique")
}

/// Encode one frame of the demo protocol with values derived from `seed`.
pub fn demo_frame(timestamp: f64, seed: f64) -> Vec<u8> {
    let mut protocol = demo_protocol();
    protocol.channel_mut(0).unwrap().update(ChannelValue::Numeric(seed)).unwrap();
    protocol.channel_mut(1).unwrap().update(ChannelValue::Boolean(seed > 0.0)).unwrap();
    protocol
        .channel_mut(2)
        .unwrap()
        .update(ChannelValue::Pose { x: seed, y: -seed, theta: seed * 0.5 })
        .unwrap();

    let mut buf = vec![0u8; protocol.frame_size()];
    protocol.populate_buffer(timestamp, &mut buf).expect("buffer sized to frame");
    buf
}
