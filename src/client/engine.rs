//! Ingestion engine and the shared buffer set read by renderers.
//!
//! Two locks govern the shared state, and only two:
//!
//! - the **draw lock**, an `RwLock` around the whole buffer set. A render
//!   pass holds the read guard for its full duration; structural mutation
//!   ([`ScopeEngine::accept_protocol`], display-setting changes) takes the
//!   write guard. Ingestion also enters under a read guard, so it is never
//!   blocked by a render pass.
//! - the **pointer lock**, a `Mutex<usize>` around the shared write cursor.
//!   Held only for the few instructions needed to read or advance the
//!   cursor, never across a decode or a render pass. Always the innermost
//!   lock.
//!
//! Within one [`ScopeEngine::accept_data`] call the timestamp write, the
//! per-channel slot writes, and the cursor advance happen in that order; a
//! reader that observes cursor `k` sees fully written data for every index
//! up to `k`. A render pass may miss at most the single sample written
//! while it runs.

use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ring::{ChannelRing, TimestampHistory};
use crate::error::Result;
use crate::protocol::Protocol;
use crate::types::ChannelKind;

/// Default per-channel history capacity in samples.
pub const DEFAULT_CAPACITY: usize = 100_000;

/// Name and kind of a mirrored channel, for renderer labeling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub kind: ChannelKind,
}

/// Timebase display settings, mutated only under the draw lock.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplaySettings {
    /// Number of timebase divisions drawn on the plot.
    pub divisions: usize,
    /// Seconds of history per division.
    pub seconds_per_division: f64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self { divisions: 9, seconds_per_division: 0.1 }
    }
}

/// A contiguous index range into history selected for display.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub first_index: usize,
    pub last_index: usize,
    pub time_first: f64,
    pub time_last: f64,
}

/// Everything guarded by the draw lock: rings, timestamps, channel
/// descriptors, display settings, and the acquisition hold.
#[derive(Debug)]
pub struct BufferSet {
    channels: Vec<ChannelInfo>,
    rings: Vec<ChannelRing>,
    timestamps: TimestampHistory,
    display: DisplaySettings,
    /// Index the window end is pinned to while acquisition is stopped.
    hold: Option<usize>,
}

impl BufferSet {
    pub fn channels(&self) -> &[ChannelInfo] {
        &self.channels
    }

    pub fn rings(&self) -> &[ChannelRing] {
        &self.rings
    }

    pub fn timestamps(&self) -> &TimestampHistory {
        &self.timestamps
    }

    pub fn display(&self) -> DisplaySettings {
        self.display
    }

    /// Compute a display window ending at `now_index`.
    ///
    /// The window spans `seconds_per_division * (divisions + 1)` seconds.
    /// Once enough history exists the window rolls, right-aligned on
    /// `now_index`; before that it is fixed left-aligned at time 0 and
    /// index 0, which keeps the view stable while history accumulates.
    ///
    /// `now_index` past the end of history clamps to the last slot.
    pub fn snapshot_window(
        &self,
        now_index: usize,
        divisions: usize,
        seconds_per_division: f64,
    ) -> Window {
        let now_index = now_index.min(self.timestamps.capacity().saturating_sub(1));
        let span = seconds_per_division * (divisions as f64 + 1.0);
        let time_last = self.timestamps.get(now_index);
        let time_first = time_last - span;

        if time_first > 0.0 {
            Window {
                first_index: self.timestamps.window_start(time_first, now_index),
                last_index: now_index,
                time_first,
                time_last,
            }
        } else {
            Window { first_index: 0, last_index: now_index, time_first: 0.0, time_last: span }
        }
    }
}

/// The shared buffer set plus the two locks of the concurrency contract.
///
/// Owned by the ingestion engine; renderers hold an `Arc` and access it
/// only through these methods.
#[derive(Debug)]
pub struct ScopeBuffers {
    capacity: usize,
    set: RwLock<BufferSet>,
    cursor: Mutex<usize>,
}

impl ScopeBuffers {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            capacity,
            set: RwLock::new(BufferSet {
                channels: Vec::new(),
                rings: Vec::new(),
                timestamps: TimestampHistory::new(capacity),
                display: DisplaySettings::default(),
                hold: None,
            }),
            cursor: Mutex::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire the draw lock for one full render pass.
    ///
    /// While the guard is held the buffer structure cannot change;
    /// ingestion continues unblocked.
    pub fn read(&self) -> RwLockReadGuard<'_, BufferSet> {
        self.set.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current write cursor. Slots below it are fully written.
    pub fn cursor(&self) -> usize {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Index of the most recent fully written sample, if any.
    pub fn latest_index(&self) -> Option<usize> {
        self.cursor().checked_sub(1)
    }

    /// Replace the display settings under the draw lock.
    pub fn set_display(&self, display: DisplaySettings) {
        let mut set = self.set.write().unwrap_or_else(PoisonError::into_inner);
        set.display = display;
    }

    /// Stop acquisition: pin the window end at the latest index.
    pub fn freeze(&self) {
        let mut set = self.set.write().unwrap_or_else(PoisonError::into_inner);
        set.hold = Some(self.latest_index().unwrap_or(0));
    }

    /// Resume acquisition: windows follow the latest index again.
    pub fn resume(&self) {
        let mut set = self.set.write().unwrap_or_else(PoisonError::into_inner);
        set.hold = None;
    }

    /// Whether acquisition is running (no hold pinned).
    pub fn is_running(&self) -> bool {
        self.read().hold.is_none()
    }

    /// Display window for the configured timebase, ending at the latest
    /// index (or the held index while stopped). `None` until at least two
    /// samples exist.
    pub fn window(&self) -> Option<Window> {
        let set = self.read();
        let latest = self.latest_index()?;
        let end = set.hold.map_or(latest, |held| held.min(latest));
        if end == 0 {
            return None;
        }
        Some(set.snapshot_window(end, set.display.divisions, set.display.seconds_per_division))
    }

    /// Display window ending at an explicit index.
    pub fn snapshot_window(
        &self,
        now_index: usize,
        divisions: usize,
        seconds_per_division: f64,
    ) -> Window {
        self.read().snapshot_window(now_index, divisions, seconds_per_division)
    }
}

/// Client-side ingestion engine.
///
/// Owned by the network-receive loop; decodes incoming frames through its
/// protocol mirror and appends samples into the shared buffer set.
#[derive(Debug)]
pub struct ScopeEngine {
    protocol: Protocol,
    scratch: Vec<u8>,
    shared: Arc<ScopeBuffers>,
}

impl ScopeEngine {
    pub fn new(capacity: usize) -> Self {
        let protocol = Protocol::empty();
        let scratch = vec![0u8; protocol.frame_size()];
        Self { protocol, scratch, shared: Arc::new(ScopeBuffers::new(capacity)) }
    }

    /// Handle to the shared buffers for the render side.
    pub fn buffers(&self) -> Arc<ScopeBuffers> {
        Arc::clone(&self.shared)
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Receive buffer for the data socket, sized to the active frame.
    pub(crate) fn scratch_mut(&mut self) -> &mut [u8] {
        &mut self.scratch
    }

    /// Accept a new protocol, fully resetting ingestion state.
    ///
    /// Runs under the draw lock's write guard so readers never observe old
    /// rings paired with a new protocol or vice versa. Rings are recreated
    /// typed per channel kind, the timestamp history and cursor reset, and
    /// the decode scratch is reallocated to the new frame size.
    pub fn accept_protocol(&mut self, protocol: Protocol) {
        let mut set = self.shared.set.write().unwrap_or_else(PoisonError::into_inner);
        *self.shared.cursor.lock().unwrap_or_else(PoisonError::into_inner) = 0;

        set.rings = protocol
            .channels()
            .iter()
            .map(|c| ChannelRing::for_kind(c.kind(), self.shared.capacity))
            .collect();
        set.channels = protocol
            .channels()
            .iter()
            .map(|c| ChannelInfo { name: c.name().to_string(), kind: c.kind() })
            .collect();
        set.timestamps.reset();
        set.hold = None;

        debug!(
            channels = protocol.channels().len(),
            frame_size = protocol.frame_size(),
            "accepted new protocol"
        );
        self.scratch = vec![0u8; protocol.frame_size()];
        self.protocol = protocol;
    }

    /// Decode one frame and append it to every buffer at the cursor.
    ///
    /// Takes only the pointer lock (plus the draw lock's shared guard);
    /// high-rate ingestion is never blocked by rendering. Once the cursor
    /// reaches `capacity - 1` it is held there and further samples
    /// overwrite the last slot.
    ///
    /// Returns the frame's absolute timestamp.
    pub fn accept_data(&mut self, frame: &[u8]) -> Result<f64> {
        let timestamp = self.protocol.populate_channels(frame)?;

        let set = self.shared.set.read().unwrap_or_else(PoisonError::into_inner);
        let index = *self.shared.cursor.lock().unwrap_or_else(PoisonError::into_inner);

        set.timestamps.record(index, timestamp);
        for (ring, channel) in set.rings.iter().zip(self.protocol.channels()) {
            ring.store(index, channel.value());
        }

        // Advance only after every slot write; a reader that sees the new
        // cursor sees complete data. The pointer lock is taken twice so it
        // is never held across the slot writes.
        let mut cursor = self.shared.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        *cursor = (*cursor + 1).min(self.shared.capacity - 1);
        Ok(timestamp)
    }

    /// Decode the first `len` bytes of the scratch buffer, as filled by a
    /// datagram receive.
    pub(crate) fn accept_scratch(&mut self, len: usize) -> Result<f64> {
        let scratch = std::mem::take(&mut self.scratch);
        let result = self.accept_data(&scratch[..len.min(scratch.len())]);
        self.scratch = scratch;
        result
    }
}
