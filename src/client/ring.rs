//! Fixed-capacity ring storage with atomic cells.
//!
//! Cells are atomic so the ingestion thread can write slots while a render
//! pass reads them under the draw lock's shared guard. Slot stores use
//! Release and loads Acquire; the cursor mutex in the engine provides the
//! "all slots up to the observed cursor are fully written" guarantee.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::types::{ChannelKind, ChannelValue};

/// Epsilon for timestamp window searches. Above the protocol's 1 ms
/// timestamp precision, below anything floating-point round-off produces.
pub const TIME_EPSILON: f64 = 1e-6;

/// A fixed array of f64 cells, written in place without locking.
#[derive(Debug)]
pub struct F64Cells {
    cells: Box<[AtomicU64]>,
}

impl F64Cells {
    fn new(capacity: usize) -> Self {
        Self { cells: (0..capacity).map(|_| AtomicU64::new(0)).collect() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> f64 {
        f64::from_bits(self.cells[index].load(Ordering::Acquire))
    }

    fn set(&self, index: usize, value: f64) {
        self.cells[index].store(value.to_bits(), Ordering::Release);
    }

    fn reset(&self) {
        for cell in &self.cells {
            cell.store(0, Ordering::Release);
        }
    }
}

/// A fixed array of bool cells, written in place without locking.
#[derive(Debug)]
pub struct BoolCells {
    cells: Box<[AtomicBool]>,
}

impl BoolCells {
    fn new(capacity: usize) -> Self {
        Self { cells: (0..capacity).map(|_| AtomicBool::new(false)).collect() }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> bool {
        self.cells[index].load(Ordering::Acquire)
    }

    fn set(&self, index: usize, value: bool) {
        self.cells[index].store(value, Ordering::Release);
    }

    fn reset(&self) {
        for cell in &self.cells {
            cell.store(false, Ordering::Release);
        }
    }
}

/// Per-channel history storage, typed by the channel's kind.
///
/// Slot `i` holds the value observed at the timestamp history's slot `i`;
/// the engine's shared write cursor indexes both.
#[derive(Debug)]
pub enum ChannelRing {
    Numeric(F64Cells),
    Boolean(BoolCells),
    Pose { x: F64Cells, y: F64Cells, theta: F64Cells },
}

impl ChannelRing {
    /// Allocate a ring for the given kind, sized independently of channel count.
    pub fn for_kind(kind: ChannelKind, capacity: usize) -> Self {
        match kind {
            ChannelKind::Numeric => ChannelRing::Numeric(F64Cells::new(capacity)),
            ChannelKind::Boolean => ChannelRing::Boolean(BoolCells::new(capacity)),
            ChannelKind::Pose => ChannelRing::Pose {
                x: F64Cells::new(capacity),
                y: F64Cells::new(capacity),
                theta: F64Cells::new(capacity),
            },
        }
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelRing::Numeric(_) => ChannelKind::Numeric,
            ChannelRing::Boolean(_) => ChannelKind::Boolean,
            ChannelRing::Pose { .. } => ChannelKind::Pose,
        }
    }

    /// Store one decoded value at `index`. Rings are paired with their
    /// channels at protocol acceptance, so kinds always agree here.
    pub(crate) fn store(&self, index: usize, value: ChannelValue) {
        match (self, value) {
            (ChannelRing::Numeric(cells), ChannelValue::Numeric(v)) => cells.set(index, v),
            (ChannelRing::Boolean(cells), ChannelValue::Boolean(v)) => cells.set(index, v),
            (ChannelRing::Pose { x, y, theta }, ChannelValue::Pose { x: vx, y: vy, theta: vt }) => {
                x.set(index, vx);
                y.set(index, vy);
                theta.set(index, vt);
            }
            (ring, value) => {
                debug_assert!(false, "ring kind {:?} paired with {:?} value", ring.kind(), value.kind());
            }
        }
    }

    /// Value stored at `index`, as a tagged union.
    pub fn value_at(&self, index: usize) -> ChannelValue {
        match self {
            ChannelRing::Numeric(cells) => ChannelValue::Numeric(cells.get(index)),
            ChannelRing::Boolean(cells) => ChannelValue::Boolean(cells.get(index)),
            ChannelRing::Pose { x, y, theta } => ChannelValue::Pose {
                x: x.get(index),
                y: y.get(index),
                theta: theta.get(index),
            },
        }
    }

    /// Numeric cell array, if this is a numeric ring.
    pub fn as_numeric(&self) -> Option<&F64Cells> {
        match self {
            ChannelRing::Numeric(cells) => Some(cells),
            _ => None,
        }
    }

    /// Boolean cell array, if this is a boolean ring.
    pub fn as_boolean(&self) -> Option<&BoolCells> {
        match self {
            ChannelRing::Boolean(cells) => Some(cells),
            _ => None,
        }
    }

    /// Pose cell arrays (x, y, theta), if this is a pose ring.
    pub fn as_pose(&self) -> Option<(&F64Cells, &F64Cells, &F64Cells)> {
        match self {
            ChannelRing::Pose { x, y, theta } => Some((x, y, theta)),
            _ => None,
        }
    }

    pub(crate) fn reset(&self) {
        match self {
            ChannelRing::Numeric(cells) => cells.reset(),
            ChannelRing::Boolean(cells) => cells.reset(),
            ChannelRing::Pose { x, y, theta } => {
                x.reset();
                y.reset();
                theta.reset();
            }
        }
    }
}

/// Fixed-capacity history of received sample times, normalized so the
/// series starts at zero.
///
/// The first timestamp recorded after a reset becomes the offset and is
/// subtracted from every stored value.
#[derive(Debug)]
pub struct TimestampHistory {
    cells: F64Cells,
    offset: AtomicU64,
}

impl TimestampHistory {
    pub fn new(capacity: usize) -> Self {
        Self { cells: F64Cells::new(capacity), offset: AtomicU64::new(0) }
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// Record an absolute timestamp at `index`. Index 0 sets the offset.
    pub(crate) fn record(&self, index: usize, timestamp: f64) {
        if index == 0 {
            self.offset.store(timestamp.to_bits(), Ordering::Release);
        }
        self.cells.set(index, timestamp - self.offset_value());
    }

    /// Normalized timestamp stored at `index`.
    pub fn get(&self, index: usize) -> f64 {
        self.cells.get(index)
    }

    /// The absolute timestamp the series was normalized against.
    pub fn offset_value(&self) -> f64 {
        f64::from_bits(self.offset.load(Ordering::Acquire))
    }

    pub(crate) fn reset(&self) {
        self.cells.reset();
        self.offset.store(0, Ordering::Release);
    }

    /// First index, scanning backward from `from`, whose stored time is
    /// strictly less than `target` (epsilon-compared); 0 if none is.
    ///
    /// Linear backward scan: stored times are only non-decreasing, not
    /// strictly increasing, and recent history is the common case.
    pub fn window_start(&self, target: f64, from: usize) -> usize {
        let from = from.min(self.capacity().saturating_sub(1));
        for i in (0..=from).rev() {
            if target - self.cells.get(i) > TIME_EPSILON {
                return i;
            }
        }
        0
    }
}
