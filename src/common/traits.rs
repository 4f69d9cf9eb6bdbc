//! Core traits shared across filter implementations

use super::error::SketchError;
use std::hash::Hash;

/// Core trait that all filters in this crate implement
///
/// Mirrors the update/estimate/is_empty/serialize shape common to
/// probabilistic sketches, so callers can write generic code against
/// whichever membership filter they're handed.
pub trait Sketch {
    /// The type of items this sketch accepts
    type Item;

    /// Update the sketch with a new item
    fn update(&mut self, item: &Self::Item);

    /// A scalar estimate of the sketch's contents
    ///
    /// For membership filters this is `size()` (the number of non-zero
    /// cells), used by observability tooling rather than callers needing an
    /// exact cardinality.
    fn estimate(&self) -> f64;

    /// Returns true if nothing has been inserted
    fn is_empty(&self) -> bool;
}

/// Trait for sketches whose membership decays with a time window
///
/// A [`crate::membership::TimingBloomFilter`] is a `WindowedSketch` whose
/// window is `decay_time` seconds wide: `update_with_timestamp` stamps a key
/// at a given time, and `estimate_window` reports how full the live window
/// is. The richer, timing-specific API (`add`, `contains`, `decay`) remains
/// on the concrete type since this trait only covers the generic shape.
pub trait WindowedSketch {
    /// The type of items this windowed sketch processes
    type Item: Hash;

    /// Record an observation of `item` at `timestamp` (Unix seconds)
    fn update_with_timestamp(&mut self, item: Self::Item, timestamp: f64) -> Result<(), SketchError>;

    /// Estimate a value over the window ending at `current_time`
    fn estimate_window(&self, current_time: f64, window_seconds: f64) -> f64;
}
