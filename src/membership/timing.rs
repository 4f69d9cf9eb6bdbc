//! Timing Bloom Filter (C3): membership that expires on its own
//!
//! Replaces the counting filter's plain counters with *ticks* laid out on a
//! circular ring (`spec.md` §4.3), so "is this key present" and "has this
//! key expired" collapse into one interval test. Composes the same
//! [`CellArray`]/[`indices`] the counting filter uses rather than
//! inheriting from it (`spec.md` §9).

use super::cell_array::{compute_m_k, CellArray};
use super::index::indices;
use crate::clock::{Clock, SystemClock};
use crate::common::validation::{validate_byte_size, validate_capacity, validate_cell_dtype, validate_decay_time, validate_min_size, validate_probability};
use crate::common::{Result, Sketch, SketchError, WindowedSketch};
use crate::driver::{ManualDriver, PeriodicDriver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const RING: u16 = 255;
const CELL_DTYPE_OCTET: u8 = b'B';
const DEFAULT_ERROR: f64 = 0.005;

/// `dN`: width of the live window, half the ring (`spec.md` §3)
const fn live_window_width() -> u16 {
    RING / 2
}

/// Computes the current tick for time `t` given `seconds_per_tick`
///
/// `spec.md` §3: `((floor(t / s_t)) mod R) + 1`.
fn tick_for_time(t: f64, seconds_per_tick: f64) -> u8 {
    let idx = (t / seconds_per_tick).floor() as i64;
    (idx.rem_euclid(RING as i64)) as u8 + 1
}

/// Computes the minimum live tick for a given current tick, per `spec.md` §4.3
fn min_live_tick(tick_now: u8) -> u8 {
    let dn = live_window_width() as i64;
    let diff = tick_now as i64 - dn - 1;
    (diff.rem_euclid(RING as i64)) as u8 + 1
}

/// Tests whether cell value `x` falls in the live window `(tick_min, tick_now]`
///
/// Handles ring wraparound per `spec.md` §4.3's two-branch interval test.
fn is_live(x: u8, tick_min: u8, tick_now: u8) -> bool {
    if x == 0 {
        return false;
    }
    if tick_min < tick_now {
        tick_min < x && x <= tick_now
    } else {
        !(tick_now < x && x <= tick_min)
    }
}

struct TimingInner {
    cells: CellArray,
    k: u64,
    m: u64,
    capacity: u64,
    error: f64,
    decay_time: f64,
    seconds_per_tick: f64,
    num_non_zero: usize,
}

impl TimingInner {
    fn new(capacity: u64, decay_time: f64, error: f64) -> Result<Self> {
        validate_capacity(capacity)?;
        validate_probability(error, "error")?;
        validate_decay_time(decay_time)?;
        let (m, k) = compute_m_k(capacity, error);
        let seconds_per_tick = decay_time / live_window_width() as f64;
        Ok(Self {
            cells: CellArray::new(m),
            k,
            m,
            capacity,
            error,
            decay_time,
            seconds_per_tick,
            num_non_zero: 0,
        })
    }

    fn add_at(&mut self, key: &[u8], tick: u8) {
        for idx in indices(key, self.k, self.m) {
            if self.cells.get(idx) == 0 {
                self.num_non_zero += 1;
            }
            self.cells.set(idx, tick);
        }
    }

    fn contains_at(&self, key: &[u8], tick_now: u8) -> bool {
        let tick_min = min_live_tick(tick_now);
        indices(key, self.k, self.m).all(|idx| is_live(self.cells.get(idx), tick_min, tick_now))
    }

    fn decay_at(&mut self, tick_now: u8) {
        let tick_min = min_live_tick(tick_now);
        let mut alive = 0usize;
        for cell in self.cells.iter_mut() {
            if *cell != 0 {
                if is_live(*cell, tick_min, tick_now) {
                    alive += 1;
                } else {
                    *cell = 0;
                }
            }
        }
        self.num_non_zero = alive;
    }

    fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        let line1 = format!("{}\t{}\n", self.decay_time, self.num_non_zero);
        let line2 = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            self.capacity, self.error, self.m, self.k, CELL_DTYPE_OCTET as char
        );
        writer
            .write_all(line1.as_bytes())
            .and_then(|_| writer.write_all(line2.as_bytes()))
            .and_then(|_| writer.write_all(self.cells.as_bytes()))
            .map_err(|e| SketchError::SerializationError(e.to_string()))
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let first_nl = buf
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| SketchError::DeserializationError("missing timing header line".to_string()))?;
        let line1 = std::str::from_utf8(&buf[..first_nl])
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        let mut line1_fields = line1.split('\t');
        let decay_time: f64 = line1_fields
            .next()
            .ok_or_else(|| SketchError::DeserializationError("missing decay_time".to_string()))?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad decay_time field".to_string()))?;
        let num_non_zero: u64 = line1_fields
            .next()
            .ok_or_else(|| SketchError::DeserializationError("missing num_non_zero".to_string()))?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad num_non_zero field".to_string()))?;

        let rest = &buf[first_nl + 1..];
        let second_nl = rest
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| SketchError::DeserializationError("missing cbf header line".to_string()))?;
        let line2 = std::str::from_utf8(&rest[..second_nl])
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        let mut fields = line2.split('\t');
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| SketchError::DeserializationError("truncated header".to_string()))
        };
        let capacity: u64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad capacity field".to_string()))?;
        let error: f64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad error field".to_string()))?;
        let m: u64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad m field".to_string()))?;
        let k: u64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad k field".to_string()))?;
        let dtype = next()?;
        let dtype_byte = *dtype
            .as_bytes()
            .first()
            .ok_or_else(|| SketchError::DeserializationError("empty dtype field".to_string()))?;
        validate_cell_dtype(dtype_byte)?;
        validate_byte_size(m as usize)?;

        let body = &rest[second_nl + 1..];
        validate_min_size(body.len(), m as usize)?;
        let cells = CellArray::from_bytes(body[..m as usize].to_vec());
        let seconds_per_tick = decay_time / live_window_width() as f64;

        Ok(Self {
            cells,
            k,
            m,
            capacity,
            error,
            decay_time,
            seconds_per_tick,
            num_non_zero: num_non_zero as usize,
        })
    }
}

/// A Bloom filter whose membership expires automatically after `decay_time`
/// seconds (`spec.md` §1, §4.3)
///
/// Internally a shared, mutex-guarded cell array: [`TimingBloomFilter::start`]
/// hands the decay driver a callback that locks the mutex from whatever
/// thread the driver runs on (`spec.md` §5's concurrency model documents
/// this as a permitted widening of the base single-executor assumption —
/// see [`crate::driver`]).
pub struct TimingBloomFilter {
    inner: Arc<Mutex<TimingInner>>,
    clock: Arc<dyn Clock>,
    driver: Box<dyn PeriodicDriver>,
}

impl TimingBloomFilter {
    /// Creates a filter sized for `capacity` elements with a `decay_time`
    /// second live window, at the default error rate (`spec.md` §6).
    pub fn new(capacity: u64, decay_time: f64) -> Result<Self> {
        Self::with_params(capacity, decay_time, DEFAULT_ERROR)
    }

    /// Creates a filter with an explicit error rate
    pub fn with_params(capacity: u64, decay_time: f64, error: f64) -> Result<Self> {
        Self::with_collaborators(
            capacity,
            decay_time,
            error,
            Arc::new(SystemClock),
            Box::new(ManualDriver::new()),
        )
    }

    /// Creates a filter with injected clock and decay-driver collaborators
    ///
    /// Used by tests to drive time and decay deterministically, and by
    /// callers who want a real background-thread driver (`spec.md` §9's
    /// `decay_driver` configuration option).
    pub fn with_collaborators(
        capacity: u64,
        decay_time: f64,
        error: f64,
        clock: Arc<dyn Clock>,
        driver: Box<dyn PeriodicDriver>,
    ) -> Result<Self> {
        let inner = TimingInner::new(capacity, decay_time, error)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            clock,
            driver,
        })
    }

    /// The capacity this filter was sized for
    pub fn capacity(&self) -> u64 {
        self.inner.lock().unwrap().capacity
    }

    /// The target error rate this filter was sized for
    pub fn error(&self) -> f64 {
        self.inner.lock().unwrap().error
    }

    /// The configured decay time, in seconds
    pub fn decay_time(&self) -> f64 {
        self.inner.lock().unwrap().decay_time
    }

    /// Number of cells
    pub fn num_cells(&self) -> u64 {
        self.inner.lock().unwrap().m
    }

    /// Number of hash functions examined per key
    pub fn num_hashes(&self) -> u64 {
        self.inner.lock().unwrap().k
    }

    /// Stamps each of the key's `k` cells with the current tick
    ///
    /// Overwriting a non-zero cell with a newer tick is correct and
    /// intentional — it refreshes the entry (`spec.md` §4.3).
    pub fn add(&self, key: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        let tick = tick_for_time(self.clock.now(), inner.seconds_per_tick);
        inner.add_at(key, tick);
    }

    /// True iff every cell for `key` holds a tick inside the live window
    pub fn contains(&self, key: &[u8]) -> bool {
        let inner = self.inner.lock().unwrap();
        let tick_now = tick_for_time(self.clock.now(), inner.seconds_per_tick);
        inner.contains_at(key, tick_now)
    }

    /// Zeroes every cell whose tick has left the live window, and refreshes
    /// the non-zero cell count (`spec.md` §4.3)
    pub fn decay(&self) {
        let mut inner = self.inner.lock().unwrap();
        let tick_now = tick_for_time(self.clock.now(), inner.seconds_per_tick);
        inner.decay_at(tick_now);
    }

    /// Current count of non-zero cells
    ///
    /// Advisory (`spec.md` §4.3): used by the scaling layer's saturation
    /// heuristic and by serialization, kept consistent after every `add`
    /// and `decay` but not guaranteed mid-operation.
    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().num_non_zero
    }

    /// Fraction of cells currently non-zero
    pub fn fill_ratio(&self) -> f64 {
        let inner = self.inner.lock().unwrap();
        inner.num_non_zero as f64 / inner.m as f64
    }

    /// Begins invoking `decay` at the minimum safe cadence: twice per tick
    /// (`spec.md` §4.4)
    ///
    /// # Errors
    /// Returns [`SketchError::DriverStateError`] if already started.
    pub fn start(&mut self) -> Result<()> {
        let interval = {
            let inner = self.inner.lock().unwrap();
            Duration::from_secs_f64((inner.seconds_per_tick * 0.5).max(0.0))
        };
        let inner = Arc::clone(&self.inner);
        let clock = Arc::clone(&self.clock);
        self.driver.schedule(
            interval,
            Box::new(move || {
                let mut guard = inner.lock().unwrap();
                let tick_now = tick_for_time(clock.now(), guard.seconds_per_tick);
                guard.decay_at(tick_now);
            }),
        );
        self.driver.start()
    }

    /// Stops the decay driver started by [`TimingBloomFilter::start`]
    ///
    /// # Errors
    /// Returns [`SketchError::DriverStateError`] if not running.
    pub fn stop(&mut self) -> Result<()> {
        self.driver.stop()
    }

    /// Serializes this filter per the layout in `spec.md` §6
    pub fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        self.inner.lock().unwrap().to_writer(writer)
    }

    /// Deserializes a filter previously written by
    /// [`TimingBloomFilter::to_writer`]
    ///
    /// The reconstructed filter uses a fresh [`SystemClock`] and
    /// [`ManualDriver`]; `num_non_zero` is trusted as written until the
    /// next `decay` reconciles it (`spec.md` §6).
    pub fn from_reader<R: std::io::Read>(reader: &mut R) -> Result<Self> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        let inner = TimingInner::from_bytes(&buf)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(inner)),
            clock: Arc::new(SystemClock),
            driver: Box::new(ManualDriver::new()),
        })
    }
}

impl WindowedSketch for TimingBloomFilter {
    type Item = Vec<u8>;

    fn update_with_timestamp(&mut self, item: Self::Item, timestamp: f64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let tick = tick_for_time(timestamp, inner.seconds_per_tick);
        inner.add_at(&item, tick);
        Ok(())
    }

    fn estimate_window(&self, current_time: f64, _window_seconds: f64) -> f64 {
        let inner = self.inner.lock().unwrap();
        let tick_now = tick_for_time(current_time, inner.seconds_per_tick);
        let tick_min = min_live_tick(tick_now);
        inner
            .cells
            .iter()
            .filter(|&&c| is_live(c, tick_min, tick_now))
            .count() as f64
    }
}

impl Sketch for TimingBloomFilter {
    type Item = Vec<u8>;

    fn update(&mut self, item: &Self::Item) {
        self.add(item);
    }

    fn estimate(&self) -> f64 {
        self.size() as f64
    }

    fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn manual_filter(capacity: u64, decay_time: f64) -> (TimingBloomFilter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let filter = TimingBloomFilter::with_collaborators(
            capacity,
            decay_time,
            DEFAULT_ERROR,
            clock.clone(),
            Box::new(ManualDriver::new()),
        )
        .unwrap();
        (filter, clock)
    }

    #[test]
    fn add_and_hit() {
        let (filter, _clock) = manual_filter(500, 4.0);
        filter.add(b"hello");
        assert!(filter.contains(b"hello"));
    }

    #[test]
    fn decay_and_miss() {
        let (filter, clock) = manual_filter(500, 4.0);
        filter.add(b"hello");
        clock.advance(5.0);
        filter.decay();
        assert!(!filter.contains(b"hello"));
    }

    #[test]
    fn refresh_resets_live_window() {
        let (filter, clock) = manual_filter(100, 2.0);
        filter.add(b"x");
        clock.advance(1.5);
        filter.add(b"x");
        clock.advance(1.0);
        assert!(filter.contains(b"x"));
    }

    #[test]
    fn num_non_zero_matches_true_count_after_add() {
        let (filter, _clock) = manual_filter(1000, 10.0);
        filter.add(b"a");
        filter.add(b"b");
        filter.add(b"c");
        let inner = filter.inner.lock().unwrap();
        assert_eq!(inner.num_non_zero, inner.cells.count_non_zero());
    }

    #[test]
    fn num_non_zero_matches_true_count_after_decay() {
        let (filter, clock) = manual_filter(1000, 4.0);
        filter.add(b"a");
        filter.add(b"b");
        clock.advance(5.0);
        filter.decay();
        let inner = filter.inner.lock().unwrap();
        assert_eq!(inner.num_non_zero, inner.cells.count_non_zero());
    }

    #[test]
    fn no_false_negatives_on_recent_inserts() {
        let (filter, _clock) = manual_filter(1000, 10.0);
        for i in 0..500 {
            filter.add(format!("idx_{i}").as_bytes());
        }
        for i in 0..500 {
            assert!(filter.contains(format!("idx_{i}").as_bytes()));
        }
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let n = 2000u64;
        let (filter, _clock) = manual_filter(n, 30.0);
        for i in 0..n {
            filter.add(format!("idx_{i}").as_bytes());
        }
        let mut false_positives = 0u64;
        for i in n..2 * n {
            if filter.contains(format!("idx_{i}").as_bytes()) {
                false_positives += 1;
            }
        }
        let fpr = false_positives as f64 / n as f64;
        assert!(fpr < filter.error() * 3.0, "fpr too high: {fpr}");
    }

    #[test]
    fn serialization_roundtrips() {
        let (filter, _clock) = manual_filter(100, 5.0);
        filter.add(b"key1");
        filter.add(b"key2");

        let mut buf = Vec::new();
        filter.to_writer(&mut buf).unwrap();
        let restored = TimingBloomFilter::from_reader(&mut &buf[..]).unwrap();

        assert_eq!(restored.num_cells(), filter.num_cells());
        assert_eq!(restored.num_hashes(), filter.num_hashes());
        assert_eq!(restored.size(), filter.size());
    }

    #[test]
    fn start_then_start_is_a_driver_state_error() {
        let (mut filter, _clock) = manual_filter(100, 4.0);
        filter.start().unwrap();
        assert!(filter.start().is_err());
        filter.stop().unwrap();
    }

    #[test]
    fn stop_without_start_is_a_driver_state_error() {
        let (mut filter, _clock) = manual_filter(100, 4.0);
        assert!(filter.stop().is_err());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(TimingBloomFilter::new(0, 4.0).is_err());
        assert!(TimingBloomFilter::new(100, 0.0).is_err());
        assert!(TimingBloomFilter::with_params(100, 4.0, 1.5).is_err());
    }

    #[test]
    fn windowed_sketch_update_with_timestamp() {
        let (mut filter, _clock) = manual_filter(100, 4.0);
        filter.update_with_timestamp(b"x".to_vec(), 0.0).unwrap();
        assert!(filter.estimate_window(0.0, 4.0) > 0.0);
    }

    #[test]
    fn sketch_trait_update_and_estimate() {
        let (mut filter, _clock) = manual_filter(100, 4.0);
        assert!(Sketch::is_empty(&filter));
        Sketch::update(&mut filter, &b"hello".to_vec());
        assert!(filter.contains(b"hello"));
        assert!(Sketch::estimate(&filter) > 0.0);
        assert!(!Sketch::is_empty(&filter));
    }

    #[test]
    fn tick_wraps_around_the_ring() {
        // Ticks near the ring boundary must still form a valid live window.
        let (filter, clock) = manual_filter(100, 4.0);
        // Advance close to where `tick_for_time` wraps back to 1.
        let seconds_per_tick = filter.inner.lock().unwrap().seconds_per_tick;
        clock.set(seconds_per_tick * (RING as f64 - 1.0));
        filter.add(b"boundary-key");
        assert!(filter.contains(b"boundary-key"));
    }
}
