//! Scaling Timing Bloom Filter (C5): an expanding sequence of TBFs
//!
//! A single [`TimingBloomFilter`] has a fixed capacity beyond which its
//! false-positive rate exceeds its configured error. This layer preserves
//! that error as an *aggregate* bound by partitioning insertions across a
//! growing sequence of child filters, each built with a geometrically
//! smaller error budget (`spec.md` §4.5).

use super::timing::TimingBloomFilter;
use crate::clock::{Clock, SystemClock};
use crate::common::validation::{validate_capacity, validate_decay_time, validate_growth_factor, validate_probability};
use crate::common::Result;
use crate::driver::{ManualDriver, PeriodicDriver};
use std::sync::Arc;

/// Builds a fresh [`PeriodicDriver`] for one child filter
///
/// Every child gets its own driver instance (a `PeriodicDriver` cannot be
/// shared across filters once `schedule`d), so STBF takes a factory rather
/// than a single driver, mirroring how [`TimingBloomFilter`] takes one
/// driver per filter.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn PeriodicDriver> + Send + Sync>;

fn manual_driver_factory() -> DriverFactory {
    Arc::new(|| Box::new(ManualDriver::new()) as Box<dyn PeriodicDriver>)
}

/// Fill ratio beyond which a child filter is considered saturated and a new
/// one is allocated (`spec.md` §9: "document the exact fill ratio and
/// expose it as a parameter").
pub const DEFAULT_FILL_THRESHOLD: f64 = std::f64::consts::LN_2;

const DEFAULT_ERROR: f64 = 0.005;
const DEFAULT_ERROR_TIGHTENING_RATIO: f64 = 0.5;
const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

struct ChildMeta {
    filter: TimingBloomFilter,
    capacity: u64,
    error: f64,
}

/// A Bloom filter that grows by allocating new [`TimingBloomFilter`]
/// children as earlier ones saturate, bounding aggregate error rather than
/// per-filter error (`spec.md` §4.5).
pub struct ScalingTimingBloomFilter {
    children: Vec<ChildMeta>,
    initial_capacity: u64,
    error: f64,
    decay_time: f64,
    error_tightening_ratio: f64,
    growth_factor: f64,
    fill_threshold: f64,
    max_id_count: Option<u64>,
    inserted: u64,
    clock: Arc<dyn Clock>,
    driver_factory: DriverFactory,
}

impl ScalingTimingBloomFilter {
    /// Creates an STBF at the default error rate, tightening ratio, growth
    /// factor, and fill threshold.
    pub fn new(capacity: u64, decay_time: f64) -> Result<Self> {
        Self::with_params(
            capacity,
            decay_time,
            DEFAULT_ERROR,
            DEFAULT_ERROR_TIGHTENING_RATIO,
            DEFAULT_GROWTH_FACTOR,
            DEFAULT_FILL_THRESHOLD,
            None,
        )
    }

    /// Creates an STBF with explicit configuration, per `spec.md` §6's
    /// recognized STBF options.
    #[allow(clippy::too_many_arguments)]
    pub fn with_params(
        capacity: u64,
        decay_time: f64,
        error: f64,
        error_tightening_ratio: f64,
        growth_factor: f64,
        fill_threshold: f64,
        max_id_count: Option<u64>,
    ) -> Result<Self> {
        Self::with_collaborators(
            capacity,
            decay_time,
            error,
            error_tightening_ratio,
            growth_factor,
            fill_threshold,
            max_id_count,
            Arc::new(SystemClock),
            manual_driver_factory(),
        )
    }

    /// Creates an STBF with an injected clock, so children share a single
    /// deterministic time source in tests.
    pub fn with_clock(capacity: u64, decay_time: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        Self::with_collaborators(
            capacity,
            decay_time,
            DEFAULT_ERROR,
            DEFAULT_ERROR_TIGHTENING_RATIO,
            DEFAULT_GROWTH_FACTOR,
            DEFAULT_FILL_THRESHOLD,
            None,
            clock,
            manual_driver_factory(),
        )
    }

    /// Creates an STBF with fully injected collaborators: a clock and a
    /// [`DriverFactory`] invoked once per child filter.
    ///
    /// This is the path that lets [`ScalingTimingBloomFilter::start`] drive
    /// real automatic decay: pass a factory that returns
    /// `Box::new(ThreadDriver::new())` and every child gets its own
    /// background-thread driver instead of the default manually-stepped mock.
    #[allow(clippy::too_many_arguments)]
    pub fn with_collaborators(
        capacity: u64,
        decay_time: f64,
        error: f64,
        error_tightening_ratio: f64,
        growth_factor: f64,
        fill_threshold: f64,
        max_id_count: Option<u64>,
        clock: Arc<dyn Clock>,
        driver_factory: DriverFactory,
    ) -> Result<Self> {
        validate_capacity(capacity)?;
        validate_decay_time(decay_time)?;
        validate_probability(error, "error")?;
        validate_probability(error_tightening_ratio, "error_tightening_ratio")?;
        validate_growth_factor(growth_factor)?;

        let mut stbf = Self {
            children: Vec::new(),
            initial_capacity: capacity,
            error,
            decay_time,
            error_tightening_ratio,
            growth_factor,
            fill_threshold,
            max_id_count,
            inserted: 0,
            clock,
            driver_factory,
        };
        stbf.push_child(capacity, stbf.budget_for(0))?;
        Ok(stbf)
    }

    /// Per-child error budget `εᵢ = ε · (1 − r) · rⁱ` (`spec.md` §4.5)
    fn budget_for(&self, i: u32) -> f64 {
        self.error * (1.0 - self.error_tightening_ratio) * self.error_tightening_ratio.powi(i as i32)
    }

    fn capacity_for(&self, i: u32) -> u64 {
        (self.initial_capacity as f64 * self.growth_factor.powi(i as i32)).ceil() as u64
    }

    fn push_child(&mut self, capacity: u64, error: f64) -> Result<()> {
        let filter = TimingBloomFilter::with_collaborators(
            capacity,
            self.decay_time,
            error,
            Arc::clone(&self.clock),
            (self.driver_factory)(),
        )?;
        self.children.push(ChildMeta {
            filter,
            capacity,
            error,
        });
        Ok(())
    }

    /// The number of currently live child filters
    pub fn num_filters(&self) -> usize {
        self.children.len()
    }

    /// Aggregate error estimate `1 − Π(1 − εᵢ)` over live children
    /// (`spec.md` §4.5)
    pub fn expected_error(&self) -> f64 {
        let product: f64 = self.children.iter().map(|c| 1.0 - c.error).product();
        1.0 - product
    }

    /// Routes `key` to the current write target, allocating a new child
    /// first if that target is saturated (`spec.md` §4.5)
    pub fn add(&mut self, key: &[u8]) {
        if let Some(limit) = self.max_id_count {
            if self.inserted >= limit {
                return;
            }
        }
        let last = self.children.len() - 1;
        if self.children[last].filter.fill_ratio() > self.fill_threshold {
            let next_i = self.children.len() as u32;
            let capacity = self.capacity_for(next_i);
            let error = self.budget_for(next_i);
            // push_child only fails on invalid sizing, which cannot happen
            // here since capacity/error are derived from already-validated
            // parameters.
            self.push_child(capacity, error)
                .expect("derived child parameters are always valid");
        }
        self.children.last().unwrap().filter.add(key);
        self.inserted += 1;
    }

    /// True iff any child filter reports the key present (`spec.md` §4.5)
    pub fn contains(&self, key: &[u8]) -> bool {
        self.children.iter().any(|c| c.filter.contains(key))
    }

    /// Runs decay on every child, then prunes any child left with zero
    /// non-zero cells — except the most recently created one, which is kept
    /// to avoid thrash at steady state (`spec.md` §4.5)
    pub fn decay(&mut self) {
        for child in &mut self.children {
            child.filter.decay();
        }
        let last_index = self.children.len() - 1;
        let mut kept = Vec::with_capacity(self.children.len());
        for (i, child) in self.children.drain(..).enumerate() {
            if i == last_index || child.filter.size() > 0 {
                kept.push(child);
            }
        }
        self.children = kept;
    }

    /// Begins periodic decay on every child filter via its own driver
    pub fn start(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.filter.start()?;
        }
        Ok(())
    }

    /// Stops periodic decay on every child filter
    pub fn stop(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.filter.stop()?;
        }
        Ok(())
    }

    /// Serializes this filter: an STBF parameters line, a child count, then
    /// each child's own TBF serialization (`spec.md` §6)
    pub fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        let header = format!(
            "{}\t{}\t{}\t{}\n",
            self.initial_capacity, self.error, self.error_tightening_ratio, self.growth_factor
        );
        writer
            .write_all(header.as_bytes())
            .and_then(|_| writer.write_all(&(self.children.len() as u32).to_le_bytes()))
            .map_err(|e| crate::common::SketchError::SerializationError(e.to_string()))?;
        for child in &self.children {
            child.filter.to_writer(writer)?;
        }
        Ok(())
    }

    /// Deserializes an STBF previously written by
    /// [`ScalingTimingBloomFilter::to_writer`]
    ///
    /// Reconstructed children attach to fresh [`SystemClock`]/[`ManualDriver`]
    /// collaborators, as `spec.md` §6 directs.
    pub fn from_reader<R: std::io::Read>(reader: &mut R) -> Result<Self> {
        use crate::common::SketchError;
        use std::io::{BufRead, BufReader, Read};

        let mut buffered = BufReader::new(reader);
        let mut header_line = String::new();
        buffered
            .read_line(&mut header_line)
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        let mut fields = header_line.trim_end().split('\t');
        let mut next = || {
            fields
                .next()
                .ok_or_else(|| SketchError::DeserializationError("truncated STBF header".to_string()))
        };
        let initial_capacity: u64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad capacity field".to_string()))?;
        let error: f64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad error field".to_string()))?;
        let error_tightening_ratio: f64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad ratio field".to_string()))?;
        let growth_factor: f64 = next()?
            .parse()
            .map_err(|_| SketchError::DeserializationError("bad growth_factor field".to_string()))?;

        let mut count_buf = [0u8; 4];
        buffered
            .read_exact(&mut count_buf)
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        let count = u32::from_le_bytes(count_buf);

        let mut children = Vec::with_capacity(count as usize);
        let mut decay_time = None;
        for _ in 0..count {
            let filter = TimingBloomFilter::from_reader(&mut buffered)?;
            decay_time = Some(filter.decay_time());
            children.push(ChildMeta {
                capacity: filter.capacity(),
                error: filter.error(),
                filter,
            });
        }

        Ok(Self {
            children,
            initial_capacity,
            error,
            decay_time: decay_time.unwrap_or(1.0),
            error_tightening_ratio,
            growth_factor,
            fill_threshold: DEFAULT_FILL_THRESHOLD,
            max_id_count: None,
            inserted: 0,
            clock: Arc::new(SystemClock),
            driver_factory: manual_driver_factory(),
        })
    }
}
