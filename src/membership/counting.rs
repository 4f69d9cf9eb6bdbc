//! Counting Bloom Filter (C2): the non-timing substrate
//!
//! Fixed-size cell array with add / remove / contains / bulk-decrement,
//! per `spec.md` §4.2. [`crate::membership::TimingBloomFilter`] reuses the
//! same [`CellArray`] and [`indices`] but overrides mutation and query
//! semantics entirely rather than inheriting from this type (`spec.md` §9).

use super::cell_array::{compute_m_k, CellArray};
use super::index::indices;
use crate::common::validation::{validate_byte_size, validate_capacity, validate_cell_dtype, validate_min_size, validate_probability};
use crate::common::{Result, Sketch, SketchError};

const CELL_DTYPE_OCTET: u8 = b'B';
const DEFAULT_ERROR: f64 = 0.005;

/// A fixed-capacity counting Bloom filter with byte-wide counters
///
/// Counters saturate silently at `u8::MAX` (`spec.md` §4.2): an `add`
/// beyond that point is a no-op for the overflowed cell rather than a
/// panic or error, since correctness here is already probabilistic.
#[derive(Clone, Debug)]
pub struct CountingBloomFilter {
    cells: CellArray,
    k: u64,
    m: u64,
    capacity: u64,
    error: f64,
}

impl CountingBloomFilter {
    /// Creates a filter sized for `capacity` elements at the default error
    /// rate (0.005), per `spec.md` §6.
    pub fn new(capacity: u64) -> Result<Self> {
        Self::with_error(capacity, DEFAULT_ERROR)
    }

    /// Creates a filter sized for `capacity` elements at a chosen error rate
    pub fn with_error(capacity: u64, error: f64) -> Result<Self> {
        validate_capacity(capacity)?;
        validate_probability(error, "error")?;
        let (m, k) = compute_m_k(capacity, error);
        Ok(Self {
            cells: CellArray::new(m),
            k,
            m,
            capacity,
            error,
        })
    }

    /// Number of cells
    pub fn num_cells(&self) -> u64 {
        self.m
    }

    /// Number of hash functions examined per key
    pub fn num_hashes(&self) -> u64 {
        self.k
    }

    /// The capacity this filter was sized for
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Increments each of the key's `k` cells by `amount`
    ///
    /// Saturates silently at the cell-type max (`spec.md` §4.2).
    pub fn add(&mut self, key: &[u8], amount: u8) {
        for idx in indices(key, self.k, self.m) {
            let current = self.cells.get(idx);
            self.cells.set(idx, current.saturating_add(amount));
        }
    }

    /// Decrements each of the key's `k` cells by `amount`
    ///
    /// Pre-check then commit (`spec.md` §4.2): if any cell holds a value
    /// less than `amount`, the whole operation is a no-op. Returns whether
    /// the decrement was applied.
    pub fn remove(&mut self, key: &[u8], amount: u8) -> bool {
        let idxs: Vec<usize> = indices(key, self.k, self.m).collect();
        if idxs.iter().any(|&i| self.cells.get(i) < amount) {
            return false;
        }
        for idx in idxs {
            let current = self.cells.get(idx);
            self.cells.set(idx, current - amount);
        }
        true
    }

    /// Decrements every cell holding at least `amount`, leaving others unchanged
    ///
    /// Used for bulk expirations; unused by the timing subsystem
    /// (`spec.md` §9 Open Question (b) — CBF-only).
    pub fn remove_all(&mut self, amount: u8) {
        for cell in self.cells.iter_mut() {
            if *cell >= amount {
                *cell -= amount;
            }
        }
    }

    /// True iff all `k` cells for `key` are non-zero
    pub fn contains(&self, key: &[u8]) -> bool {
        indices(key, self.k, self.m).all(|idx| self.cells.get(idx) != 0)
    }

    /// Count of non-zero cells
    pub fn size(&self) -> usize {
        self.cells.count_non_zero()
    }

    /// Serializes this filter: `<capacity:u64><error:f64><m:u64><k:u64><cell_dtype:u8>`
    /// header line followed by raw cell bytes, matching the line-2 layout
    /// `spec.md` §6 specifies for the timing filter's inner CBF state.
    pub fn to_writer<W: std::io::Write>(&self, writer: &mut W) -> Result<()> {
        let header = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            self.capacity, self.error, self.m, self.k, CELL_DTYPE_OCTET as char
        );
        writer
            .write_all(header.as_bytes())
            .and_then(|_| writer.write_all(self.cells.as_bytes()))
            .map_err(|e| SketchError::SerializationError(e.to_string()))
    }

    /// Deserializes a filter previously written by [`CountingBloomFilter::to_writer`]
    pub fn from_reader<R: std::io::Read>(reader: &mut R) -> Result<Self> {
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        Self::from_bytes(&buf)
    }

    fn from_bytes(buf: &[u8]) -> Result<Self> {
        let newline = buf
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| SketchError::DeserializationError("missing header line".to_string()))?;
        let header = std::str::from_utf8(&buf[..newline])
            .map_err(|e| SketchError::DeserializationError(e.to_string()))?;
        let mut fields = header.split('\t');
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

        let body = &buf[newline + 1..];
        validate_min_size(body.len(), m as usize)?;
        let cells = CellArray::from_bytes(body[..m as usize].to_vec());

        Ok(Self {
            cells,
            k,
            m,
            capacity,
            error,
        })
    }
}

impl Sketch for CountingBloomFilter {
    type Item = Vec<u8>;

    fn update(&mut self, item: &Self::Item) {
        self.add(item, 1);
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

    #[test]
    fn new_filter_is_empty() {
        let filter = CountingBloomFilter::new(100).unwrap();
        assert!(!filter.contains(b"anything"));
    }

    #[test]
    fn add_then_contains() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        filter.add(b"hello", 1);
        assert!(filter.contains(b"hello"));
    }

    #[test]
    fn remove_clears_membership() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        filter.add(b"hello", 1);
        assert!(filter.remove(b"hello", 1));
        assert!(!filter.contains(b"hello"));
    }

    #[test]
    fn remove_is_noop_when_not_present() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        assert!(!filter.remove(b"missing", 1));
    }

    #[test]
    fn remove_does_not_underflow_shared_cells() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        filter.add(b"key1", 1);
        // Removing a key that was never added must never touch key1's cells
        // below zero, nor spuriously delete it.
        filter.remove(b"never-added", 5);
        assert!(filter.contains(b"key1"));
    }

    #[test]
    fn remove_all_decrements_every_eligible_cell() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        filter.add(b"key1", 1);
        filter.add(b"key2", 1);
        filter.remove_all(1);
        assert!(!filter.contains(b"key1"));
        assert!(!filter.contains(b"key2"));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let mut filter = CountingBloomFilter::new(10).unwrap();
        for _ in 0..300 {
            filter.add(b"hot-key", 1);
        }
        assert!(filter.contains(b"hot-key"));
    }

    #[test]
    fn serialization_roundtrips() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        filter.add(b"key1", 1);
        filter.add(b"key2", 1);

        let mut buf = Vec::new();
        filter.to_writer(&mut buf).unwrap();
        let restored = CountingBloomFilter::from_reader(&mut &buf[..]).unwrap();

        assert!(restored.contains(b"key1"));
        assert!(restored.contains(b"key2"));
        assert!(!restored.contains(b"key3"));
        assert_eq!(restored.num_cells(), filter.num_cells());
        assert_eq!(restored.num_hashes(), filter.num_hashes());
    }

    #[test]
    fn rejects_invalid_capacity() {
        assert!(CountingBloomFilter::new(0).is_err());
    }

    #[test]
    fn rejects_invalid_error() {
        assert!(CountingBloomFilter::with_error(100, 0.0).is_err());
        assert!(CountingBloomFilter::with_error(100, 1.0).is_err());
    }

    #[test]
    fn sketch_trait_update_and_estimate() {
        let mut filter = CountingBloomFilter::new(100).unwrap();
        assert!(Sketch::is_empty(&filter));
        Sketch::update(&mut filter, &b"hello".to_vec());
        assert!(filter.contains(b"hello"));
        assert!(Sketch::estimate(&filter) > 0.0);
        assert!(!Sketch::is_empty(&filter));
    }
}
