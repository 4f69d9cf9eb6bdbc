//! The hash indexer (C1): derives `k` cell indices from a key
//!
//! Kirsch-Mitzenmacher double hashing (`spec.md` §4.1): one 128-bit hash of
//! the key yields two independent 64-bit halves `h1`, `h2`; the `i`-th of
//! `k` indices is `(h1 + i * h2) mod m`.

use crate::common::hash::base_hashes;

/// Derives the `k` cell indices for `key` into a filter with `m` cells
///
/// If `h2 mod m == 0`, every index would collapse onto `h1 mod m`; `spec.md`
/// §4.1 permits tolerating this (it only degrades error) or rotating `h2`
/// by one bit to break the degeneracy. This implementation rotates, since
/// the fix is free and removes a real (if rare) accuracy cliff.
pub fn indices(key: &[u8], k: u64, m: u64) -> impl Iterator<Item = usize> {
    let (h1, mut h2) = base_hashes(key);
    if m != 0 && h2 % m == 0 {
        h2 = h2.rotate_left(1);
    }
    (0..k).map(move |i| ((h1.wrapping_add(i.wrapping_mul(h2))) % m) as usize)
}
