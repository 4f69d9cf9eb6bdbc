//! Hashing primitives shared by the counting and timing filters
//!
//! A single non-cryptographic 128-bit hash per key is enough to derive any
//! number of cell indices via Kirsch-Mitzenmacher double hashing (see
//! [`crate::membership::index`]), so this module exposes exactly one
//! function rather than a family of seeded hashers.

use xxhash_rust::xxh3::xxh3_128;

/// Computes a single 128-bit hash of `key` and splits it into two
/// independent 64-bit halves `(h1, h2)`.
///
/// The split halves feed Kirsch-Mitzenmacher double hashing: the `i`-th cell
/// index is `(h1 + i * h2) mod m`. Only this one hash invocation is needed
/// per key regardless of how many cells a filter examines.
#[inline]
pub fn base_hashes(key: &[u8]) -> (u64, u64) {
    let digest = xxh3_128(key);
    let h1 = (digest >> 64) as u64;
    let h2 = digest as u64;
    (h1, h2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_key() {
        assert_eq!(base_hashes(b"hello"), base_hashes(b"hello"));
    }

    #[test]
    fn differs_across_keys() {
        assert_ne!(base_hashes(b"hello"), base_hashes(b"world"));
    }

    #[test]
    fn halves_are_independent() {
        let (h1, h2) = base_hashes(b"some-key-of-moderate-length");
        assert_ne!(h1, h2);
    }
}
