//! Timing Bloom Filter scenario tests
//!
//! Covers the six invariants and the TBF-facing concrete scenarios: keys
//! are live immediately after insertion, forgotten after the decay window
//! passes, bounded in false-positive rate, and refreshable by re-inserting.

use std::sync::Arc;
use timing_bloom_filter::clock::ManualClock;
use timing_bloom_filter::driver::ManualDriver;
use timing_bloom_filter::TimingBloomFilter;

fn manual_filter(capacity: u64, decay_time: f64) -> (TimingBloomFilter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let filter = TimingBloomFilter::with_collaborators(
        capacity,
        decay_time,
        0.005,
        clock.clone(),
        Box::new(ManualDriver::new()),
    )
    .unwrap();
    (filter, clock)
}

#[test]
fn scenario_1_add_and_hit() {
    let (filter, _clock) = manual_filter(500, 4.0);
    filter.add(b"hello");
    assert!(filter.contains(b"hello"));
}

#[test]
fn scenario_2_decay_and_miss_with_running_driver() {
    // The one scenario that exercises the real driver cadence and a real
    // wait, rather than a manually-stepped mock.
    use std::thread;
    use std::time::Duration;
    use timing_bloom_filter::clock::SystemClock;
    use timing_bloom_filter::driver::ThreadDriver;

    let mut filter = TimingBloomFilter::with_collaborators(
        500,
        4.0,
        0.005,
        Arc::new(SystemClock),
        Box::new(ThreadDriver::new()),
    )
    .unwrap();

    filter.add(b"hello");
    assert!(filter.contains(b"hello"));

    filter.start().unwrap();
    thread::sleep(Duration::from_millis(5_200));
    filter.stop().unwrap();

    assert!(!filter.contains(b"hello"));
}

#[test]
fn scenario_3_false_positive_bound() {
    let n = 100_000u64;
    let (filter, _clock) = manual_filter(n, 10.0);

    for i in 0..n {
        filter.add(format!("idx_{i}").as_bytes());
    }
    for i in 0..n {
        assert!(filter.contains(format!("idx_{i}").as_bytes()));
    }

    let mut false_positives = 0u64;
    for i in n..2 * n {
        if filter.contains(format!("idx_{i}").as_bytes()) {
            false_positives += 1;
        }
    }
    assert!(
        false_positives < 500,
        "expected fewer than 500 false positives, got {false_positives}"
    );
}

#[test]
fn scenario_4_refresh_resets_live_window() {
    let (filter, clock) = manual_filter(100, 2.0);
    filter.add(b"x");
    clock.advance(1.5);
    filter.add(b"x");
    clock.advance(1.0);
    assert!(filter.contains(b"x"));
}

#[test]
fn invariant_no_false_negatives_immediately_after_add() {
    let (filter, _clock) = manual_filter(1000, 5.0);
    for i in 0..500 {
        let key = format!("k{i}");
        filter.add(key.as_bytes());
        assert!(filter.contains(key.as_bytes()));
    }
}

#[test]
fn invariant_decay_forgets_keys_past_the_window() {
    let (filter, clock) = manual_filter(1000, 4.0);
    filter.add(b"expiring");
    let seconds_per_tick = 4.0 / 127.0;
    clock.advance(4.0 + seconds_per_tick);
    filter.decay();
    assert!(!filter.contains(b"expiring"));
}

#[test]
fn invariant_num_non_zero_matches_true_cell_count() {
    let (filter, clock) = manual_filter(1000, 6.0);
    for i in 0..200 {
        filter.add(format!("k{i}").as_bytes());
    }
    let size_after_add = filter.size();
    assert!(size_after_add > 0);

    clock.advance(7.0);
    filter.decay();
    assert_eq!(filter.size(), 0);
}

#[test]
fn invariant_serialize_then_deserialize_is_the_identity() {
    let (filter, _clock) = manual_filter(1000, 8.0);
    for i in 0..50 {
        filter.add(format!("k{i}").as_bytes());
    }

    let mut buf = Vec::new();
    filter.to_writer(&mut buf).unwrap();
    let restored = TimingBloomFilter::from_reader(&mut &buf[..]).unwrap();

    assert_eq!(restored.num_cells(), filter.num_cells());
    assert_eq!(restored.num_hashes(), filter.num_hashes());
    assert_eq!(restored.size(), filter.size());
    for i in 0..50 {
        assert!(restored.contains(format!("k{i}").as_bytes()));
    }
}
