//! Association-map build microbenchmark: keys, count, scan, scatter.

use clue::{AssociationMap, Queue};

use crate::harness::{self, BenchResult};

fn keys(n: usize, nbins: usize) -> Vec<i32> {
    // Cheap xorshift spread; the build cost does not depend on key order.
    let mut state = 0x2545f4914f6cdd1du64;
    (0..n)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % nbins as u64) as i32
        })
        .collect()
}

pub fn run(rounds: usize, workers: usize) -> Vec<BenchResult> {
    let threaded = Queue::threaded(workers).ok();
    let mut results = Vec::new();

    for power in [14u32, 17, 20] {
        let n = 1usize << power;
        let nbins = n / 128;
        let keys = keys(n, nbins);
        let mut map = AssociationMap::new(n, nbins);

        let serial_ms = harness::median_of(rounds, || {
            map.reset(n, nbins);
            harness::time_ms(|| map.fill_from_keys(&keys, &Queue::serial(), 512))
        });
        let expected = map.len();

        let threaded_ms = threaded.as_ref().map(|queue| {
            harness::median_of(rounds, || {
                map.reset(n, nbins);
                harness::time_ms(|| map.fill_from_keys(&keys, queue, 512))
            })
        });
        let verified = threaded.as_ref().map(|_| map.len() == expected && expected == n);

        results.push(BenchResult {
            name: format!("associator 2^{power}"),
            serial_ms,
            threaded_ms,
            gpu_ms: None,
            verified,
        });
    }
    results
}
