//! Sensitivity of the end-to-end run to the tile granularity.

use clue::{gaussian_blobs, Clusterer, Queue};

use crate::harness::{self, BenchResult};

pub fn run(rounds: usize, workers: usize) -> Vec<BenchResult> {
    let threaded = Queue::threaded(workers).ok();
    let mut results = Vec::new();

    for points_per_tile in [32, 128, 512, 2048] {
        let mut points =
            gaussian_blobs::<2>(&[[0.0, 0.0], [30.0, 0.0], [0.0, 30.0]], [2.0, 2.0], 20_000, 77);

        let serial_ms = harness::median_of(rounds, || {
            let mut clusterer = Clusterer::<2>::new(1.5, 10.0)
                .expect("valid benchmark parameters")
                .with_points_per_tile(points_per_tile)
                .expect("positive tile occupancy");
            harness::time_ms(|| {
                clusterer.make_clusters(&Queue::serial(), &mut points).expect("clustering run");
            })
        });

        let threaded_ms = threaded.as_ref().map(|queue| {
            harness::median_of(rounds, || {
                let mut clusterer = Clusterer::<2>::new(1.5, 10.0)
                    .expect("valid benchmark parameters")
                    .with_points_per_tile(points_per_tile)
                    .expect("positive tile occupancy");
                harness::time_ms(|| {
                    clusterer.make_clusters(queue, &mut points).expect("clustering run");
                })
            })
        });

        results.push(BenchResult {
            name: format!("tiles ppt={points_per_tile}"),
            serial_ms,
            threaded_ms,
            gpu_ms: None,
            verified: None,
        });
    }
    results
}
