//! Clustering wall-clock across dataset sizes, one back-end per column.

use clue::{gaussian_blobs, get_clusters, Clusterer, PointsHost, Queue};

use crate::harness::{self, BenchResult};

fn blob_centers(n_blobs: usize) -> Vec<[f32; 2]> {
    (0..n_blobs).map(|b| [20.0 * (b % 4) as f32, 20.0 * (b / 4) as f32]).collect()
}

fn dataset(n_points: usize) -> PointsHost<2> {
    let n_blobs = 8;
    gaussian_blobs::<2>(&blob_centers(n_blobs), [1.0, 1.0], n_points / n_blobs, 0x5eed)
}

fn run_once(queue: &Queue, points: &mut PointsHost<2>) -> f64 {
    let mut clusterer = Clusterer::<2>::new(1.5, 10.0).expect("valid benchmark parameters");
    harness::time_ms(|| {
        clusterer.make_clusters(queue, points).expect("clustering run");
    })
}

pub fn run(rounds: usize, max_power: u32, workers: usize) -> Vec<BenchResult> {
    let threaded = Queue::threaded(workers).ok();
    let gpu = Queue::gpu().ok();
    let mut results = Vec::new();

    for power in 10..=max_power {
        let n_points = 1usize << power;
        let mut points = dataset(n_points);

        let serial_ms = harness::median_of(rounds, || run_once(&Queue::serial(), &mut points));
        let expected = get_clusters(&points).size();

        let threaded_ms = threaded.as_ref().map(|queue| {
            let ms = harness::median_of(rounds, || run_once(queue, &mut points));
            ms
        });
        let verified = threaded.as_ref().map(|_| get_clusters(&points).size() == expected);
        let gpu_ms =
            gpu.as_ref().map(|queue| harness::median_of(rounds, || run_once(queue, &mut points)));

        results.push(BenchResult {
            name: format!("cluster 2^{power}"),
            serial_ms,
            threaded_ms,
            gpu_ms,
            verified,
        });
    }
    results
}
