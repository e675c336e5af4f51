//! GPU queue tests. Every test returns early when no adapter is present,
//! so the suite passes on machines without a GPU.

use std::collections::HashMap;

use clue::{gaussian_blobs, get_clusters, uniform_ring, Clusterer, PointsHost, Queue};

fn gpu_queue() -> Option<Queue> {
    match Queue::gpu() {
        Ok(queue) => Some(queue),
        Err(_) => {
            eprintln!("no GPU adapter, skipping");
            None
        }
    }
}

/// clusterIds may be permuted between back-ends; compare the partitions.
fn same_partition(a: &PointsHost<2>, b: &PointsHost<2>) -> bool {
    let (ids_a, ids_b) = (a.cluster_indexes(), b.cluster_indexes());
    let mut forward: HashMap<i32, i32> = HashMap::new();
    let mut backward: HashMap<i32, i32> = HashMap::new();
    for (&x, &y) in ids_a.iter().zip(ids_b) {
        if (x == -1) != (y == -1) {
            return false;
        }
        if x == -1 {
            continue;
        }
        if *forward.entry(x).or_insert(y) != y || *backward.entry(y).or_insert(x) != x {
            return false;
        }
    }
    true
}

#[test]
fn test_gpu_matches_serial_on_blobs() {
    let Some(gpu) = gpu_queue() else { return };

    let build = || gaussian_blobs::<2>(&[[0.0, 0.0], [20.0, 0.0]], [1.0, 1.0], 500, 42);
    let mut on_gpu = build();
    let mut on_cpu = build();

    let mut clusterer = Clusterer::<2>::new(1.5, 10.0).unwrap().with_dm(2.25).unwrap();
    clusterer.make_clusters(&gpu, &mut on_gpu).unwrap();
    let mut clusterer = Clusterer::<2>::new(1.5, 10.0).unwrap().with_dm(2.25).unwrap();
    clusterer.make_clusters(&Queue::serial(), &mut on_cpu).unwrap();

    assert_eq!(on_gpu.is_seed(), on_cpu.is_seed());
    assert!(same_partition(&on_gpu, &on_cpu));
    assert_eq!(get_clusters(&on_gpu).size(), 2);
}

#[test]
fn test_gpu_ring_single_cluster() {
    let Some(gpu) = gpu_queue() else { return };

    let mut points = uniform_ring(1000, 1.0);
    let mut clusterer = Clusterer::<2>::new(0.2, 20.0).unwrap().with_dm(0.5).unwrap();
    clusterer.make_clusters(&gpu, &mut points).unwrap();

    assert_eq!(get_clusters(&points).size(), 1);
    assert_eq!(points.is_seed().iter().sum::<i32>(), 1);
    assert_eq!(points.is_seed()[999], 1);
}

#[test]
fn test_gpu_reuse_across_sizes() {
    let Some(gpu) = gpu_queue() else { return };

    let mut clusterer = Clusterer::<2>::new(1.5, 1.0).unwrap().with_dm(5.0).unwrap();
    let mut big = gaussian_blobs::<2>(&[[0.0, 0.0], [30.0, 0.0]], [1.0, 1.0], 400, 5);
    clusterer.make_clusters(&gpu, &mut big).unwrap();

    let mut small = PointsHost::<2>::from_points(
        &[[0.0, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]],
        &[1.0; 4],
    )
    .unwrap();
    clusterer.make_clusters(&gpu, &mut small).unwrap();
    assert_eq!(small.is_seed(), &[0, 1, 0, 1]);
    assert!(same_partition(&small, &{
        let mut expected = PointsHost::<2>::from_points(
            &[[0.0, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]],
            &[1.0; 4],
        )
        .unwrap();
        let mut fresh = Clusterer::<2>::new(1.5, 1.0).unwrap().with_dm(5.0).unwrap();
        fresh.make_clusters(&Queue::serial(), &mut expected).unwrap();
        expected
    }));
}

#[test]
fn test_gpu_rejects_host_only_kernels() {
    let Some(gpu) = gpu_queue() else { return };

    let mut points = PointsHost::<2>::from_points(&[[0.0, 0.0]], &[1.0]).unwrap();
    let mut clusterer = Clusterer::<2>::new(1.0, 1.0).unwrap();
    let kernel = clue::CustomKernel::new(|r, i, j| if i == j { 1.0 } else { 1.0 / (1.0 + r) });
    let err = clusterer
        .make_clusters_with(&gpu, &mut points, &kernel, &clue::Euclidean, 256)
        .unwrap_err();
    assert!(matches!(err, clue::Error::InvalidParameter(_)));
}
