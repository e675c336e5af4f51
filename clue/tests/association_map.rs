use clue::{
    gaussian_blobs, make_associator, AssociationMap, PointsDevice, Queue, Tiles,
};

#[test]
fn test_binary_association_map() {
    let size = 1000usize;
    let keys: Vec<i32> = (0..size).map(|i| (i % 2 == 0) as i32).collect();
    let mut map = AssociationMap::new(size, 2);
    map.fill_from_keys(&keys, &Queue::serial(), 256);

    assert_eq!(map.size(), 2);
    assert_eq!(map.extents().keys, 2);
    assert_eq!(map.extents().values, size);
    assert!(map.contains(0));
    assert!(map.contains(1));
    assert_eq!(map.count(0), size / 2);
    assert_eq!(map.count(1), size / 2);
    assert_eq!(map.len(), size);
    assert!(map.indexes(0).iter().all(|&i| i % 2 == 0));
    assert!(map.indexes(1).iter().all(|&i| i % 2 == 1));
}

#[test]
fn test_make_associator_drops_outliers() {
    let ids = [0, 1, -1, 1, 0, -1, 2];
    let map = make_associator(&ids, 3);
    assert_eq!(map.size(), 3);
    assert_eq!(map.len(), 5);
    assert_eq!(map.indexes(1), &[1, 3]);
    assert_eq!(map.indexes(2), &[6]);
}

/// Every point lands in exactly one tile: bin counts sum to the point
/// count, on both CPU queues.
#[test]
fn test_tile_counts_sum_to_n_points() {
    let host = gaussian_blobs::<2>(&[[0.0, 0.0], [15.0, 5.0], [-10.0, 20.0]], [2.0, 2.0], 500, 21);
    let mut coords = Vec::new();
    for i in 0..host.size() {
        coords.push(host.point(i));
    }
    let mut device = PointsDevice::<2>::new(host.size());
    device.load_input(&coords, host.weights()).unwrap();

    for queue in [Queue::serial(), Queue::threaded(4).unwrap()] {
        let mut tiles = Tiles::<2>::new(device.size(), 16, 4);
        tiles.compute_geometry(&device, [false, false]);
        tiles.fill(&device, &queue, 256);

        let total: usize = (0..tiles.size()).map(|bin| tiles.count(bin)).sum();
        assert_eq!(total, device.size());

        let view = tiles.view();
        for bin in 0..tiles.size() {
            for &point in view.points_in(bin as i32) {
                let bin_of_point = view.geometry.global_bin(&device.point(point as usize));
                assert_eq!(bin_of_point, bin as i32);
            }
        }
    }
}

/// Offsets are monotone, start at zero and end at the number of kept
/// values.
#[test]
fn test_offsets_shape() {
    let keys: Vec<i32> = (0..512).map(|i| (i % 7) as i32).collect();
    let mut map = AssociationMap::new(keys.len(), 7);
    map.fill_from_keys(&keys, &Queue::threaded(2).unwrap(), 64);

    let offsets = map.offsets();
    assert_eq!(offsets[0], 0);
    assert_eq!(offsets[7] as usize, keys.len());
    assert!(offsets.windows(2).all(|pair| pair[0] <= pair[1]));
}
