use portable_atomic::{AtomicI32, Ordering};
use tracing::debug;

use crate::backend::{Queue, SharedSlice};
use crate::scan::exclusive_scan_into;

/// Extents of the underlying buffers: number of key bins and capacity of
/// the value store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extents {
    pub keys: usize,
    pub values: usize,
}

/// Compressed-sparse-row map from integer keys to runs of integer values.
///
/// `offsets` has `nbins + 1` entries, is non-decreasing and starts at zero;
/// the values of bin `k` live in `values[offsets[k]..offsets[k + 1]]`. The
/// map is built in bulk by `fill_with`/`fill_from_keys`: per-item key
/// computation, atomic per-bin counting, a multi-block exclusive prefix
/// scan and an atomic scatter. Items with a negative key are dropped.
pub struct AssociationMap {
    values: Box<[i32]>,
    offsets: Box<[i32]>,
    nbins: usize,
}

impl AssociationMap {
    pub fn new(nelements: usize, nbins: usize) -> Self {
        AssociationMap {
            values: vec![0i32; nelements].into_boxed_slice(),
            offsets: vec![0i32; nbins + 1].into_boxed_slice(),
            nbins,
        }
    }

    /// Number of key bins.
    pub fn size(&self) -> usize {
        self.nbins
    }

    pub fn extents(&self) -> Extents {
        Extents { keys: self.nbins, values: self.values.len() }
    }

    /// Number of values filled in by the last build.
    pub fn len(&self) -> usize {
        self.offsets[self.nbins] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, key: usize) -> usize {
        (self.offsets[key + 1] - self.offsets[key]) as usize
    }

    pub fn contains(&self, key: usize) -> bool {
        self.offsets[key + 1] > self.offsets[key]
    }

    /// The values associated with `key`.
    pub fn indexes(&self, key: usize) -> &[i32] {
        &self.values[self.offsets[key] as usize..self.offsets[key + 1] as usize]
    }

    pub fn offsets(&self) -> &[i32] {
        &self.offsets
    }

    pub fn view(&self) -> AssociationMapView<'_> {
        AssociationMapView { values: &self.values, offsets: &self.offsets }
    }

    /// Grow (never shrink) the buffers and clear the offsets. Reallocation
    /// only happens when the requested extents exceed the current ones.
    pub fn reset(&mut self, nelements: usize, nbins: usize) {
        if nelements > self.values.len() {
            self.values = vec![0i32; nelements].into_boxed_slice();
        }
        if nbins + 1 > self.offsets.len() {
            self.offsets = vec![0i32; nbins + 1].into_boxed_slice();
        } else {
            self.offsets[..=nbins].fill(0);
        }
        self.nbins = nbins;
    }

    /// Bulk build: `key_of(i)` yields the bin of item `i`, or a negative
    /// key to drop it. A map with zero bins or zero capacity is left empty.
    pub fn fill_with<F>(&mut self, size: usize, key_of: F, queue: &Queue, block_size: usize)
    where
        F: Fn(usize) -> i32 + Sync + Send,
    {
        if self.nbins == 0 || self.values.is_empty() || size == 0 {
            return;
        }
        let bins = queue.map_indices(size, block_size, key_of);
        self.build(&bins, queue, block_size);
    }

    /// Bulk build from precomputed keys.
    pub fn fill_from_keys(&mut self, keys: &[i32], queue: &Queue, block_size: usize) {
        if self.nbins == 0 || self.values.is_empty() || keys.is_empty() {
            return;
        }
        self.build(keys, queue, block_size);
    }

    fn build(&mut self, bins: &[i32], queue: &Queue, block_size: usize) {
        let nbins = self.nbins;
        debug!(items = bins.len(), nbins, "building association map");

        // Count per-bin occupancy.
        let sizes: Vec<AtomicI32> = (0..nbins).map(|_| AtomicI32::new(0)).collect();
        queue.for_each(bins.len(), block_size, |i| {
            let bin = bins[i];
            if bin >= 0 {
                sizes[bin as usize].fetch_add(1, Ordering::Relaxed);
            }
        });
        let sizes: Vec<i32> = sizes.into_iter().map(|s| s.into_inner()).collect();

        // Offsets from the multi-block exclusive scan.
        exclusive_scan_into(queue, &sizes, &mut self.offsets[..=nbins]);

        // Scatter: bump a per-bin cursor to claim a slot for each item.
        let cursors: Vec<AtomicI32> =
            self.offsets[..nbins].iter().map(|&o| AtomicI32::new(o)).collect();
        let values = SharedSlice::new(&mut self.values);
        queue.for_each(bins.len(), block_size, |i| {
            let bin = bins[i];
            if bin >= 0 {
                let slot = cursors[bin as usize].fetch_add(1, Ordering::Relaxed);
                values.set(slot as usize, i as i32);
            }
        });
    }
}

/// Borrowed view copied into kernels; owns nothing.
#[derive(Clone, Copy)]
pub struct AssociationMapView<'a> {
    pub(crate) values: &'a [i32],
    pub(crate) offsets: &'a [i32],
}

impl AssociationMapView<'_> {
    #[inline]
    pub fn indexes(&self, bin: usize) -> &[i32] {
        &self.values[self.offsets[bin] as usize..self.offsets[bin + 1] as usize]
    }

    #[inline]
    pub fn count(&self, bin: usize) -> usize {
        (self.offsets[bin + 1] - self.offsets[bin]) as usize
    }
}

/// Build a host-side association map from a key per element (used to turn
/// the clusterId column into clusterId -> point indices).
pub fn make_associator(keys: &[i32], nbins: usize) -> AssociationMap {
    let mut map = AssociationMap::new(keys.len(), nbins);
    map.fill_from_keys(keys, &Queue::serial(), keys.len().max(1));
    map
}

/// The followers map: nearest-higher index -> the points that follow it.
/// Seeds and disconnected outliers carry nh = -1 and do not appear.
pub struct Followers {
    assoc: AssociationMap,
}

impl Followers {
    pub fn new(npoints: usize) -> Self {
        Followers { assoc: AssociationMap::new(npoints, npoints) }
    }

    pub fn reset(&mut self, npoints: usize) {
        self.assoc.reset(npoints, npoints);
    }

    pub fn fill(&mut self, nearest_higher: &[i32], queue: &Queue, block_size: usize) {
        self.assoc.fill_from_keys(nearest_higher, queue, block_size);
    }

    pub fn extents(&self) -> Extents {
        self.assoc.extents()
    }

    pub fn view(&self) -> AssociationMapView<'_> {
        self.assoc.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_bins_is_noop() {
        let mut map = AssociationMap::new(0, 0);
        map.fill_from_keys(&[], &Queue::serial(), 256);
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn test_negative_keys_dropped() {
        let keys = [0, -1, 1, -1, 0, 1, 1];
        let mut map = AssociationMap::new(keys.len(), 2);
        map.fill_from_keys(&keys, &Queue::serial(), 256);
        assert_eq!(map.len(), 5);
        assert_eq!(map.count(0), 2);
        assert_eq!(map.count(1), 3);
        assert_eq!(map.indexes(0), &[0, 4]);
        assert_eq!(map.indexes(1), &[2, 5, 6]);
    }

    #[test]
    fn test_fill_with_closure_keys() {
        let mut map = AssociationMap::new(1000, 2);
        map.fill_with(1000, |i| (i % 2 == 0) as i32, &Queue::serial(), 256);
        assert_eq!(map.count(0), 500);
        assert_eq!(map.count(1), 500);
        assert_eq!(map.extents(), Extents { keys: 2, values: 1000 });
    }

    #[test]
    fn test_threaded_build_is_a_permutation() {
        let queue = Queue::threaded(4).unwrap();
        let keys: Vec<i32> = (0..5000).map(|i| (i % 13) as i32).collect();
        let mut map = AssociationMap::new(keys.len(), 13);
        map.fill_from_keys(&keys, &queue, 256);

        let total: usize = (0..13).map(|b| map.count(b)).sum();
        assert_eq!(total, keys.len());
        for bin in 0..13 {
            let mut members = map.indexes(bin).to_vec();
            members.sort_unstable();
            assert!(members.iter().all(|&i| keys[i as usize] == bin as i32));
            members.dedup();
            assert_eq!(members.len(), map.count(bin));
        }
    }

    #[test]
    fn test_reset_reuses_capacity() {
        let mut map = AssociationMap::new(100, 10);
        map.fill_with(100, |i| (i % 10) as i32, &Queue::serial(), 256);
        map.reset(50, 5);
        assert_eq!(map.size(), 5);
        assert_eq!(map.len(), 0);
        map.fill_with(50, |i| (i % 5) as i32, &Queue::serial(), 256);
        assert_eq!(map.len(), 50);
    }
}
