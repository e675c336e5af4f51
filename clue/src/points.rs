use crate::backend::SharedSlice;
use crate::error::{Error, Result};

/// Largest point rank the library supports; bin arithmetic and the GPU
/// shader specialization are validated against this bound.
pub const MAX_DIM: usize = 10;

/// Host-side structure-of-arrays point store.
///
/// One contiguous float allocation holds the N coordinate columns followed
/// by the weight column; one contiguous int allocation holds the clusterId
/// column followed by the isSeed column, so each result column copies back
/// from a device in a single contiguous transfer. clusterId starts at -1
/// (outlier) and isSeed at 0 until a clustering run fills them in.
pub struct PointsHost<const N: usize> {
    input: Box<[f32]>,
    results: Box<[i32]>,
    n: usize,
}

impl<const N: usize> PointsHost<N> {
    pub fn new(n_points: usize) -> Self {
        let mut results = vec![0i32; 2 * n_points].into_boxed_slice();
        results[..n_points].fill(-1);
        PointsHost { input: vec![0f32; (N + 1) * n_points].into_boxed_slice(), results, n: n_points }
    }

    /// Build a point store from row-wise coordinates and per-point weights.
    pub fn from_points(points: &[[f32; N]], weights: &[f32]) -> Result<Self> {
        if points.len() != weights.len() {
            return Err(Error::InvalidParameter(format!(
                "{} points but {} weights",
                points.len(),
                weights.len()
            )));
        }
        let mut host = Self::new(points.len());
        let n = host.n;
        for (i, point) in points.iter().enumerate() {
            for (dim, &coord) in point.iter().enumerate() {
                host.input[dim * n + i] = coord;
            }
        }
        host.input[N * n..].copy_from_slice(weights);
        Ok(host)
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn coords(&self, dim: usize) -> Result<&[f32]> {
        if dim >= N {
            return Err(Error::DimensionOutOfRange { dim, ndim: N });
        }
        Ok(&self.input[dim * self.n..(dim + 1) * self.n])
    }

    pub fn coords_mut(&mut self, dim: usize) -> Result<&mut [f32]> {
        if dim >= N {
            return Err(Error::DimensionOutOfRange { dim, ndim: N });
        }
        Ok(&mut self.input[dim * self.n..(dim + 1) * self.n])
    }

    pub fn point(&self, index: usize) -> [f32; N] {
        let mut coords = [0f32; N];
        for (dim, coord) in coords.iter_mut().enumerate() {
            *coord = self.input[dim * self.n + index];
        }
        coords
    }

    pub fn weights(&self) -> &[f32] {
        &self.input[N * self.n..]
    }

    pub fn weights_mut(&mut self) -> &mut [f32] {
        &mut self.input[N * self.n..]
    }

    pub fn cluster_indexes(&self) -> &[i32] {
        &self.results[..self.n]
    }

    pub fn is_seed(&self) -> &[i32] {
        &self.results[self.n..]
    }

    /// The full input block (coordinate columns then weights), the layout
    /// the device stores mirror.
    pub(crate) fn input(&self) -> &[f32] {
        &self.input
    }

    pub(crate) fn set_cluster_indexes(&mut self, ids: &[i32]) {
        self.results[..self.n].copy_from_slice(ids);
    }

    pub(crate) fn set_is_seed(&mut self, seeds: &[i32]) {
        self.results[self.n..].copy_from_slice(seeds);
    }
}

/// Device-resident mirror of the point store used by the CPU queues. On top
/// of the input columns it carries the derived columns the pipeline fills:
/// rho, delta, nearest-higher, clusterId and isSeed.
pub struct PointsDevice<const N: usize> {
    pub(crate) input: Box<[f32]>,
    pub(crate) rho: Box<[f32]>,
    pub(crate) delta: Box<[f32]>,
    pub(crate) nearest_higher: Box<[i32]>,
    pub(crate) cluster_index: Box<[i32]>,
    pub(crate) is_seed: Box<[i32]>,
    n: usize,
}

impl<const N: usize> PointsDevice<N> {
    pub fn new(n_points: usize) -> Self {
        PointsDevice {
            input: vec![0f32; (N + 1) * n_points].into_boxed_slice(),
            rho: vec![0f32; n_points].into_boxed_slice(),
            delta: vec![0f32; n_points].into_boxed_slice(),
            nearest_higher: vec![0i32; n_points].into_boxed_slice(),
            cluster_index: vec![0i32; n_points].into_boxed_slice(),
            is_seed: vec![0i32; n_points].into_boxed_slice(),
            n: n_points,
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    /// Grow the columns if `n_points` exceeds the current capacity and set
    /// the active size. Existing contents are not preserved.
    pub fn reset(&mut self, n_points: usize) {
        if (N + 1) * n_points > self.input.len() {
            *self = Self::new(n_points);
            return;
        }
        self.n = n_points;
    }

    pub fn copy_input_from(&mut self, host: &PointsHost<N>) {
        self.reset(host.size());
        let n = self.n;
        // Host and device share the SoA layout: one copy for the whole
        // coordinate block plus weights.
        self.input[..(N + 1) * n].copy_from_slice(host.input());
    }

    pub fn load_input(&mut self, points: &[[f32; N]], weights: &[f32]) -> Result<()> {
        if points.len() != weights.len() {
            return Err(Error::InvalidParameter(format!(
                "{} points but {} weights",
                points.len(),
                weights.len()
            )));
        }
        self.reset(points.len());
        let n = self.n;
        for (i, point) in points.iter().enumerate() {
            for (dim, &coord) in point.iter().enumerate() {
                self.input[dim * n + i] = coord;
            }
        }
        self.input[N * n..(N + 1) * n].copy_from_slice(weights);
        Ok(())
    }

    pub fn coords(&self, dim: usize) -> Result<&[f32]> {
        if dim >= N {
            return Err(Error::DimensionOutOfRange { dim, ndim: N });
        }
        Ok(&self.input[dim * self.n..(dim + 1) * self.n])
    }

    pub fn point(&self, index: usize) -> [f32; N] {
        let mut coords = [0f32; N];
        for (dim, coord) in coords.iter_mut().enumerate() {
            *coord = self.input[dim * self.n + index];
        }
        coords
    }

    pub fn weights(&self) -> &[f32] {
        &self.input[N * self.n..(N + 1) * self.n]
    }

    pub fn rho(&self) -> &[f32] {
        &self.rho[..self.n]
    }

    pub fn delta(&self) -> &[f32] {
        &self.delta[..self.n]
    }

    pub fn nearest_higher(&self) -> &[i32] {
        &self.nearest_higher[..self.n]
    }

    pub fn cluster_indexes(&self) -> &[i32] {
        &self.cluster_index[..self.n]
    }

    pub fn is_seed(&self) -> &[i32] {
        &self.is_seed[..self.n]
    }

    pub(crate) fn view_mut(&mut self) -> PointsView<'_, N> {
        let n = self.n;
        PointsView {
            input: &self.input[..(N + 1) * n],
            rho: SharedSlice::new(&mut self.rho[..n]),
            delta: SharedSlice::new(&mut self.delta[..n]),
            nearest_higher: SharedSlice::new(&mut self.nearest_higher[..n]),
            cluster_index: SharedSlice::new(&mut self.cluster_index[..n]),
            is_seed: SharedSlice::new(&mut self.is_seed[..n]),
            n,
        }
    }
}

/// Raw column view copied by value into kernels. Derived columns are
/// shared-write slices: every kernel invocation writes only slots it owns.
#[derive(Clone, Copy)]
pub(crate) struct PointsView<'a, const N: usize> {
    pub input: &'a [f32],
    pub rho: SharedSlice<'a, f32>,
    pub delta: SharedSlice<'a, f32>,
    pub nearest_higher: SharedSlice<'a, i32>,
    pub cluster_index: SharedSlice<'a, i32>,
    pub is_seed: SharedSlice<'a, i32>,
    pub n: usize,
}

impl<const N: usize> PointsView<'_, N> {
    #[inline]
    pub fn point(&self, index: usize) -> [f32; N] {
        let mut coords = [0f32; N];
        for (dim, coord) in coords.iter_mut().enumerate() {
            *coord = self.input[dim * self.n + index];
        }
        coords
    }

    #[inline]
    pub fn weight(&self, index: usize) -> f32 {
        self.input[N * self.n + index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soa_layout_round_trip() {
        let points = [[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let weights = [0.5f32, 1.0, 1.5];
        let host = PointsHost::<2>::from_points(&points, &weights).unwrap();
        assert_eq!(host.size(), 3);
        assert_eq!(host.coords(0).unwrap(), &[1.0, 3.0, 5.0]);
        assert_eq!(host.coords(1).unwrap(), &[2.0, 4.0, 6.0]);
        assert_eq!(host.weights(), &weights);
        assert_eq!(host.point(1), [3.0, 4.0]);
    }

    #[test]
    fn test_results_start_as_outliers() {
        let host = PointsHost::<2>::new(4);
        assert!(host.cluster_indexes().iter().all(|&id| id == -1));
        assert!(host.is_seed().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_dimension_out_of_range() {
        let host = PointsHost::<2>::new(1);
        assert!(matches!(
            host.coords(2),
            Err(Error::DimensionOutOfRange { dim: 2, ndim: 2 })
        ));
    }

    #[test]
    fn test_device_mirror_copy() {
        let points = [[1.0f32, 2.0], [3.0, 4.0]];
        let host = PointsHost::<2>::from_points(&points, &[1.0, 1.0]).unwrap();
        let mut device = PointsDevice::<2>::new(2);
        device.copy_input_from(&host);
        assert_eq!(device.coords(0).unwrap(), host.coords(0).unwrap());
        assert_eq!(device.weights(), host.weights());
    }

    #[test]
    fn test_device_reset_grows_only_when_needed() {
        let mut device = PointsDevice::<2>::new(16);
        device.reset(8);
        assert_eq!(device.size(), 8);
        assert_eq!(device.input.len(), 3 * 16);
        device.reset(32);
        assert_eq!(device.size(), 32);
        assert_eq!(device.input.len(), 3 * 32);
    }

    #[test]
    fn test_empty_point_set_is_constructible() {
        let host = PointsHost::<3>::new(0);
        assert_eq!(host.size(), 0);
        assert!(host.weights().is_empty());
    }
}
