use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, info, info_span};

use crate::assoc::{make_associator, AssociationMap, AssociationMapView, Followers};
use crate::backend::Queue;
use crate::error::{Error, Result};
use crate::gpu;
use crate::kernels::{ConvolutionalKernel, FlatKernel};
use crate::metrics::{DistanceMetric, DistanceParameter, Euclidean};
use crate::points::{PointsDevice, PointsHost, PointsView, MAX_DIM};
use crate::tiles::{for_each_bin_in_box, SearchBoxExtremes, Tiles, TilesView};
use crate::vecarray::{SeedArray, SeedArrayView, VecArray};

pub const DEFAULT_BLOCK_SIZE: usize = 256;
pub const DEFAULT_POINTS_PER_TILE: i32 = 128;

/// Depth of the per-seed propagation stack. Overflow is detected and
/// surfaced as `Error::ClusterPropagationOverflow`.
const PROPAGATION_STACK: usize = 256;

/// Orchestrates the four clustering stages over a device work queue and
/// owns the tile index, the followers map and the seed array between runs.
/// Internal structures are reallocated only when a run needs more capacity
/// than the previous one.
pub struct Clusterer<const N: usize> {
    dc: DistanceParameter<N>,
    rhoc: f32,
    dm: DistanceParameter<N>,
    seed_dc: DistanceParameter<N>,
    points_per_tile: i32,
    wrapped: [bool; N],
    tiles: Option<Tiles<N>>,
    followers: Option<Followers>,
    seeds: Option<SeedArray>,
    scratch: Option<PointsDevice<N>>,
    gpu: Option<gpu::GpuState>,
    seed_candidates: usize,
}

impl<const N: usize> Clusterer<N> {
    /// New clusterer with `dm = seed_dc = dc` and the default tile
    /// granularity. `dc` is a scalar or a per-dimension array.
    pub fn new(dc: impl Into<DistanceParameter<N>>, rhoc: f32) -> Result<Self> {
        if N == 0 || N > MAX_DIM {
            return Err(Error::DimensionOutOfRange { dim: N, ndim: MAX_DIM });
        }
        let dc = dc.into();
        if !dc.is_positive() || rhoc <= 0.0 {
            return Err(Error::InvalidParameter(
                "dc and rhoc must be positive".into(),
            ));
        }
        Ok(Clusterer {
            dc,
            rhoc,
            dm: dc,
            seed_dc: dc,
            points_per_tile: DEFAULT_POINTS_PER_TILE,
            wrapped: [false; N],
            tiles: None,
            followers: None,
            seeds: None,
            scratch: None,
            gpu: None,
            seed_candidates: 0,
        })
    }

    pub fn with_dm(mut self, dm: impl Into<DistanceParameter<N>>) -> Result<Self> {
        let dm = dm.into();
        if !dm.is_positive() {
            return Err(Error::InvalidParameter("dm must be positive".into()));
        }
        self.dm = dm;
        Ok(self)
    }

    pub fn with_seed_dc(mut self, seed_dc: impl Into<DistanceParameter<N>>) -> Result<Self> {
        let seed_dc = seed_dc.into();
        if !seed_dc.is_positive() {
            return Err(Error::InvalidParameter("seed_dc must be positive".into()));
        }
        self.seed_dc = seed_dc;
        Ok(self)
    }

    pub fn with_points_per_tile(mut self, points_per_tile: i32) -> Result<Self> {
        if points_per_tile <= 0 {
            return Err(Error::InvalidParameter("points_per_tile must be positive".into()));
        }
        self.points_per_tile = points_per_tile;
        Ok(self)
    }

    /// Replace the whole parameter set. `dm` and `seed_dc` fall back to
    /// `dc` when `None`.
    pub fn set_parameters(
        &mut self,
        dc: impl Into<DistanceParameter<N>>,
        rhoc: f32,
        dm: Option<DistanceParameter<N>>,
        seed_dc: Option<DistanceParameter<N>>,
        points_per_tile: i32,
    ) -> Result<()> {
        let dc = dc.into();
        if !dc.is_positive() || rhoc <= 0.0 || points_per_tile <= 0 {
            return Err(Error::InvalidParameter(
                "dc, rhoc and points_per_tile must be positive".into(),
            ));
        }
        if let Some(dm) = &dm {
            if !dm.is_positive() {
                return Err(Error::InvalidParameter("dm must be positive".into()));
            }
        }
        if let Some(seed_dc) = &seed_dc {
            if !seed_dc.is_positive() {
                return Err(Error::InvalidParameter("seed_dc must be positive".into()));
            }
        }
        self.dc = dc;
        self.rhoc = rhoc;
        self.dm = dm.unwrap_or(dc);
        self.seed_dc = seed_dc.unwrap_or(dc);
        self.points_per_tile = points_per_tile;
        Ok(())
    }

    /// Build a clusterer from the plain parameter set used by the
    /// applications. Distance vectors of length one broadcast to all
    /// dimensions.
    pub fn from_params(params: &clue_types::ClusterParams) -> Result<Self> {
        let dc = parameter_from_vec::<N>(&params.dc, "dc")?;
        let mut clusterer = Clusterer::new(dc, params.rhoc)?
            .with_points_per_tile(params.points_per_tile)?;
        if let Some(dm) = &params.dm {
            clusterer = clusterer.with_dm(parameter_from_vec::<N>(dm, "dm")?)?;
        }
        if let Some(seed_dc) = &params.seed_dc {
            clusterer = clusterer.with_seed_dc(parameter_from_vec::<N>(seed_dc, "seed_dc")?)?;
        }
        if !params.wrapped.is_empty() {
            if params.wrapped.len() != N {
                return Err(Error::InvalidParameter(format!(
                    "{} wrap flags for {} dimensions",
                    params.wrapped.len(),
                    N
                )));
            }
            let mut wrapped = [false; N];
            wrapped.copy_from_slice(&params.wrapped);
            clusterer.set_wrapped_coordinates(wrapped);
        }
        Ok(clusterer)
    }

    /// Mark coordinate axes as topologically circular; bin lookups and
    /// distances along them are computed modulo the data range.
    pub fn set_wrapped_coordinates(&mut self, wrapped: [bool; N]) {
        self.wrapped = wrapped;
    }

    /// Number of points that finished stage S3 without a higher-density
    /// neighbour in range during the last run.
    pub fn seed_candidates(&self) -> usize {
        self.seed_candidates
    }

    /// Cluster with the default flat kernel, Euclidean metric and block
    /// size, copying results back into `points`.
    pub fn make_clusters(&mut self, queue: &Queue, points: &mut PointsHost<N>) -> Result<()> {
        self.make_clusters_with(queue, points, &FlatKernel::new(0.5), &Euclidean, DEFAULT_BLOCK_SIZE)
    }

    pub fn make_clusters_with<K, M>(
        &mut self,
        queue: &Queue,
        points: &mut PointsHost<N>,
        kernel: &K,
        metric: &M,
        block_size: usize,
    ) -> Result<()>
    where
        K: ConvolutionalKernel,
        M: DistanceMetric<N>,
    {
        if block_size == 0 {
            return Err(Error::InvalidParameter("block_size must be positive".into()));
        }
        let n_points = points.size();
        let _span = info_span!("make_clusters", n_points, block_size).entered();
        if n_points == 0 {
            return Ok(());
        }

        if let Queue::Gpu(gpu_queue) = queue {
            let state = self.gpu.get_or_insert_with(gpu::GpuState::default);
            let run = gpu::GpuRun {
                dc: self.dc,
                dm: self.dm,
                seed_dc: self.seed_dc,
                rhoc: self.rhoc,
                wrapped: self.wrapped,
                points_per_tile: self.points_per_tile,
                block_size,
            };
            let outcome = gpu::make_clusters(gpu_queue, state, points, kernel, metric, &run)?;
            self.seed_candidates = outcome.seed_candidates;
            info!(n_points, seeds = outcome.n_seeds, "clustering done");
            return Ok(());
        }

        let mut scratch =
            self.scratch.take().unwrap_or_else(|| PointsDevice::new(n_points));
        scratch.copy_input_from(points);
        let result = self.run_cpu(queue, &mut scratch, kernel, metric, block_size);
        if result.is_ok() {
            points.set_cluster_indexes(scratch.cluster_indexes());
            points.set_is_seed(scratch.is_seed());
        }
        self.scratch = Some(scratch);
        result
    }

    /// Run the pipeline on a caller-owned device point store (CPU queues).
    /// Inputs must already be loaded; results stay in the device columns.
    pub fn make_clusters_device<K, M>(
        &mut self,
        queue: &Queue,
        points: &mut PointsDevice<N>,
        kernel: &K,
        metric: &M,
        block_size: usize,
    ) -> Result<()>
    where
        K: ConvolutionalKernel,
        M: DistanceMetric<N>,
    {
        if block_size == 0 {
            return Err(Error::InvalidParameter("block_size must be positive".into()));
        }
        if queue.is_gpu() {
            return Err(Error::InvalidParameter(
                "device point stores are CPU-resident; cluster host points on the GPU queue".into(),
            ));
        }
        if points.size() == 0 {
            return Ok(());
        }
        self.run_cpu(queue, points, kernel, metric, block_size)
    }

    fn run_cpu<K, M>(
        &mut self,
        queue: &Queue,
        points: &mut PointsDevice<N>,
        kernel: &K,
        metric: &M,
        block_size: usize,
    ) -> Result<()>
    where
        K: ConvolutionalKernel,
        M: DistanceMetric<N>,
    {
        let n_points = points.size();
        let (n_tiles, n_per_dim) = tile_grid::<N>(n_points, self.points_per_tile)?;

        let tiles = self.tiles.get_or_insert_with(|| Tiles::new(n_points, n_tiles, n_per_dim));
        tiles.reset(n_points, n_tiles, n_per_dim);
        tiles.compute_geometry(points, self.wrapped);
        tiles.fill(points, queue, block_size);
        debug!(n_tiles, n_per_dim, "tile fill complete");

        let followers = self.followers.get_or_insert_with(|| Followers::new(n_points));
        followers.reset(n_points);
        let seeds = self.seeds.get_or_insert_with(|| SeedArray::new(n_points));
        seeds.reset(n_points);

        let seed_candidates = AtomicUsize::new(0);
        let overflow = AtomicBool::new(false);
        {
            let tiles_view = tiles.view();
            let points_view = points.view_mut();
            calculate_local_density(queue, block_size, &tiles_view, &points_view, kernel, &self.dc, metric);
            debug!("local density complete");
            calculate_nearest_higher(
                queue,
                block_size,
                &tiles_view,
                &points_view,
                &self.dm,
                metric,
                &seed_candidates,
            );
            debug!("nearest higher complete");
            find_cluster_seeds(queue, block_size, &points_view, &self.seed_dc, self.rhoc, seeds.view());
        }
        self.seed_candidates = seed_candidates.load(Ordering::Relaxed);

        // Seed indices in ascending order give every back-end the same
        // clusterId labelling regardless of push interleaving.
        seeds.sort();
        followers.fill(points.nearest_higher(), queue, block_size);
        {
            let points_view = points.view_mut();
            assign_clusters(queue, block_size, seeds, followers.view(), &points_view, &overflow);
        }
        if overflow.load(Ordering::Relaxed) {
            return Err(Error::ClusterPropagationOverflow);
        }
        info!(n_points, seeds = seeds.len(), "clustering done");
        Ok(())
    }
}

fn parameter_from_vec<const N: usize>(values: &[f32], name: &str) -> Result<DistanceParameter<N>> {
    match values {
        [single] => Ok(DistanceParameter::uniform(*single)),
        full if full.len() == N => {
            let mut per_dim = [0f32; N];
            per_dim.copy_from_slice(full);
            Ok(DistanceParameter::per_dim(per_dim))
        }
        other => Err(Error::InvalidParameter(format!(
            "{name} has {} entries for {} dimensions",
            other.len(),
            N
        ))),
    }
}

/// Grid shape for a run: total tile count and tiles per dimension.
pub(crate) fn tile_grid<const N: usize>(
    n_points: usize,
    points_per_tile: i32,
) -> Result<(usize, i32)> {
    let n_tiles = (n_points as f64 / points_per_tile as f64).ceil().max(1.0);
    let n_per_dim = (n_tiles.powf(1.0 / N as f64).ceil() as i64).max(1);
    let total = n_per_dim
        .checked_pow(N as u32)
        .filter(|&t| t <= i32::MAX as i64)
        .ok_or(Error::TileOverflow { n_tiles: n_per_dim.saturating_pow(N as u32) })?;
    Ok((total as usize, n_per_dim as i32))
}

/// Stage S2: accumulate the weighted density of every point over its
/// search box.
fn calculate_local_density<const N: usize, K, M>(
    queue: &Queue,
    block_size: usize,
    tiles: &TilesView<'_, N>,
    points: &PointsView<'_, N>,
    kernel: &K,
    dc: &DistanceParameter<N>,
    metric: &M,
) where
    K: ConvolutionalKernel,
    M: DistanceMetric<N>,
{
    let geometry = tiles.geometry;
    queue.for_each(points.n, block_size, |i| {
        let coords_i = points.point(i);
        let mut extremes: SearchBoxExtremes<N> = [[0f32; 2]; N];
        for dim in 0..N {
            extremes[dim] = [coords_i[dim] - dc.get(dim), coords_i[dim] + dc.get(dim)];
        }
        let search_box = geometry.search_box(&extremes);

        let mut rho_i = 0f32;
        for_each_bin_in_box(&search_box, |bins| {
            let bin = geometry.global_bin_from_bins(bins);
            for &j in tiles.points_in(bin) {
                let coords_j = points.point(j as usize);
                let dvec = geometry.distance_vector(&coords_i, &coords_j);
                let r = metric.reduce(&dvec);
                if dc.covers(r) {
                    rho_i += kernel.weight(r, i as i32, j) * points.weight(j as usize);
                }
            }
        });
        points.rho.set(i, rho_i);
    });
}

/// Stage S3: find each point's nearest neighbour of higher density within
/// `dm`. Ties on density go to the larger index, ties on distance to the
/// smaller one; both rules are what keeps results stable across back-ends.
fn calculate_nearest_higher<const N: usize, M>(
    queue: &Queue,
    block_size: usize,
    tiles: &TilesView<'_, N>,
    points: &PointsView<'_, N>,
    dm: &DistanceParameter<N>,
    metric: &M,
    seed_candidates: &AtomicUsize,
) where
    M: DistanceMetric<N>,
{
    let geometry = tiles.geometry;
    queue.for_each(points.n, block_size, |i| {
        let coords_i = points.point(i);
        let rho_i = points.rho.get(i);
        let mut extremes: SearchBoxExtremes<N> = [[0f32; 2]; N];
        for dim in 0..N {
            extremes[dim] = [coords_i[dim] - dm.get(dim), coords_i[dim] + dm.get(dim)];
        }
        let search_box = geometry.search_box(&extremes);

        let mut delta_i = f32::INFINITY;
        let mut nh_i = -1i32;
        for_each_bin_in_box(&search_box, |bins| {
            let bin = geometry.global_bin_from_bins(bins);
            for &j in tiles.points_in(bin) {
                let rho_j = points.rho.get(j as usize);
                let found_higher =
                    rho_j > rho_i || (rho_j == rho_i && rho_j > 0.0 && j > i as i32);
                if !found_higher {
                    continue;
                }
                let coords_j = points.point(j as usize);
                let dvec = geometry.distance_vector(&coords_i, &coords_j);
                let r = metric.reduce(&dvec);
                if dm.covers(r) && (r < delta_i || (r == delta_i && j < nh_i)) {
                    delta_i = r;
                    nh_i = j;
                }
            }
        });
        points.delta.set(i, delta_i);
        points.nearest_higher.set(i, nh_i);
        if nh_i == -1 {
            seed_candidates.fetch_add(1, Ordering::Relaxed);
        }
    });
}

/// Stage S4, seed marking: promote points whose delta exceeds seed_dc and
/// whose density reaches rhoc; seeds forget their nearest higher so they
/// never inherit a cluster.
fn find_cluster_seeds<const N: usize>(
    queue: &Queue,
    block_size: usize,
    points: &PointsView<'_, N>,
    seed_dc: &DistanceParameter<N>,
    rhoc: f32,
    seeds: SeedArrayView<'_>,
) {
    queue.for_each(points.n, block_size, |i| {
        points.cluster_index.set(i, -1);
        let rho_i = points.rho.get(i);
        let delta_i = points.delta.get(i);
        if seed_dc.exceeded_by(delta_i) && rho_i >= rhoc {
            points.is_seed.set(i, 1);
            points.nearest_higher.set(i, -1);
            seeds.push_back(i as i32);
        } else {
            points.is_seed.set(i, 0);
        }
    });
}

/// Stage S4, assignment: one worker per seed walks its follower tree with
/// a bounded local stack. Trees of distinct seeds are disjoint, so the
/// clusterId writes never collide.
fn assign_clusters<const N: usize>(
    queue: &Queue,
    block_size: usize,
    seeds: &SeedArray,
    followers: AssociationMapView<'_>,
    points: &PointsView<'_, N>,
    overflow: &AtomicBool,
) {
    let seed_ids = seeds.as_slice();
    queue.for_each(seed_ids.len(), block_size, |cluster_id| {
        let seed = seed_ids[cluster_id];
        points.cluster_index.set(seed as usize, cluster_id as i32);

        let mut stack = VecArray::<i32, PROPAGATION_STACK>::new();
        if !stack.push_back(seed) {
            overflow.store(true, Ordering::Relaxed);
            return;
        }
        while let Some(node) = stack.pop_back() {
            let cluster = points.cluster_index.get(node as usize);
            for &follower in followers.indexes(node as usize) {
                points.cluster_index.set(follower as usize, cluster);
                if !stack.push_back(follower) {
                    overflow.store(true, Ordering::Relaxed);
                    return;
                }
            }
        }
    });
}

/// Map clusterId -> member point indices. Outliers (clusterId -1) do not
/// appear.
pub fn get_clusters<const N: usize>(points: &PointsHost<N>) -> AssociationMap {
    let ids = points.cluster_indexes();
    let nbins = ids.iter().copied().max().map_or(0, |max| (max + 1).max(0) as usize);
    make_associator(ids, nbins)
}

/// Weighted centroid of one cluster, or `None` when the id has no members.
pub fn cluster_centroid<const N: usize>(points: &PointsHost<N>, id: i32) -> Option<[f32; N]> {
    let ids = points.cluster_indexes();
    let weights = points.weights();
    let mut centroid = [0f32; N];
    let mut total_weight = 0f32;
    for (i, &cluster) in ids.iter().enumerate() {
        if cluster != id {
            continue;
        }
        let coords = points.point(i);
        let w = weights[i];
        for dim in 0..N {
            centroid[dim] += w * coords[dim];
        }
        total_weight += w;
    }
    if total_weight == 0.0 {
        return None;
    }
    for value in centroid.iter_mut() {
        *value /= total_weight;
    }
    Some(centroid)
}

/// Weighted centroids of every cluster, indexed by clusterId.
pub fn cluster_centroids<const N: usize>(points: &PointsHost<N>) -> Vec<[f32; N]> {
    let clusters = get_clusters(points);
    (0..clusters.size())
        .filter_map(|id| cluster_centroid(points, id as i32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(Clusterer::<2>::new(-1.0, 10.0).is_err());
        assert!(Clusterer::<2>::new(1.0, -10.0).is_err());
        assert!(Clusterer::<2>::new(1.0, 0.0).is_err());
        assert!(Clusterer::<2>::new(1.0, 10.0)
            .unwrap()
            .with_points_per_tile(0)
            .is_err());
    }

    #[test]
    fn test_tile_grid_shape() {
        let (n_tiles, n_per_dim) = tile_grid::<2>(32768, 128).unwrap();
        assert_eq!(n_per_dim, 16);
        assert_eq!(n_tiles, 256);

        let (n_tiles, n_per_dim) = tile_grid::<2>(1, 128).unwrap();
        assert_eq!((n_tiles, n_per_dim), (1, 1));
    }

    #[test]
    fn test_tile_grid_overflow_detected() {
        let err = tile_grid::<10>(usize::MAX / 2, 1).unwrap_err();
        assert!(matches!(err, Error::TileOverflow { .. }));
    }

    #[test]
    fn test_parameter_from_vec_shapes() {
        assert!(parameter_from_vec::<3>(&[1.0], "dc").is_ok());
        assert!(parameter_from_vec::<3>(&[1.0, 2.0, 3.0], "dc").is_ok());
        assert!(parameter_from_vec::<3>(&[1.0, 2.0], "dc").is_err());
    }
}
