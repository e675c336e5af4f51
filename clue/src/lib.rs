//! CLUE density-based clustering over weighted N-dimensional point clouds.
//!
//! The pipeline runs in four stages on a device work queue: spatial tile
//! fill, local density, nearest-higher-density neighbour, and seed marking
//! with follower propagation. The same kernel source drives the sequential
//! and the multi-threaded CPU queues; a WGSL specialization of the same
//! pipeline drives GPUs through wgpu.
//!
//! ```no_run
//! use clue::{Clusterer, PointsHost, Queue};
//!
//! let mut points = PointsHost::<2>::from_points(
//!     &[[0.0, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]],
//!     &[1.0; 4],
//! )?;
//! let mut clusterer = Clusterer::<2>::new(1.5, 1.0)?.with_dm(5.0)?;
//! clusterer.make_clusters(&Queue::serial(), &mut points)?;
//! let clusters = clue::get_clusters(&points);
//! # Ok::<(), clue::Error>(())
//! ```

mod assoc;
mod backend;
mod clusterer;
mod error;
mod generation;
mod gpu;
mod io;
mod kernels;
mod metrics;
mod points;
mod scan;
mod tiles;
mod validation;
mod vecarray;

pub use assoc::{make_associator, AssociationMap, AssociationMapView, Extents, Followers};
pub use backend::{list_devices, GpuQueue, Queue};
pub use clusterer::{
    cluster_centroid, cluster_centroids, get_clusters, Clusterer, DEFAULT_BLOCK_SIZE,
    DEFAULT_POINTS_PER_TILE,
};
pub use error::{Error, Result};
pub use generation::{gaussian_blobs, uniform_grid, uniform_ring};
pub use io::{read_csv, read_output_csv, write_output_csv};
pub use kernels::{
    ConvolutionalKernel, CustomKernel, ExponentialKernel, FlatKernel, GaussianKernel, KernelWgsl,
};
pub use metrics::{
    Chebyshev, DistanceMetric, DistanceParameter, Euclidean, Manhattan, MetricWgsl,
    WeightedChebyshev, WeightedEuclidean,
};
pub use points::{PointsDevice, PointsHost, MAX_DIM};
pub use tiles::{
    CoordinateExtremes, SearchBoxBins, SearchBoxExtremes, TileGeometry, Tiles, TilesView,
};
pub use validation::{silhouette, silhouette_sample};
pub use vecarray::{SeedArray, SeedArrayView, VecArray};
