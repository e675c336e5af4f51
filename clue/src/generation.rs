//! Synthetic dataset generators shared by the tests and the benchmark
//! harness.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::points::PointsHost;

/// Isotropic (or per-dimension stretched) gaussian blobs with unit
/// weights, one blob per center, deterministic for a fixed seed.
pub fn gaussian_blobs<const N: usize>(
    centers: &[[f32; N]],
    sigma: [f32; N],
    points_per_blob: usize,
    seed: u64,
) -> PointsHost<N> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normals: Vec<Normal<f32>> = sigma
        .iter()
        .map(|&s| Normal::new(0.0, s.max(f32::MIN_POSITIVE)).expect("positive standard deviation"))
        .collect();

    let n = centers.len() * points_per_blob;
    let mut points = PointsHost::<N>::new(n);
    for dim in 0..N {
        let column = points.coords_mut(dim).expect("dimension bounded by the point rank");
        for (blob, center) in centers.iter().enumerate() {
            for i in 0..points_per_blob {
                column[blob * points_per_blob + i] = center[dim] + normals[dim].sample(&mut rng);
            }
        }
    }
    points.weights_mut().fill(1.0);
    points
}

/// `n` points evenly spaced on a circle of the given radius, unit weights.
pub fn uniform_ring(n: usize, radius: f32) -> PointsHost<2> {
    let mut points = PointsHost::<2>::new(n);
    for i in 0..n {
        let angle = 2.0 * std::f32::consts::PI * i as f32 / n as f32;
        points.coords_mut(0).expect("two dimensions")[i] = radius * angle.cos();
        points.coords_mut(1).expect("two dimensions")[i] = radius * angle.sin();
    }
    points.weights_mut().fill(1.0);
    points
}

/// A `side x side` unit-spacing grid with unit weights, row-major point
/// indexing.
pub fn uniform_grid(side: usize) -> PointsHost<2> {
    let n = side * side;
    let mut points = PointsHost::<2>::new(n);
    for row in 0..side {
        for col in 0..side {
            let i = row * side + col;
            points.coords_mut(0).expect("two dimensions")[i] = row as f32;
            points.coords_mut(1).expect("two dimensions")[i] = col as f32;
        }
    }
    points.weights_mut().fill(1.0);
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blobs_are_deterministic_for_a_seed() {
        let a = gaussian_blobs::<2>(&[[0.0, 0.0], [10.0, 0.0]], [1.0, 1.0], 50, 7);
        let b = gaussian_blobs::<2>(&[[0.0, 0.0], [10.0, 0.0]], [1.0, 1.0], 50, 7);
        assert_eq!(a.coords(0).unwrap(), b.coords(0).unwrap());
        assert_eq!(a.size(), 100);
    }

    #[test]
    fn test_ring_points_on_radius() {
        let ring = uniform_ring(64, 2.0);
        for i in 0..64 {
            let p = ring.point(i);
            let r = (p[0] * p[0] + p[1] * p[1]).sqrt();
            assert!((r - 2.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_grid_shape() {
        let grid = uniform_grid(4);
        assert_eq!(grid.size(), 16);
        assert_eq!(grid.point(5), [1.0, 1.0]);
        assert_eq!(grid.point(15), [3.0, 3.0]);
    }
}
