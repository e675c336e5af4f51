//! Host-side cluster validation scores.

use crate::clusterer::get_clusters;
use crate::points::PointsHost;

fn euclidean<const N: usize>(a: &[f32; N], b: &[f32; N]) -> f32 {
    let mut sum = 0f32;
    for dim in 0..N {
        let diff = a[dim] - b[dim];
        sum += diff * diff;
    }
    sum.sqrt()
}

/// Silhouette score of a single point: `(b - a) / max(a, b)` where `a` is
/// the mean distance to its own cluster and `b` the smallest mean distance
/// to another cluster. Outliers and singleton clusters score zero.
pub fn silhouette_sample<const N: usize>(points: &PointsHost<N>, index: usize) -> f32 {
    let ids = points.cluster_indexes();
    let own = ids[index];
    if own < 0 {
        return 0.0;
    }
    let clusters = get_clusters(points);
    if clusters.size() < 2 || clusters.count(own as usize) < 2 {
        return 0.0;
    }

    let coords = points.point(index);
    let mut a = 0f32;
    let mut b = f32::INFINITY;
    for cluster in 0..clusters.size() {
        let members = clusters.indexes(cluster);
        if members.is_empty() {
            continue;
        }
        let mut total = 0f32;
        let mut count = 0usize;
        for &member in members {
            if member as usize == index {
                continue;
            }
            total += euclidean(&coords, &points.point(member as usize));
            count += 1;
        }
        if cluster == own as usize {
            a = total / count as f32;
        } else {
            b = b.min(total / members.len() as f32);
        }
    }
    (b - a) / a.max(b)
}

/// Mean silhouette over all clustered points; 0 for degenerate inputs.
pub fn silhouette<const N: usize>(points: &PointsHost<N>) -> f32 {
    let ids = points.cluster_indexes();
    let mut total = 0f32;
    let mut count = 0usize;
    for (i, &id) in ids.iter().enumerate() {
        if id < 0 {
            continue;
        }
        total += silhouette_sample(points, i);
        count += 1;
    }
    if count == 0 {
        return 0.0;
    }
    total / count as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silhouette_of_two_tight_blobs_is_high() {
        let mut points = PointsHost::<2>::from_points(
            &[[0.0, 0.0], [0.1, 0.0], [10.0, 0.0], [10.1, 0.0]],
            &[1.0; 4],
        )
        .unwrap();
        points.set_cluster_indexes(&[0, 0, 1, 1]);
        let score = silhouette(&points);
        assert!(score > 0.9, "score {score}");
        for i in 0..4 {
            let sample = silhouette_sample(&points, i);
            assert!((-1.0..=1.0).contains(&sample));
        }
    }

    #[test]
    fn test_outliers_score_zero() {
        let mut points =
            PointsHost::<2>::from_points(&[[0.0, 0.0], [1.0, 0.0], [5.0, 5.0]], &[1.0; 3]).unwrap();
        points.set_cluster_indexes(&[0, 0, -1]);
        assert_eq!(silhouette_sample(&points, 2), 0.0);
    }

    #[test]
    fn test_single_cluster_scores_zero() {
        let mut points =
            PointsHost::<2>::from_points(&[[0.0, 0.0], [1.0, 0.0]], &[1.0; 2]).unwrap();
        points.set_cluster_indexes(&[0, 0]);
        assert_eq!(silhouette(&points), 0.0);
    }
}
