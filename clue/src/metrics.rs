/// Distance threshold expressible as one scalar broadcast to every
/// dimension or as one value per dimension. Comparisons against the
/// per-dimension absolute-difference vector are component-wise: `<=` is an
/// AND over dimensions, `>` an OR of strict inequalities.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DistanceParameter<const N: usize> {
    values: [f32; N],
}

impl<const N: usize> DistanceParameter<N> {
    pub fn uniform(radius: f32) -> Self {
        DistanceParameter { values: [radius; N] }
    }

    pub fn per_dim(values: [f32; N]) -> Self {
        DistanceParameter { values }
    }

    #[inline]
    pub fn get(&self, dim: usize) -> f32 {
        self.values[dim]
    }

    pub fn values(&self) -> &[f32; N] {
        &self.values
    }

    /// All components strictly positive; the validity requirement for dc,
    /// dm and seed_dc.
    pub fn is_positive(&self) -> bool {
        self.values.iter().all(|&v| v > 0.0)
    }

    /// `distance_vector <= parameter`, component-wise AND.
    #[inline]
    pub fn contains(&self, dvec: &[f32; N]) -> bool {
        dvec.iter().zip(&self.values).all(|(&d, &p)| d <= p)
    }

    /// `scalar <= parameter`, component-wise AND. The in-range test the
    /// density and nearest-higher stages apply to the reduced distance.
    #[inline]
    pub fn covers(&self, scalar: f32) -> bool {
        self.values.iter().all(|&p| scalar <= p)
    }

    /// `scalar > parameter`, OR of strict inequalities. Used for the seed
    /// promotion check of delta against seed_dc.
    #[inline]
    pub fn exceeded_by(&self, scalar: f32) -> bool {
        self.values.iter().any(|&p| scalar > p)
    }
}

impl<const N: usize> From<f32> for DistanceParameter<N> {
    fn from(radius: f32) -> Self {
        DistanceParameter::uniform(radius)
    }
}

impl<const N: usize> From<[f32; N]> for DistanceParameter<N> {
    fn from(values: [f32; N]) -> Self {
        DistanceParameter::per_dim(values)
    }
}

/// Shader fragment a metric contributes to the GPU specialization: the
/// per-dimension accumulation statement, the final reduction statement and
/// the per-dimension weights uploaded alongside the stage parameters.
#[derive(Clone, Debug)]
pub struct MetricWgsl<const N: usize> {
    pub(crate) acc_stmt: &'static str,
    pub(crate) ret_stmt: &'static str,
    pub(crate) weights: [f32; N],
}

/// Reduces the per-dimension absolute-difference vector to a scalar
/// distance. The vector always comes out of the tile index's wrap-aware
/// `distance_vector`, never from raw coordinate differences.
pub trait DistanceMetric<const N: usize>: Sync {
    fn reduce(&self, dvec: &[f32; N]) -> f32;

    /// Shader specialization for the GPU queue; `None` marks a host-only
    /// metric that the GPU back-end rejects.
    fn wgsl(&self) -> Option<MetricWgsl<N>> {
        None
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Euclidean;

impl<const N: usize> DistanceMetric<N> for Euclidean {
    #[inline]
    fn reduce(&self, dvec: &[f32; N]) -> f32 {
        dvec.iter().map(|&d| d * d).sum::<f32>().sqrt()
    }

    fn wgsl(&self) -> Option<MetricWgsl<N>> {
        Some(MetricWgsl {
            acc_stmt: "acc += x * dx;",
            ret_stmt: "return sqrt(acc);",
            weights: [1.0; N],
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WeightedEuclidean<const N: usize> {
    pub weights: [f32; N],
}

impl<const N: usize> WeightedEuclidean<N> {
    pub fn new(weights: [f32; N]) -> Self {
        WeightedEuclidean { weights }
    }
}

impl<const N: usize> DistanceMetric<N> for WeightedEuclidean<N> {
    #[inline]
    fn reduce(&self, dvec: &[f32; N]) -> f32 {
        dvec.iter()
            .zip(&self.weights)
            .map(|(&d, &w)| w * d * d)
            .sum::<f32>()
            .sqrt()
    }

    fn wgsl(&self) -> Option<MetricWgsl<N>> {
        Some(MetricWgsl {
            acc_stmt: "acc += x * dx;",
            ret_stmt: "return sqrt(acc);",
            weights: self.weights,
        })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Manhattan;

impl<const N: usize> DistanceMetric<N> for Manhattan {
    #[inline]
    fn reduce(&self, dvec: &[f32; N]) -> f32 {
        dvec.iter().sum()
    }

    fn wgsl(&self) -> Option<MetricWgsl<N>> {
        Some(MetricWgsl { acc_stmt: "acc += x;", ret_stmt: "return acc;", weights: [1.0; N] })
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Chebyshev;

impl<const N: usize> DistanceMetric<N> for Chebyshev {
    #[inline]
    fn reduce(&self, dvec: &[f32; N]) -> f32 {
        dvec.iter().fold(0.0f32, |acc, &d| acc.max(d))
    }

    fn wgsl(&self) -> Option<MetricWgsl<N>> {
        Some(MetricWgsl {
            acc_stmt: "acc = max(acc, x);",
            ret_stmt: "return acc;",
            weights: [1.0; N],
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WeightedChebyshev<const N: usize> {
    pub weights: [f32; N],
}

impl<const N: usize> WeightedChebyshev<N> {
    pub fn new(weights: [f32; N]) -> Self {
        WeightedChebyshev { weights }
    }
}

impl<const N: usize> DistanceMetric<N> for WeightedChebyshev<N> {
    #[inline]
    fn reduce(&self, dvec: &[f32; N]) -> f32 {
        dvec.iter()
            .zip(&self.weights)
            .fold(0.0f32, |acc, (&d, &w)| acc.max(w * d))
    }

    fn wgsl(&self) -> Option<MetricWgsl<N>> {
        Some(MetricWgsl {
            acc_stmt: "acc = max(acc, x);",
            ret_stmt: "return acc;",
            weights: self.weights,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_reduce() {
        let d = Euclidean.reduce(&[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_euclidean_reduce() {
        let metric = WeightedEuclidean::new([4.0, 1.0]);
        let d = metric.reduce(&[1.0, 2.0]);
        assert!((d - (4.0f32 + 4.0).sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_manhattan_and_chebyshev() {
        let dvec = [1.0f32, 2.5, 0.5];
        assert!((Manhattan.reduce(&dvec) - 4.0).abs() < 1e-6);
        assert!((Chebyshev.reduce(&dvec) - 2.5).abs() < 1e-6);
        let weighted = WeightedChebyshev::new([3.0, 1.0, 1.0]);
        assert!((weighted.reduce(&dvec) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_parameter_broadcast_and_per_dim() {
        let broadcast: DistanceParameter<3> = 1.5f32.into();
        assert_eq!(broadcast.values(), &[1.5, 1.5, 1.5]);
        let per_dim: DistanceParameter<2> = [1.0f32, 2.0].into();
        assert!(per_dim.contains(&[1.0, 2.0]));
        assert!(!per_dim.contains(&[1.1, 0.0]));
    }

    #[test]
    fn test_parameter_scalar_comparison_is_or_of_strict() {
        let param: DistanceParameter<2> = [1.0f32, 3.0].into();
        assert!(param.exceeded_by(2.0));
        assert!(!param.exceeded_by(1.0));
        assert!(param.exceeded_by(f32::INFINITY));
    }

    #[test]
    fn test_parameter_covers_is_and() {
        let param: DistanceParameter<2> = [1.0f32, 3.0].into();
        assert!(param.covers(1.0));
        assert!(!param.covers(2.0));
        assert!(!param.exceeded_by(1.0) == param.covers(1.0));
    }
}
