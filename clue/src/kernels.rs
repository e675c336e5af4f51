/// Shader fragment a convolutional kernel contributes to the GPU
/// specialization: an expression over the distance `r` and the uploaded
/// parameters `U.kp0..U.kp2`. The self-contribution (i == j -> 1) is part
/// of the shared shader scaffolding.
#[derive(Clone, Debug)]
pub struct KernelWgsl {
    pub(crate) expr: String,
    pub(crate) params: [f32; 3],
}

/// Weighting function applied to every in-range neighbour while the local
/// density accumulates. Pure and stateless apart from its configuration;
/// `weight(r, i, i)` is 1 so every point contributes its own weight.
pub trait ConvolutionalKernel: Sync {
    fn weight(&self, r: f32, point_id: i32, j: i32) -> f32;

    /// Shader specialization for the GPU queue; `None` marks a host-only
    /// kernel that the GPU back-end rejects.
    fn wgsl(&self) -> Option<KernelWgsl> {
        None
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FlatKernel {
    pub flat: f32,
}

impl FlatKernel {
    pub fn new(flat: f32) -> Self {
        FlatKernel { flat }
    }
}

impl ConvolutionalKernel for FlatKernel {
    #[inline]
    fn weight(&self, _r: f32, point_id: i32, j: i32) -> f32 {
        if point_id == j {
            1.0
        } else {
            self.flat
        }
    }

    fn wgsl(&self) -> Option<KernelWgsl> {
        Some(KernelWgsl { expr: "U.kp0".into(), params: [self.flat, 0.0, 0.0] })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct GaussianKernel {
    pub mean: f32,
    pub std_dev: f32,
    pub amplitude: f32,
}

impl GaussianKernel {
    pub fn new(mean: f32, std_dev: f32, amplitude: f32) -> Self {
        GaussianKernel { mean, std_dev, amplitude }
    }
}

impl ConvolutionalKernel for GaussianKernel {
    #[inline]
    fn weight(&self, r: f32, point_id: i32, j: i32) -> f32 {
        if point_id == j {
            1.0
        } else {
            let shifted = r - self.mean;
            self.amplitude * (-(shifted * shifted) / (2.0 * self.std_dev * self.std_dev)).exp()
        }
    }

    fn wgsl(&self) -> Option<KernelWgsl> {
        Some(KernelWgsl {
            expr: "U.kp2 * exp(-((r - U.kp0) * (r - U.kp0)) / (2.0 * U.kp1 * U.kp1))".into(),
            params: [self.mean, self.std_dev, self.amplitude],
        })
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ExponentialKernel {
    pub lambda: f32,
    pub amplitude: f32,
}

impl ExponentialKernel {
    pub fn new(lambda: f32, amplitude: f32) -> Self {
        ExponentialKernel { lambda, amplitude }
    }
}

impl ConvolutionalKernel for ExponentialKernel {
    #[inline]
    fn weight(&self, r: f32, point_id: i32, j: i32) -> f32 {
        if point_id == j {
            1.0
        } else {
            self.amplitude * (-self.lambda * r).exp()
        }
    }

    fn wgsl(&self) -> Option<KernelWgsl> {
        Some(KernelWgsl {
            expr: "U.kp1 * exp(-U.kp0 * r)".into(),
            params: [self.lambda, self.amplitude, 0.0],
        })
    }
}

/// User-defined kernel. The closure sees the distance and both point
/// indices; an optional WGSL expression over `r` and `U.kp0..U.kp2` makes
/// the kernel usable on the GPU queue as well.
pub struct CustomKernel<F>
where
    F: Fn(f32, i32, i32) -> f32 + Sync,
{
    function: F,
    device_expr: Option<(String, [f32; 3])>,
}

impl<F> CustomKernel<F>
where
    F: Fn(f32, i32, i32) -> f32 + Sync,
{
    pub fn new(function: F) -> Self {
        CustomKernel { function, device_expr: None }
    }

    pub fn with_device_expr(function: F, expr: impl Into<String>, params: [f32; 3]) -> Self {
        CustomKernel { function, device_expr: Some((expr.into(), params)) }
    }
}

impl<F> ConvolutionalKernel for CustomKernel<F>
where
    F: Fn(f32, i32, i32) -> f32 + Sync,
{
    #[inline]
    fn weight(&self, r: f32, point_id: i32, j: i32) -> f32 {
        (self.function)(r, point_id, j)
    }

    fn wgsl(&self) -> Option<KernelWgsl> {
        self.device_expr
            .as_ref()
            .map(|(expr, params)| KernelWgsl { expr: expr.clone(), params: *params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_kernel_self_contribution() {
        let kernel = FlatKernel::new(0.5);
        assert_eq!(kernel.weight(3.0, 7, 7), 1.0);
        assert_eq!(kernel.weight(3.0, 7, 8), 0.5);
    }

    #[test]
    fn test_gaussian_kernel_peak_at_mean() {
        let kernel = GaussianKernel::new(0.0, 1.0, 2.0);
        assert!((kernel.weight(0.0, 0, 1) - 2.0).abs() < 1e-6);
        let one_sigma = kernel.weight(1.0, 0, 1);
        assert!((one_sigma - 2.0 * (-0.5f32).exp()).abs() < 1e-6);
        assert_eq!(kernel.weight(5.0, 3, 3), 1.0);
    }

    #[test]
    fn test_exponential_kernel_decay() {
        let kernel = ExponentialKernel::new(2.0, 1.5);
        assert!((kernel.weight(0.0, 0, 1) - 1.5).abs() < 1e-6);
        assert!((kernel.weight(1.0, 0, 1) - 1.5 * (-2.0f32).exp()).abs() < 1e-6);
        assert_eq!(kernel.weight(1.0, 4, 4), 1.0);
    }

    #[test]
    fn test_custom_kernel_pass_through() {
        let kernel = CustomKernel::new(|r, i, j| if i == j { 1.0 } else { 1.0 / (1.0 + r) });
        assert_eq!(kernel.weight(0.0, 2, 2), 1.0);
        assert!((kernel.weight(1.0, 0, 1) - 0.5).abs() < 1e-6);
        assert!(kernel.wgsl().is_none());
    }
}
