use std::marker::PhantomData;
use std::sync::Arc;

use pollster::block_on;
use tracing::{debug, info};
use wgpu::{DeviceDescriptor, InstanceDescriptor, PowerPreference, RequestAdapterOptions};

use crate::error::{Error, Result};

/// Cached wgpu Device + Queue (Arc-wrapped for sharing).
/// Creating many wgpu Devices exhausts OS GPU driver handles (~60 limit).
/// One device per process; callers create fresh buffers/pipelines per use.
fn cached_gpu_device() -> Result<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
    use std::sync::OnceLock;
    static GPU: OnceLock<Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)>> = OnceLock::new();
    GPU.get_or_init(|| {
        let instance = wgpu::Instance::new(InstanceDescriptor::default());
        let adapter = block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: PowerPreference::HighPerformance,
            ..Default::default()
        }))?;
        info!(adapter = %adapter.get_info().name, "acquired GPU adapter");
        // The pipeline binds more storage buffers than the conservative
        // default limit allows; ask for what the adapter actually has.
        let mut limits = wgpu::Limits::default();
        limits.max_storage_buffers_per_shader_stage = limits
            .max_storage_buffers_per_shader_stage
            .max(adapter.limits().max_storage_buffers_per_shader_stage.min(16));
        let descriptor = DeviceDescriptor {
            label: None,
            required_features: wgpu::Features::empty(),
            required_limits: limits,
        };
        let (device, queue) = block_on(adapter.request_device(&descriptor, None)).ok()?;
        std::mem::forget(instance);
        std::mem::forget(adapter);
        Some((Arc::new(device), Arc::new(queue)))
    })
    .clone()
    .ok_or_else(|| Error::AllocationFailure("no GPU adapter available".into()))
}

/// Handle to the device-side work queue of the GPU back-end.
#[derive(Clone)]
pub struct GpuQueue {
    pub(crate) device: Arc<wgpu::Device>,
    pub(crate) queue: Arc<wgpu::Queue>,
}

/// A device work queue. Kernels enqueued on one queue execute in order;
/// within a kernel, work items run with no cross-item ordering.
pub enum Queue {
    /// Sequential CPU. One element per logical thread, fixed iteration
    /// order, bit-reproducible across runs.
    Serial,
    /// Multi-threaded CPU over an owned thread pool. Same kernel source as
    /// the serial queue, chunked by the launch block size.
    Threaded(rayon::ThreadPool),
    /// GPU compute queue (Vulkan/Metal/DX12 through wgpu).
    Gpu(GpuQueue),
}

impl Queue {
    pub fn serial() -> Self {
        Queue::Serial
    }

    pub fn threaded(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(Error::InvalidParameter("worker count must be positive".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| Error::AllocationFailure(e.to_string()))?;
        debug!(workers, "created threaded queue");
        Ok(Queue::Threaded(pool))
    }

    pub fn gpu() -> Result<Self> {
        let (device, queue) = cached_gpu_device()?;
        Ok(Queue::Gpu(GpuQueue { device, queue }))
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self, Queue::Gpu(_))
    }

    /// Launch a bulk-parallel kernel: one invocation per index in `0..n`.
    /// `block_size` is the work-division granularity on the threaded queue.
    /// Must not be called on a GPU queue; GPU stages dispatch shaders.
    pub(crate) fn for_each(&self, n: usize, block_size: usize, f: impl Fn(usize) + Sync + Send) {
        match self {
            Queue::Serial => (0..n).for_each(f),
            Queue::Threaded(pool) => pool.install(|| {
                use rayon::prelude::*;
                (0..n).into_par_iter().with_min_len(block_size.max(1)).for_each(f);
            }),
            Queue::Gpu(_) => unreachable!("CPU kernel launched on a GPU queue"),
        }
    }

    /// Bulk map over `0..n`, collecting one value per index.
    pub(crate) fn map_indices<T, F>(&self, n: usize, block_size: usize, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Queue::Serial => (0..n).map(f).collect(),
            Queue::Threaded(pool) => pool.install(|| {
                use rayon::prelude::*;
                (0..n)
                    .into_par_iter()
                    .with_min_len(block_size.max(1))
                    .map(f)
                    .collect()
            }),
            Queue::Gpu(_) => unreachable!("CPU kernel launched on a GPU queue"),
        }
    }
}

/// Shared mutable slice handed to kernels whose invocations write disjoint
/// slots. The caller guarantees disjointness (each invocation writes only
/// indices it owns), which is what makes the raw-pointer writes sound.
pub(crate) struct SharedSlice<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

unsafe impl<T: Send> Send for SharedSlice<'_, T> {}
unsafe impl<T: Send> Sync for SharedSlice<'_, T> {}

impl<T> Clone for SharedSlice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for SharedSlice<'_, T> {}

impl<'a, T: Copy> SharedSlice<'a, T> {
    pub fn new(slice: &'a mut [T]) -> Self {
        SharedSlice { ptr: slice.as_mut_ptr(), len: slice.len(), _marker: PhantomData }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn get(&self, index: usize) -> T {
        debug_assert!(index < self.len);
        unsafe { *self.ptr.add(index) }
    }

    #[inline]
    pub fn set(&self, index: usize, value: T) {
        debug_assert!(index < self.len);
        unsafe { *self.ptr.add(index) = value };
    }
}

/// Print the devices a back-end can see. `backend` is one of the names
/// accepted by `clue_types::BackendKind::parse`.
pub fn list_devices(backend: &str) {
    match clue_types::BackendKind::parse(backend) {
        Some(clue_types::BackendKind::Serial) | Some(clue_types::BackendKind::Threaded) => {
            let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
            println!("cpu: host processor ({workers} hardware threads)");
        }
        Some(clue_types::BackendKind::Gpu) => {
            let instance = wgpu::Instance::new(InstanceDescriptor::default());
            let mut found = false;
            for adapter in instance.enumerate_adapters(wgpu::Backends::all()) {
                let info = adapter.get_info();
                println!("gpu: {} ({:?}, {:?})", info.name, info.device_type, info.backend);
                found = true;
            }
            if !found {
                println!("gpu: no adapters found");
            }
        }
        None => println!("unknown backend '{backend}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portable_atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_serial_for_each_covers_all_indices() {
        let queue = Queue::serial();
        let counter = AtomicUsize::new(0);
        queue.for_each(100, 32, |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn test_threaded_map_matches_serial() {
        let serial = Queue::serial();
        let threaded = Queue::threaded(4).unwrap();
        let a = serial.map_indices(1000, 64, |i| i * i);
        let b = threaded.map_indices(1000, 64, |i| i * i);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shared_slice_disjoint_writes() {
        let mut data = vec![0i32; 64];
        {
            let view = SharedSlice::new(&mut data);
            let queue = Queue::threaded(4).unwrap();
            queue.for_each(64, 8, |i| view.set(i, i as i32 * 2));
        }
        assert!(data.iter().enumerate().all(|(i, &v)| v == i as i32 * 2));
    }

    #[test]
    fn test_zero_workers_rejected() {
        assert!(Queue::threaded(0).is_err());
    }
}
