//! GPU rendition of the pipeline: all four stages, both association-map
//! builds and the prefix scan run device-side from one WGSL source,
//! specialized per rank / workgroup size / kernel / metric. The host
//! uploads the input columns, enqueues the whole run in one submission and
//! blocks only to read the result columns back.
//!
//! Seed order on the device follows atomic push interleaving, so clusterIds
//! are a run-to-run permutation; the partition itself is stable.

use tracing::{debug, info_span};
use wgpu::{
    BindGroupDescriptor, BindGroupEntry, BindGroupLayout, BindGroupLayoutDescriptor,
    BindGroupLayoutEntry, BindingResource, BindingType, Buffer, BufferBindingType,
    BufferDescriptor, BufferUsages, CommandEncoderDescriptor, ComputePassDescriptor,
    ComputePipeline, ComputePipelineDescriptor, PipelineCompilationOptions,
    PipelineLayoutDescriptor, ShaderModuleDescriptor, ShaderSource, ShaderStages,
};

use crate::backend::GpuQueue;
use crate::clusterer::tile_grid;
use crate::error::{Error, Result};
use crate::kernels::ConvolutionalKernel;
use crate::metrics::{DistanceMetric, DistanceParameter};
use crate::points::PointsHost;
use crate::tiles::reduce_extremes;

const SHADER_TEMPLATE: &str = include_str!("pipeline.wgsl");

/// Storage bindings the pipeline layout declares (plus the parameter block).
const N_BINDINGS: u32 = 15;

/// Per-run parameters handed over by the clusterer.
pub(crate) struct GpuRun<const N: usize> {
    pub dc: DistanceParameter<N>,
    pub dm: DistanceParameter<N>,
    pub seed_dc: DistanceParameter<N>,
    pub rhoc: f32,
    pub wrapped: [bool; N],
    pub points_per_tile: i32,
    pub block_size: usize,
}

pub(crate) struct GpuOutcome {
    pub seed_candidates: usize,
    pub n_seeds: usize,
}

struct Pipelines {
    key: String,
    layout: BindGroupLayout,
    compute_bins: ComputePipeline,
    count_tiles: ComputePipeline,
    count_followers: ComputePipeline,
    scan_blocks_tiles: ComputePipeline,
    scan_blocks_followers: ComputePipeline,
    scan_carry_tiles: ComputePipeline,
    scan_carry_followers: ComputePipeline,
    add_carry_tiles: ComputePipeline,
    add_carry_followers: ComputePipeline,
    scatter_tiles: ComputePipeline,
    scatter_followers: ComputePipeline,
    s2_density: ComputePipeline,
    s3_nearest_higher: ComputePipeline,
    s4_find_seeds: ComputePipeline,
    s4_assign: ComputePipeline,
}

struct Buffers {
    cap_points: usize,
    cap_tiles: usize,
    uniforms: Buffer,
    input: Buffer,
    rho: Buffer,
    delta: Buffer,
    nh: Buffer,
    cluster_seed: Buffer,
    tile_values: Buffer,
    tile_offsets: Buffer,
    foll_values: Buffer,
    foll_offsets: Buffer,
    counts: Buffer,
    bins: Buffer,
    block_sums: Buffer,
    seeds: Buffer,
    flags: Buffer,
    staging: Buffer,
}

/// Device-side state a clusterer keeps alive between runs: the compiled
/// shader specialization and the grown-to-fit buffer set.
#[derive(Default)]
pub(crate) struct GpuState {
    pipelines: Option<Pipelines>,
    buffers: Option<Buffers>,
    bind_group: Option<wgpu::BindGroup>,
}

pub(crate) fn make_clusters<const N: usize, K, M>(
    gpu: &GpuQueue,
    state: &mut GpuState,
    points: &mut PointsHost<N>,
    kernel: &K,
    metric: &M,
    run: &GpuRun<N>,
) -> Result<GpuOutcome>
where
    K: ConvolutionalKernel,
    M: DistanceMetric<N>,
{
    let kernel_spec = kernel.wgsl().ok_or_else(|| {
        Error::InvalidParameter("convolutional kernel has no device specialization".into())
    })?;
    let metric_spec = metric.wgsl().ok_or_else(|| {
        Error::InvalidParameter("distance metric has no device specialization".into())
    })?;
    if gpu.device.limits().max_storage_buffers_per_shader_stage < N_BINDINGS {
        return Err(Error::AllocationFailure(
            "adapter exposes too few storage buffers for the pipeline".into(),
        ));
    }

    let n_points = points.size();
    let (n_tiles, n_per_dim) = tile_grid::<N>(n_points, run.points_per_tile)?;
    let _span = info_span!("gpu_make_clusters", n_points, n_tiles).entered();

    let max_workgroup = gpu.device.limits().max_compute_workgroup_size_x.max(1) as usize;
    let workgroup = run.block_size.clamp(1, max_workgroup.min(256)) as u32;
    let key = format!(
        "{N}:{workgroup}:{}:{}:{}",
        kernel_spec.expr, metric_spec.acc_stmt, metric_spec.ret_stmt
    );
    let rebuilt_pipelines = ensure_pipelines::<N>(gpu, state, &key, workgroup, &kernel_spec.expr, &metric_spec)?;
    let rebuilt_buffers = ensure_buffers::<N>(gpu, state, n_points, n_tiles);
    if rebuilt_pipelines || rebuilt_buffers || state.bind_group.is_none() {
        rebuild_bind_group(gpu, state);
    }

    let buffers = state.buffers.as_ref().ok_or_else(|| {
        Error::AllocationFailure("GPU buffer set missing after setup".into())
    })?;
    let pipelines = state.pipelines.as_ref().ok_or_else(|| {
        Error::AllocationFailure("GPU pipelines missing after setup".into())
    })?;
    let bind_group = state.bind_group.as_ref().ok_or_else(|| {
        Error::AllocationFailure("GPU bind group missing after setup".into())
    })?;

    // Geometry is reduced host-side, exactly like the CPU queues do it.
    let extremes = reduce_extremes::<N>(points.input(), n_points);
    let mut tile_sizes = [0f32; N];
    for dim in 0..N {
        let size = extremes.range(dim) / n_per_dim as f32;
        tile_sizes[dim] = if size > 0.0 { size } else { 1.0 };
    }

    let mut uniforms = Vec::with_capacity(28 + 32 * N);
    for scalar in [n_points as u32, n_tiles as u32, n_per_dim as u32] {
        uniforms.extend_from_slice(&scalar.to_le_bytes());
    }
    for scalar in [run.rhoc, kernel_spec.params[0], kernel_spec.params[1], kernel_spec.params[2]] {
        uniforms.extend_from_slice(&scalar.to_le_bytes());
    }
    push_f32s(&mut uniforms, &extremes.min);
    push_f32s(&mut uniforms, &extremes.max);
    push_f32s(&mut uniforms, &tile_sizes);
    for wrapped in run.wrapped {
        uniforms.extend_from_slice(&(wrapped as u32).to_le_bytes());
    }
    push_f32s(&mut uniforms, run.dc.values());
    push_f32s(&mut uniforms, run.dm.values());
    push_f32s(&mut uniforms, run.seed_dc.values());
    push_f32s(&mut uniforms, &metric_spec.weights);
    gpu.queue.write_buffer(&buffers.uniforms, 0, &uniforms);

    let mut input = Vec::with_capacity(points.input().len() * 4);
    push_f32s(&mut input, points.input());
    gpu.queue.write_buffer(&buffers.input, 0, &input);

    let groups_points = n_points.div_ceil(workgroup as usize) as u32;
    let groups_tiles = n_tiles.div_ceil(workgroup as usize) as u32;
    let cursor_bytes_tiles = ((n_tiles + 1) * 4) as u64;
    let cursor_bytes_followers = ((n_points + 1) * 4) as u64;

    let mut encoder = gpu.device.create_command_encoder(&CommandEncoderDescriptor { label: None });
    encoder.clear_buffer(&buffers.counts, 0, None);
    encoder.clear_buffer(&buffers.flags, 0, None);
    encoder.clear_buffer(&buffers.tile_offsets, 0, None);
    encoder.clear_buffer(&buffers.foll_offsets, 0, None);

    {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("tile fill"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, bind_group, &[]);
        for (pipeline, groups) in [
            (&pipelines.compute_bins, groups_points),
            (&pipelines.count_tiles, groups_points),
            (&pipelines.scan_blocks_tiles, groups_tiles),
            (&pipelines.scan_carry_tiles, 1),
            (&pipelines.add_carry_tiles, groups_tiles),
        ] {
            pass.set_pipeline(pipeline);
            pass.dispatch_workgroups(groups, 1, 1);
        }
    }
    encoder.copy_buffer_to_buffer(&buffers.tile_offsets, 0, &buffers.counts, 0, cursor_bytes_tiles);
    {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("density and nearest higher"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, bind_group, &[]);
        for pipeline in [
            &pipelines.scatter_tiles,
            &pipelines.s2_density,
            &pipelines.s3_nearest_higher,
            &pipelines.s4_find_seeds,
        ] {
            pass.set_pipeline(pipeline);
            pass.dispatch_workgroups(groups_points, 1, 1);
        }
    }
    encoder.clear_buffer(&buffers.counts, 0, None);
    {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("followers"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, bind_group, &[]);
        for (pipeline, groups) in [
            (&pipelines.count_followers, groups_points),
            (&pipelines.scan_blocks_followers, groups_points),
            (&pipelines.scan_carry_followers, 1),
            (&pipelines.add_carry_followers, groups_points),
        ] {
            pass.set_pipeline(pipeline);
            pass.dispatch_workgroups(groups, 1, 1);
        }
    }
    encoder.copy_buffer_to_buffer(&buffers.foll_offsets, 0, &buffers.counts, 0, cursor_bytes_followers);
    {
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("assignment"),
            timestamp_writes: None,
        });
        pass.set_bind_group(0, bind_group, &[]);
        for pipeline in [&pipelines.scatter_followers, &pipelines.s4_assign] {
            pass.set_pipeline(pipeline);
            pass.dispatch_workgroups(groups_points, 1, 1);
        }
    }
    let result_bytes = (2 * n_points * 4) as u64;
    encoder.copy_buffer_to_buffer(&buffers.cluster_seed, 0, &buffers.staging, 0, result_bytes);
    encoder.copy_buffer_to_buffer(&buffers.flags, 0, &buffers.staging, result_bytes, 12);
    gpu.queue.submit(Some(encoder.finish()));
    debug!("pipeline submitted");

    let slice = buffers.staging.slice(..result_bytes + 12);
    slice.map_async(wgpu::MapMode::Read, |_| {});
    gpu.device.poll(wgpu::Maintain::Wait);
    let mapped = slice.get_mapped_range();

    let mut cluster_ids = vec![0i32; n_points];
    let mut is_seed = vec![0i32; n_points];
    for (i, value) in cluster_ids.iter_mut().enumerate() {
        *value = read_i32(&mapped, i);
    }
    for (i, value) in is_seed.iter_mut().enumerate() {
        *value = read_i32(&mapped, n_points + i);
    }
    let n_seeds = read_i32(&mapped, 2 * n_points) as usize;
    let seed_candidates = read_i32(&mapped, 2 * n_points + 1) as usize;
    let overflow = read_i32(&mapped, 2 * n_points + 2) != 0;
    drop(mapped);
    buffers.staging.unmap();

    if overflow {
        return Err(Error::ClusterPropagationOverflow);
    }
    points.set_cluster_indexes(&cluster_ids);
    points.set_is_seed(&is_seed);
    Ok(GpuOutcome { seed_candidates, n_seeds })
}

fn push_f32s(bytes: &mut Vec<u8>, values: &[f32]) {
    for value in values {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
}

fn read_i32(bytes: &[u8], index: usize) -> i32 {
    let offset = index * 4;
    i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap_or([0; 4]))
}

fn ensure_pipelines<const N: usize>(
    gpu: &GpuQueue,
    state: &mut GpuState,
    key: &str,
    workgroup: u32,
    kernel_expr: &str,
    metric_spec: &crate::metrics::MetricWgsl<N>,
) -> Result<bool> {
    if state.pipelines.as_ref().is_some_and(|p| p.key == key) {
        return Ok(false);
    }

    let source = SHADER_TEMPLATE
        .replace("{NDIM}", &N.to_string())
        .replace("{WG}", &workgroup.to_string())
        .replace("{KERNEL_EXPR}", kernel_expr)
        .replace("{METRIC_ACC}", metric_spec.acc_stmt)
        .replace("{METRIC_RET}", metric_spec.ret_stmt);
    let module = gpu.device.create_shader_module(ShaderModuleDescriptor {
        label: Some("clue pipeline"),
        source: ShaderSource::Wgsl(source.into()),
    });

    let mut entries = Vec::new();
    for binding in 0..N_BINDINGS {
        entries.push(BindGroupLayoutEntry {
            binding,
            visibility: ShaderStages::COMPUTE,
            ty: BindingType::Buffer {
                ty: BufferBindingType::Storage { read_only: binding <= 1 },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        });
    }
    let layout = gpu.device.create_bind_group_layout(&BindGroupLayoutDescriptor {
        label: Some("clue bindings"),
        entries: &entries,
    });
    let pipeline_layout = gpu.device.create_pipeline_layout(&PipelineLayoutDescriptor {
        label: None,
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let make = |entry_point: &str| {
        gpu.device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some(entry_point),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point,
            compilation_options: PipelineCompilationOptions::default(),
        })
    };

    state.pipelines = Some(Pipelines {
        key: key.to_string(),
        layout,
        compute_bins: make("compute_bins"),
        count_tiles: make("count_tiles"),
        count_followers: make("count_followers"),
        scan_blocks_tiles: make("scan_blocks_tiles"),
        scan_blocks_followers: make("scan_blocks_followers"),
        scan_carry_tiles: make("scan_carry_tiles"),
        scan_carry_followers: make("scan_carry_followers"),
        add_carry_tiles: make("add_carry_tiles"),
        add_carry_followers: make("add_carry_followers"),
        scatter_tiles: make("scatter_tiles"),
        scatter_followers: make("scatter_followers"),
        s2_density: make("s2_density"),
        s3_nearest_higher: make("s3_nearest_higher"),
        s4_find_seeds: make("s4_find_seeds"),
        s4_assign: make("s4_assign"),
    });
    Ok(true)
}

fn ensure_buffers<const N: usize>(
    gpu: &GpuQueue,
    state: &mut GpuState,
    n_points: usize,
    n_tiles: usize,
) -> bool {
    if state
        .buffers
        .as_ref()
        .is_some_and(|b| b.cap_points >= n_points && b.cap_tiles >= n_tiles)
    {
        return false;
    }

    let cap_points = n_points;
    let cap_tiles = n_tiles;
    let scratch = cap_points.max(cap_tiles) + 1;
    let storage = |label: &str, bytes: usize, extra: BufferUsages| {
        gpu.device.create_buffer(&BufferDescriptor {
            label: Some(label),
            size: bytes.max(4) as u64,
            usage: BufferUsages::STORAGE | extra,
            mapped_at_creation: false,
        })
    };

    state.buffers = Some(Buffers {
        cap_points,
        cap_tiles,
        uniforms: storage("uniforms", 28 + 32 * N, BufferUsages::COPY_DST),
        input: storage("input", (N + 1) * cap_points * 4, BufferUsages::COPY_DST),
        rho: storage("rho", cap_points * 4, BufferUsages::empty()),
        delta: storage("delta", cap_points * 4, BufferUsages::empty()),
        nh: storage("nearest higher", cap_points * 4, BufferUsages::empty()),
        cluster_seed: storage("cluster and seed", 2 * cap_points * 4, BufferUsages::COPY_SRC),
        tile_values: storage("tile values", cap_points * 4, BufferUsages::empty()),
        tile_offsets: storage(
            "tile offsets",
            (cap_tiles + 1) * 4,
            BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
        ),
        foll_values: storage("follower values", cap_points * 4, BufferUsages::empty()),
        foll_offsets: storage(
            "follower offsets",
            (cap_points + 1) * 4,
            BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
        ),
        counts: storage("counts", scratch * 4, BufferUsages::COPY_DST),
        bins: storage("bins", cap_points * 4, BufferUsages::empty()),
        block_sums: storage("block sums", scratch * 4, BufferUsages::empty()),
        seeds: storage("seeds", cap_points * 4, BufferUsages::empty()),
        flags: storage("flags", 12, BufferUsages::COPY_SRC | BufferUsages::COPY_DST),
        staging: gpu.device.create_buffer(&BufferDescriptor {
            label: Some("staging"),
            size: (2 * cap_points * 4 + 12) as u64,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        }),
    });
    true
}

fn rebuild_bind_group(gpu: &GpuQueue, state: &mut GpuState) {
    let (Some(pipelines), Some(buffers)) = (&state.pipelines, &state.buffers) else {
        return;
    };
    let bound: [&Buffer; N_BINDINGS as usize] = [
        &buffers.uniforms,
        &buffers.input,
        &buffers.rho,
        &buffers.delta,
        &buffers.nh,
        &buffers.cluster_seed,
        &buffers.tile_values,
        &buffers.tile_offsets,
        &buffers.foll_values,
        &buffers.foll_offsets,
        &buffers.counts,
        &buffers.bins,
        &buffers.block_sums,
        &buffers.seeds,
        &buffers.flags,
    ];
    let entries: Vec<BindGroupEntry> = bound
        .iter()
        .enumerate()
        .map(|(binding, buffer)| BindGroupEntry {
            binding: binding as u32,
            resource: BindingResource::Buffer(buffer.as_entire_buffer_binding()),
        })
        .collect();
    state.bind_group = Some(gpu.device.create_bind_group(&BindGroupDescriptor {
        label: Some("clue bindings"),
        layout: &pipelines.layout,
        entries: &entries,
    }));
}
