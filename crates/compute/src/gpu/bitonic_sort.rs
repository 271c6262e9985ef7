//! GPU bitonic sort of `i32` arrays, descending.
//!
//! A run plans the network for the array length, uploads the data, then
//! records every stage into one compute pass of one command encoder:
//! stage `i` writes its [`StageParameters`] into slot `i` of a uniform buffer
//! and dispatches with a dynamic offset pointing at that slot. The pass is
//! submitted once and the result is read back through a staging buffer.
//!
//! The kernel is specialised per workgroup width (workgroup memory holds
//! `2 * width` elements), so pipelines are built on first use and cached.

use std::collections::hash_map::{Entry, HashMap};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::time::Instant;

use bitonic::{floor_power_of_two, DispatchBatcher, ParameterLayout, StageEncoder};
use bitonic::{StageParameters, StagePlan};
use wgpu::util::DeviceExt;

use super::pipeline_builder::PipelineBuilder;
use super::readback::StagingBuffer;
use super::{check_workgroups, storage_size, GpuContext, GpuError};
use crate::config::SortConfig;

const SHADER: &str = include_str!("shaders/bitonic.wgsl");
const PARAMETERS_SIZE: u64 = std::mem::size_of::<StageParameters>() as u64;

/// Widest power-of-two workgroup the device runs the local variants with.
///
/// Bounded by invocations per workgroup, the x dimension, and workgroup
/// memory (two `i32`s per thread).
pub fn device_workgroup_limit(limits: &wgpu::Limits) -> u32 {
    let by_memory =
        limits.max_compute_workgroup_storage_size / (2 * std::mem::size_of::<i32>() as u32);
    floor_power_of_two(
        limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x)
            .min(by_memory),
    )
}

struct SortPipeline {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

fn cached_pipeline<'m>(
    device: &wgpu::Device,
    cache: &'m mut HashMap<u32, SortPipeline>,
    workgroup_width: u32,
) -> Result<&'m SortPipeline, GpuError> {
    match cache.entry(workgroup_width) {
        Entry::Occupied(slot) => Ok(slot.into_mut()),
        Entry::Vacant(slot) => {
            let label = format!("bitonic_sort_w{}", workgroup_width);
            let (pipeline, bind_group_layout) = PipelineBuilder::new(device)
                .shader_source(SHADER)
                .label(&label)
                .entry_point("bitonic_sort")
                .constant("WORKGROUP_SIZE", workgroup_width)
                .constant("LOCAL_SIZE", workgroup_width * 2)
                .storage_buffer(false)
                .uniform_buffer_dynamic(PARAMETERS_SIZE)
                .build()?;
            log::debug!("built bitonic pipeline for workgroup width {}", workgroup_width);
            Ok(slot.insert(SortPipeline {
                pipeline,
                bind_group_layout,
            }))
        }
    }
}

/// Records stages into an open compute pass.
struct PassStageEncoder<'a> {
    pass: wgpu::ComputePass<'a>,
    queue: &'a wgpu::Queue,
    parameter_buffer: &'a wgpu::Buffer,
    bind_group: &'a wgpu::BindGroup,
}

impl StageEncoder for PassStageEncoder<'_> {
    fn write_parameters(&mut self, byte_offset: u64, parameters: &StageParameters) {
        // Queued writes land before the submission that carries this pass.
        self.queue.write_buffer(
            self.parameter_buffer,
            byte_offset,
            bytemuck::bytes_of(parameters),
        );
    }

    fn dispatch(&mut self, parameter_offset: u32, workgroup_count: u32) {
        self.pass.set_bind_group(0, self.bind_group, &[parameter_offset]);
        self.pass.dispatch_workgroups(workgroup_count, 1, 1);
    }
}

/// Sorts `i32` arrays on the GPU.
pub struct GpuBitonicSorter {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    limits: wgpu::Limits,
    max_workgroup_size: u32,
    parameter_layout: ParameterLayout,
    pipelines: HashMap<u32, SortPipeline>,
}

impl GpuBitonicSorter {
    pub fn new(ctx: &GpuContext, config: &SortConfig) -> Self {
        let device_limit = device_workgroup_limit(&ctx.limits);
        let max_workgroup_size = match config.max_workgroup_size {
            Some(cap) => cap.min(device_limit),
            None => device_limit,
        };
        let parameter_layout =
            ParameterLayout::new(ctx.limits.min_uniform_buffer_offset_alignment);
        log::info!(
            "bitonic sorter: max workgroup size {} (device {}), parameter stride {}",
            max_workgroup_size,
            device_limit,
            parameter_layout.stride()
        );

        Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            limits: ctx.limits.clone(),
            max_workgroup_size,
            parameter_layout,
            pipelines: HashMap::new(),
        }
    }

    /// Upper bound on threads per workgroup used by this sorter.
    pub fn max_workgroup_size(&self) -> u32 {
        self.max_workgroup_size
    }

    pub fn parameter_layout(&self) -> ParameterLayout {
        self.parameter_layout
    }

    /// The dispatch sequence a sort of `len` elements would record.
    pub fn plan(&self, len: usize) -> Result<StagePlan, GpuError> {
        storage_size::<i32>(&self.limits, len)?;
        // Within the binding limit, so within u32.
        let plan = bitonic::plan(len as u32, self.max_workgroup_size)?;
        check_workgroups(&self.limits, plan.workgroup_count())?;
        Ok(plan)
    }

    /// Sorted copy of `data`, largest first.
    pub fn sort(&mut self, data: &[i32]) -> Result<Vec<i32>, GpuError> {
        let mut out = data.to_vec();
        self.sort_in_place(&mut out)?;
        Ok(out)
    }

    /// Sort `data` largest first. The length must be a power of two; 0 and 1
    /// return immediately without touching the device.
    pub fn sort_in_place(&mut self, data: &mut [i32]) -> Result<(), GpuError> {
        if data.len() < 2 {
            return Ok(());
        }

        let start = Instant::now();
        let plan = self.plan(data.len())?;
        let byte_size = storage_size::<i32>(&self.limits, data.len())?;
        let sort_pipeline =
            cached_pipeline(&self.device, &mut self.pipelines, plan.workgroup_width())?;

        let values_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Bitonic Values"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });

        // Exactly one slot per planned stage.
        let parameter_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bitonic Stage Parameters"),
            size: self.parameter_layout.buffer_size(plan.stage_count()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bitonic Bind Group"),
            layout: &sort_pipeline.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: values_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &parameter_buffer,
                        offset: 0,
                        size: NonZeroU64::new(PARAMETERS_SIZE),
                    }),
                },
            ],
        });

        let staging = StagingBuffer::new(&self.device, "Bitonic Readback", byte_size);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Bitonic Sort Encoder"),
            });

        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Bitonic Sort Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&sort_pipeline.pipeline);

            let session = PassStageEncoder {
                pass,
                queue: &self.queue,
                parameter_buffer: &parameter_buffer,
                bind_group: &bind_group,
            };
            let mut batcher = DispatchBatcher::for_plan(session, self.parameter_layout, &plan);
            batcher.record_plan(&plan)?;
            // Dropping the session ends the pass.
            drop(batcher.finish()?);
        }

        staging.copy_from(&mut encoder, &values_buffer);
        self.queue.submit(std::iter::once(encoder.finish()));

        let sorted: Vec<i32> = staging.read_blocking(&self.device)?;
        data.copy_from_slice(&sorted);

        log::info!(
            "bitonic sort: {} elements, {} dispatches, {} workgroups of {} in {:.2?}",
            data.len(),
            plan.len(),
            plan.workgroup_count(),
            plan.workgroup_width(),
            start.elapsed()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_limit_from_default_limits() {
        // 256 invocations, 16 KiB workgroup memory.
        assert_eq!(device_workgroup_limit(&wgpu::Limits::default()), 256);
    }

    #[test]
    fn workgroup_limit_bounded_by_memory() {
        let limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: 1024,
            max_compute_workgroup_size_x: 1024,
            max_compute_workgroup_storage_size: 4096,
            ..wgpu::Limits::default()
        };
        assert_eq!(device_workgroup_limit(&limits), 512);
    }

    #[test]
    fn workgroup_limit_rounds_down() {
        let limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: 768,
            max_compute_workgroup_size_x: 768,
            max_compute_workgroup_storage_size: 32768,
            ..wgpu::Limits::default()
        };
        assert_eq!(device_workgroup_limit(&limits), 512);
    }

    #[test]
    fn webgl2_has_no_compute_width() {
        let limits = wgpu::Limits::downlevel_webgl2_defaults();
        assert_eq!(device_workgroup_limit(&limits), 0);
    }
}
