//! Parallel sum of an `i32` array.
//!
//! One dispatch: each workgroup reduces its slice in workgroup memory and
//! atomically adds the partial sum to a single accumulator. The sum wraps on
//! overflow, as `i32` addition does in the kernel.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::pipeline_builder::PipelineBuilder;
use super::readback::StagingBuffer;
use super::{check_workgroups, storage_size, GpuContext, GpuError};

const SHADER: &str = include_str!("shaders/reduce.wgsl");
const WORKGROUP_SIZE: u32 = 256;

pub struct GpuReduce {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    limits: wgpu::Limits,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuReduce {
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        let (pipeline, bind_group_layout) = PipelineBuilder::new(&ctx.device)
            .shader_source(SHADER)
            .label("reduce_sum")
            .entry_point("reduce_sum")
            .constant("WORKGROUP_SIZE", WORKGROUP_SIZE)
            .storage_buffer(true)
            .storage_buffer(false)
            .build()?;

        Ok(Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            limits: ctx.limits.clone(),
            pipeline,
            bind_group_layout,
        })
    }

    pub fn sum(&self, values: &[i32]) -> Result<i32, GpuError> {
        if values.is_empty() {
            return Ok(0);
        }

        storage_size::<i32>(&self.limits, values.len())?;
        let workgroups = check_workgroups(
            &self.limits,
            (values.len() as u32).div_ceil(WORKGROUP_SIZE),
        )?;

        let input_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Reduce Input"),
                contents: bytemuck::cast_slice(values),
                usage: wgpu::BufferUsages::STORAGE,
            });
        let total_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Reduce Total"),
                contents: bytemuck::bytes_of(&0i32),
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Reduce Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: total_buffer.as_entire_binding(),
                },
            ],
        });

        let staging = StagingBuffer::new(
            &self.device,
            "Reduce Readback",
            std::mem::size_of::<i32>() as u64,
        );
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Reduce Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Reduce Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        staging.copy_from(&mut encoder, &total_buffer);
        self.queue.submit(std::iter::once(encoder.finish()));

        let total: Vec<i32> = staging.read_blocking(&self.device)?;
        log::debug!("reduce: {} values in {} workgroups", values.len(), workgroups);
        Ok(total.first().copied().unwrap_or_default())
    }
}
