//! Elementwise addition of two `f32` arrays.

use std::sync::Arc;

use wgpu::util::DeviceExt;

use super::pipeline_builder::PipelineBuilder;
use super::readback::StagingBuffer;
use super::{check_workgroups, storage_size, GpuContext, GpuError};

const SHADER: &str = include_str!("shaders/vector_add.wgsl");
const WORKGROUP_SIZE: u32 = 256;

pub struct GpuVectorAdd {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    limits: wgpu::Limits,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuVectorAdd {
    pub fn new(ctx: &GpuContext) -> Result<Self, GpuError> {
        let (pipeline, bind_group_layout) = PipelineBuilder::new(&ctx.device)
            .shader_source(SHADER)
            .label("add_arrays")
            .entry_point("add_arrays")
            .constant("WORKGROUP_SIZE", WORKGROUP_SIZE)
            .storage_buffers(&[true, true, false])
            .build()?;

        Ok(Self {
            device: ctx.device.clone(),
            queue: ctx.queue.clone(),
            limits: ctx.limits.clone(),
            pipeline,
            bind_group_layout,
        })
    }

    /// `lhs[i] + rhs[i]` for every `i`.
    pub fn add(&self, lhs: &[f32], rhs: &[f32]) -> Result<Vec<f32>, GpuError> {
        if lhs.len() != rhs.len() {
            return Err(GpuError::LengthMismatch {
                lhs: lhs.len(),
                rhs: rhs.len(),
            });
        }
        if lhs.is_empty() {
            return Ok(Vec::new());
        }

        let byte_size = storage_size::<f32>(&self.limits, lhs.len())?;
        // Bounded by the binding limit above.
        let workgroups = check_workgroups(
            &self.limits,
            (lhs.len() as u32).div_ceil(WORKGROUP_SIZE),
        )?;

        let input = |label: &str, values: &[f32]| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(values),
                    usage: wgpu::BufferUsages::STORAGE,
                })
        };
        let lhs_buffer = input("Add Lhs", lhs);
        let rhs_buffer = input("Add Rhs", rhs);
        let result_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Add Result"),
            size: byte_size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Add Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: lhs_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: rhs_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: result_buffer.as_entire_binding(),
                },
            ],
        });

        let staging = StagingBuffer::new(&self.device, "Add Readback", byte_size);
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Add Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Add Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        staging.copy_from(&mut encoder, &result_buffer);
        self.queue.submit(std::iter::once(encoder.finish()));

        staging.read_blocking(&self.device)
    }
}
