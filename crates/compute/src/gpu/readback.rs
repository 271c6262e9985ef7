//! Blocking readback of device buffers.
//!
//! Every compute run ends the same way: copy the result into a mappable
//! staging buffer inside the run's command encoder, submit, wait for the
//! device, then map and cast the bytes back to host values.

use std::sync::mpsc;

use super::{await_buffer_map, GpuError};

/// A `MAP_READ` buffer that a run copies its result into.
pub(crate) struct StagingBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl StagingBuffer {
    pub fn new(device: &wgpu::Device, label: &str, size: u64) -> Self {
        Self {
            buffer: device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
            size,
        }
    }

    /// Record a copy of the first `size` bytes of `src`.
    pub fn copy_from(&self, encoder: &mut wgpu::CommandEncoder, src: &wgpu::Buffer) {
        encoder.copy_buffer_to_buffer(src, 0, &self.buffer, 0, self.size);
    }

    /// Map the buffer once submitted work has finished and read it as `T`s.
    pub fn read_blocking<T: bytemuck::Pod>(
        &self,
        device: &wgpu::Device,
    ) -> Result<Vec<T>, GpuError> {
        let slice = self.buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        await_buffer_map(rx)?;

        let values = {
            let data = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, T>(&data).to_vec()
        };
        self.buffer.unmap();
        Ok(values)
    }
}
