pub mod bitonic_sort;
pub mod pipeline_builder;
pub mod readback;
pub mod reduce;
pub mod vector_add;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bitonic::{BatchError, PlanError};
use thiserror::Error;

use crate::config::AdapterConfig;

/// Global flag indicating GPU device was lost
static GPU_DEVICE_LOST: AtomicBool = AtomicBool::new(false);

/// Check if the GPU device has been lost
pub fn is_device_lost() -> bool {
    GPU_DEVICE_LOST.load(Ordering::SeqCst)
}

/// Reset the device lost flag (call after recreating device)
pub fn reset_device_lost() {
    GPU_DEVICE_LOST.store(false, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no GPU adapter matches the requested options")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("pipeline `{label}` failed to build: {message}")]
    PipelineCreation { label: String, message: String },
    #[error("buffer map failed: {0}")]
    BufferMapFailed(#[from] wgpu::BufferAsyncError),
    #[error("GPU device lost")]
    DeviceLost,
    #[error("invalid sort geometry: {0}")]
    Plan(#[from] PlanError),
    #[error("dispatch batch: {0}")]
    Batch(#[from] BatchError),
    #[error("input lengths differ: {lhs} vs {rhs}")]
    LengthMismatch { lhs: usize, rhs: usize },
    #[error("{bytes} byte buffer exceeds the device binding limit of {limit} bytes")]
    InputTooLarge { bytes: u64, limit: u64 },
    #[error("{count} workgroups exceed the device limit of {limit} per dispatch")]
    TooManyWorkgroups { count: u32, limit: u32 },
}

/// Wait for a buffer map operation to complete, returning Result instead of panicking.
pub fn await_buffer_map(
    rx: std::sync::mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
) -> Result<(), GpuError> {
    if is_device_lost() {
        return Err(GpuError::DeviceLost);
    }
    match rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            log::error!("Buffer map failed: {:?}", e);
            Err(GpuError::BufferMapFailed(e))
        }
        Err(_) => {
            log::error!("Buffer map channel disconnected - possible device lost");
            GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
            Err(GpuError::DeviceLost)
        }
    }
}

/// Byte size of `count` elements of `T`, checked against the storage binding limit.
pub(crate) fn storage_size<T>(limits: &wgpu::Limits, count: usize) -> Result<u64, GpuError> {
    let bytes = (count as u64).saturating_mul(std::mem::size_of::<T>() as u64);
    let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
    if bytes > limit {
        return Err(GpuError::InputTooLarge { bytes, limit });
    }
    Ok(bytes)
}

/// Workgroup count of a 1D dispatch, checked against the per-dimension limit.
pub(crate) fn check_workgroups(limits: &wgpu::Limits, count: u32) -> Result<u32, GpuError> {
    let limit = limits.max_compute_workgroups_per_dimension;
    if count > limit {
        return Err(GpuError::TooManyWorkgroups { count, limit });
    }
    Ok(count)
}

/// Headless compute context: device, queue and what the adapter reported.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub adapter_info: wgpu::AdapterInfo,
    pub limits: wgpu::Limits,
}

impl GpuContext {
    pub async fn new(config: &AdapterConfig) -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends.to_wgpu(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference.to_wgpu(),
                compatible_surface: None,
                force_fallback_adapter: config.force_fallback_adapter,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        log::info!("Using GPU: {} ({:?})", adapter_info.name, adapter_info.backend);

        // Take everything the adapter offers; workgroup sizing reads these back.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Compute Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {:?}", error);
            if matches!(error, wgpu::Error::OutOfMemory { .. }) {
                GPU_DEVICE_LOST.store(true, Ordering::SeqCst);
            }
        }));

        reset_device_lost();

        let limits = device.limits();
        log::debug!(
            "device limits: invocations={} size_x={} workgroup_storage={} storage_binding={} min_uniform_align={}",
            limits.max_compute_invocations_per_workgroup,
            limits.max_compute_workgroup_size_x,
            limits.max_compute_workgroup_storage_size,
            limits.max_storage_buffer_binding_size,
            limits.min_uniform_buffer_offset_alignment,
        );

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            adapter_info,
            limits,
        })
    }

    /// [`GpuContext::new`] driven to completion on the current thread.
    pub fn new_blocking(config: &AdapterConfig) -> Result<Self, GpuError> {
        pollster::block_on(Self::new(config))
    }
}
