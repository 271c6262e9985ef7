//! GPU compute on wgpu: bitonic sort, vector addition and reduction.
//!
//! The sort drives the stage plans of the `bitonic` crate; everything here is
//! the device side of that plan plus the two simpler kernels.

pub mod config;
pub mod gpu;

pub use config::{AdapterConfig, ComputeConfig, DemoConfig, SortConfig};
pub use gpu::bitonic_sort::GpuBitonicSorter;
pub use gpu::reduce::GpuReduce;
pub use gpu::vector_add::GpuVectorAdd;
pub use gpu::{GpuContext, GpuError};
