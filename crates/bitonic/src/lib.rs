//! Bitonic sorting network planning - device independent.
//!
//! Computes the ordered dispatch sequence that sorts a power-of-two array on a
//! GPU and records it through a [`StageEncoder`] session. This crate never
//! touches a device; see the `compute` crate for the wgpu side.

pub mod batcher;
pub mod error;
pub mod params;
pub mod planner;
pub mod reference;

pub use batcher::{DispatchBatcher, ParameterLayout, StageEncoder};
pub use error::{BatchError, PlanError};
pub use params::{AlgorithmVariant, StageParameters};
pub use planner::{count_stages, floor_power_of_two, plan, workgroup_width, StagePlan};
