//! Stage planning for the bitonic sorting network.
//!
//! A sort of `N` elements with workgroups of `w` threads runs as:
//! 1. one `LocalBitonicMergeSort` over blocks of `2w` elements,
//! 2. for every outer span `h = 4w, 8w, .. N`: a `BigFlip(h)` followed by
//!    `BigDisperse` steps while the span exceeds `2w`, then a single
//!    `LocalDisperse` that finishes the remaining levels in workgroup memory.
//!
//! The number of stages has the closed form `levels * (levels + 1) / 2` with
//! `levels = log2(N / w)`; [`plan`] checks the generated sequence against it.

use log::debug;

use crate::error::PlanError;
use crate::params::{AlgorithmVariant, StageParameters};

/// Ordered dispatches that sort one array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagePlan {
    element_count: u32,
    workgroup_width: u32,
    stages: Vec<StageParameters>,
}

impl StagePlan {
    /// Number of array elements the plan sorts.
    pub fn element_count(&self) -> u32 {
        self.element_count
    }

    /// Threads per workgroup; each thread owns one compare-exchange pair.
    pub fn workgroup_width(&self) -> u32 {
        self.workgroup_width
    }

    /// Workgroups per dispatch, identical for every stage.
    pub fn workgroup_count(&self) -> u32 {
        self.element_count / (self.workgroup_width * 2)
    }

    /// Elements held in workgroup memory by the local variants.
    pub fn local_memory_len(&self) -> u32 {
        self.workgroup_width * 2
    }

    pub fn stages(&self) -> &[StageParameters] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage count as the `u32` the parameter buffer is sized with.
    pub fn stage_count(&self) -> u32 {
        self.stages.len() as u32
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StageParameters> {
        self.stages.iter()
    }
}

impl<'a> IntoIterator for &'a StagePlan {
    type Item = &'a StageParameters;
    type IntoIter = std::slice::Iter<'a, StageParameters>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

/// Largest power of two not above `value` (0 for 0).
pub fn floor_power_of_two(value: u32) -> u32 {
    match value {
        0 => 0,
        v => 1 << v.ilog2(),
    }
}

fn validate(len: u32, max_workgroup_size: u32) -> Result<(), PlanError> {
    if len < 2 {
        return Err(PlanError::TooShort { len });
    }
    if !len.is_power_of_two() {
        return Err(PlanError::NotPowerOfTwo { len });
    }
    if max_workgroup_size == 0 {
        return Err(PlanError::ZeroWorkgroupSize);
    }
    Ok(())
}

/// Threads per workgroup used to sort `len` elements.
///
/// Arrays smaller than two full workgroups get `len / 2` threads, so the whole
/// array is one workgroup block. `max_workgroup_size` is rounded down to a
/// power of two.
pub fn workgroup_width(len: u32, max_workgroup_size: u32) -> Result<u32, PlanError> {
    validate(len, max_workgroup_size)?;
    let max = floor_power_of_two(max_workgroup_size);
    // `len` is even, so `len / 2 < max` is `len < 2 * max` without the overflow.
    Ok(if len / 2 < max { len / 2 } else { max })
}

/// Closed-form number of dispatches in `plan(len, max_workgroup_size)`.
pub fn count_stages(len: u32, max_workgroup_size: u32) -> Result<u32, PlanError> {
    let width = workgroup_width(len, max_workgroup_size)?;
    let levels = (len / width).ilog2();
    Ok(levels * (levels + 1) / 2)
}

/// Generate the dispatch sequence that sorts `len` elements in descending order.
pub fn plan(len: u32, max_workgroup_size: u32) -> Result<StagePlan, PlanError> {
    let width = workgroup_width(len, max_workgroup_size)?;
    let expected = count_stages(len, max_workgroup_size)?;
    let local_span = width * 2;

    let mut stages = Vec::with_capacity(expected as usize);
    stages.push(StageParameters::new(
        local_span,
        AlgorithmVariant::LocalBitonicMergeSort,
    ));

    // u64 so the final doubling past len = 2^31 terminates.
    let mut h = u64::from(local_span) * 2;
    while h <= u64::from(len) {
        let span = h as u32;
        stages.push(StageParameters::new(span, AlgorithmVariant::BigFlip));

        let mut hh = span / 2;
        while hh > 1 {
            if hh <= local_span {
                stages.push(StageParameters::new(hh, AlgorithmVariant::LocalDisperse));
                break;
            }
            stages.push(StageParameters::new(hh, AlgorithmVariant::BigDisperse));
            hh /= 2;
        }
        h *= 2;
    }

    let emitted = stages.len() as u32;
    if emitted != expected {
        return Err(PlanError::StageCountMismatch { expected, emitted });
    }

    debug!(
        "bitonic plan: n={} workgroup_width={} workgroups={} stages={}",
        len,
        width,
        len / local_span,
        emitted
    );

    Ok(StagePlan {
        element_count: len,
        workgroup_width: width,
        stages,
    })
}
