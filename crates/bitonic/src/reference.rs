//! Host execution of a stage plan.
//!
//! Applies each stage with the same compare-exchange indices the kernel uses,
//! one simulated thread at a time. Pairs touched by one level never overlap,
//! so the sequential order gives the same result as the device. Used to check
//! plans without a GPU.

use crate::params::{AlgorithmVariant, StageParameters};
use crate::planner::StagePlan;

/// Orders a pair so the larger value comes first.
fn compare_and_swap(values: &mut [i32], x: usize, y: usize) {
    if values[x] < values[y] {
        values.swap(x, y);
    }
}

fn flip(values: &mut [i32], thread: usize, h: usize) {
    let half_h = h / 2;
    let q = (2 * thread / h) * h;
    let x = q + thread % half_h;
    let y = q + h - thread % half_h - 1;
    compare_and_swap(values, x, y);
}

fn disperse(values: &mut [i32], thread: usize, h: usize) {
    let half_h = h / 2;
    let q = (2 * thread / h) * h;
    let x = q + thread % half_h;
    compare_and_swap(values, x, x + half_h);
}

fn local_disperse(block: &mut [i32], width: usize, span: usize) {
    let mut h = span;
    while h > 1 {
        for t in 0..width {
            disperse(block, t, h);
        }
        h /= 2;
    }
}

fn local_bitonic_merge_sort(block: &mut [i32], width: usize, span: usize) {
    let mut h = 2;
    while h <= span {
        for t in 0..width {
            flip(block, t, h);
        }
        local_disperse(block, width, h / 2);
        h *= 2;
    }
}

/// Run one stage over the whole array.
pub fn execute_stage(values: &mut [i32], workgroup_width: u32, stage: &StageParameters) {
    let width = workgroup_width as usize;
    let span = stage.span as usize;
    match stage.algorithm {
        AlgorithmVariant::LocalBitonicMergeSort => {
            for block in values.chunks_exact_mut(width * 2) {
                local_bitonic_merge_sort(block, width, span);
            }
        }
        AlgorithmVariant::LocalDisperse => {
            for block in values.chunks_exact_mut(width * 2) {
                local_disperse(block, width, span);
            }
        }
        AlgorithmVariant::BigFlip => {
            for t in 0..values.len() / 2 {
                flip(values, t, span);
            }
        }
        AlgorithmVariant::BigDisperse => {
            for t in 0..values.len() / 2 {
                disperse(values, t, span);
            }
        }
    }
}

/// Run every stage of `plan`.
///
/// # Panics
///
/// Panics if `values.len()` differs from `plan.element_count()`.
pub fn execute(plan: &StagePlan, values: &mut [i32]) {
    assert_eq!(
        values.len(),
        plan.element_count() as usize,
        "plan was built for a different array length"
    );
    for stage in plan {
        execute_stage(values, plan.workgroup_width(), stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;

    #[test]
    fn sorts_example_descending() {
        let mut values = [3, 1, 4, 1, 5, 9, 2, 6];
        execute(&plan(8, 4).unwrap(), &mut values);
        assert_eq!(values, [9, 6, 5, 4, 3, 2, 1, 1]);
    }

    #[test]
    fn global_stages_sort_across_workgroups() {
        let mut values: Vec<i32> = (0..64).map(|i| (i * 37 % 64) - 20).collect();
        let mut expected = values.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));
        execute(&plan(64, 2).unwrap(), &mut values);
        assert_eq!(values, expected);
    }
}
