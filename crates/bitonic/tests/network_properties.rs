//! Property-based tests for the bitonic stage planner using proptest
//!
//! These tests verify plan invariants across random array and workgroup sizes:
//! - Closed-form stage count equals the generated stage count
//! - Every span is a power of two within [2, N]
//! - The network ends in a local stage
//! - Executing the plan on the host sorts descending

use bitonic::{count_stages, plan, reference, AlgorithmVariant};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// (N, W) with N a power of two in [4, 2^20] and 1 < W <= N/2, W a power of two.
fn geometry() -> impl Strategy<Value = (u32, u32)> {
    (2u32..=20)
        .prop_flat_map(|log_n| (Just(1u32 << log_n), 1u32..log_n))
        .prop_map(|(n, log_w)| (n, 1u32 << log_w))
}

/// Any power-of-two N in [2, 2^12] and any W, including non-powers of two.
fn loose_geometry() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=12, 1u32..=2048).prop_map(|(log_n, w)| (1u32 << log_n, w))
}

fn descending(values: &[i32]) -> bool {
    values.windows(2).all(|pair| pair[0] >= pair[1])
}

proptest! {
    #[test]
    fn closed_form_matches_generator((n, w) in geometry()) {
        let plan = plan(n, w).unwrap();
        prop_assert_eq!(count_stages(n, w).unwrap() as usize, plan.len());
    }

    #[test]
    fn closed_form_matches_generator_for_any_width((n, w) in loose_geometry()) {
        let plan = plan(n, w).unwrap();
        prop_assert_eq!(count_stages(n, w).unwrap(), plan.stage_count());
    }

    #[test]
    fn spans_are_bounded_powers_of_two((n, w) in geometry()) {
        for stage in &plan(n, w).unwrap() {
            prop_assert!(stage.span.is_power_of_two());
            prop_assert!(stage.span >= 2 && stage.span <= n);
        }
    }

    #[test]
    fn network_ends_locally((n, w) in loose_geometry()) {
        let plan = plan(n, w).unwrap();
        let last = plan.stages().last().unwrap().algorithm;
        if plan.len() == 1 {
            prop_assert_eq!(last, AlgorithmVariant::LocalBitonicMergeSort);
            prop_assert!(n <= 2 * w);
        } else {
            prop_assert_eq!(last, AlgorithmVariant::LocalDisperse);
        }
    }

    #[test]
    fn flips_are_followed_by_one_collapse((n, w) in geometry()) {
        let plan = plan(n, w).unwrap();
        let local_span = plan.local_memory_len();
        let mut open_flip = false;
        for stage in plan.iter().skip(1) {
            match stage.algorithm {
                AlgorithmVariant::BigFlip => {
                    prop_assert!(!open_flip);
                    open_flip = true;
                }
                AlgorithmVariant::BigDisperse => {
                    prop_assert!(open_flip);
                    prop_assert!(stage.span > local_span);
                }
                AlgorithmVariant::LocalDisperse => {
                    prop_assert!(open_flip);
                    prop_assert_eq!(stage.span, local_span);
                    open_flip = false;
                }
                AlgorithmVariant::LocalBitonicMergeSort => prop_assert!(false, "second local sort"),
            }
        }
        prop_assert!(!open_flip);
    }

    #[test]
    fn host_execution_sorts_descending((n, w) in loose_geometry(), seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut values: Vec<i32> = (0..n).map(|_| rng.gen_range(-1000..1000)).collect();
        let mut expected = values.clone();
        expected.sort_unstable_by(|a, b| b.cmp(a));

        reference::execute(&plan(n, w).unwrap(), &mut values);
        prop_assert!(descending(&values));
        prop_assert_eq!(values, expected);
    }
}

#[test]
fn sorted_input_is_unchanged() {
    let values: Vec<i32> = (0..1024).rev().map(|v| v / 3).collect();
    let mut sorted = values.clone();
    reference::execute(&plan(1024, 8).unwrap(), &mut sorted);
    assert_eq!(sorted, values);
}

