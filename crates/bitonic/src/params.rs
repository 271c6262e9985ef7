//! Per-dispatch parameter record for the bitonic sort kernel.
//!
//! `StageParameters` is uploaded to a uniform buffer verbatim, one slot per
//! dispatch, so its layout must match the WGSL `Parameters` struct:
//! two `u32` fields, `h` then `algorithm`.

use bytemuck::NoUninit;
use std::fmt;

use crate::error::PlanError;

/// Compare-exchange pattern executed by one dispatch.
///
/// Discriminants are the values the kernel dispatches on. Every variant up to
/// and including `LocalDisperse` runs in workgroup memory.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, NoUninit)]
pub enum AlgorithmVariant {
    /// Full bitonic sort of each workgroup's block in local memory.
    LocalBitonicMergeSort = 0,
    /// All remaining disperse levels of one outer pass, in local memory.
    LocalDisperse = 1,
    /// Mirror-symmetric compare across workgroup boundaries.
    BigFlip = 2,
    /// Half-span compare across workgroup boundaries.
    BigDisperse = 3,
}

impl AlgorithmVariant {
    pub const ALL: [AlgorithmVariant; 4] = [
        AlgorithmVariant::LocalBitonicMergeSort,
        AlgorithmVariant::LocalDisperse,
        AlgorithmVariant::BigFlip,
        AlgorithmVariant::BigDisperse,
    ];

    /// True when the kernel stages the workgroup's block through local memory.
    pub fn is_local(self) -> bool {
        (self as u32) <= AlgorithmVariant::LocalDisperse as u32
    }
}

impl TryFrom<u32> for AlgorithmVariant {
    type Error = PlanError;

    fn try_from(raw: u32) -> Result<Self, Self::Error> {
        AlgorithmVariant::ALL
            .into_iter()
            .find(|variant| *variant as u32 == raw)
            .ok_or(PlanError::UnknownVariant(raw))
    }
}

impl fmt::Display for AlgorithmVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlgorithmVariant::LocalBitonicMergeSort => "local_bitonic_merge_sort",
            AlgorithmVariant::LocalDisperse => "local_disperse",
            AlgorithmVariant::BigFlip => "big_flip",
            AlgorithmVariant::BigDisperse => "big_disperse",
        };
        f.write_str(name)
    }
}

/// One dispatch of the sorting network.
///
/// `NoUninit` only: most `u32` values are not a valid `AlgorithmVariant`.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, NoUninit)]
pub struct StageParameters {
    /// Distance `h` between the two elements of a compare-exchange.
    pub span: u32,
    pub algorithm: AlgorithmVariant,
}

impl StageParameters {
    pub fn new(span: u32, algorithm: AlgorithmVariant) -> Self {
        Self { span, algorithm }
    }
}

impl fmt::Debug for StageParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.algorithm, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_two_packed_words() {
        assert_eq!(std::mem::size_of::<StageParameters>(), 8);
        let params = StageParameters::new(512, AlgorithmVariant::BigFlip);
        let words: [u32; 2] = bytemuck::cast(params);
        assert_eq!(words, [512, 2]);
    }

    #[test]
    fn local_variants_come_first() {
        assert!(AlgorithmVariant::LocalBitonicMergeSort.is_local());
        assert!(AlgorithmVariant::LocalDisperse.is_local());
        assert!(!AlgorithmVariant::BigFlip.is_local());
        assert!(!AlgorithmVariant::BigDisperse.is_local());
    }

    #[test]
    fn raw_variant_conversion() {
        for variant in AlgorithmVariant::ALL {
            assert_eq!(AlgorithmVariant::try_from(variant as u32).unwrap(), variant);
        }
        assert!(matches!(
            AlgorithmVariant::try_from(7),
            Err(PlanError::UnknownVariant(7))
        ));
    }
}
