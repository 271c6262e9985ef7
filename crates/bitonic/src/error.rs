use thiserror::Error;

/// Rejected sort geometry or an inconsistent plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("cannot sort {len} elements, the network needs at least 2")]
    TooShort { len: u32 },
    #[error("array length {len} is not a power of two")]
    NotPowerOfTwo { len: u32 },
    #[error("maximum workgroup size must be at least 1")]
    ZeroWorkgroupSize,
    #[error("closed-form stage count {expected} disagrees with {emitted} generated stages")]
    StageCountMismatch { expected: u32, emitted: u32 },
    #[error("unknown algorithm variant {0}")]
    UnknownVariant(u32),
}

/// Misuse of the parameter buffer while recording a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("parameter buffer holds {capacity} stages, cannot record another")]
    CapacityExceeded { capacity: u32 },
    #[error("batch finished after {recorded} of {capacity} planned stages")]
    Incomplete { recorded: u32, capacity: u32 },
    #[error("parameter slot {slot} lies beyond the 32-bit dynamic offset range")]
    OffsetOverflow { slot: u32 },
}
