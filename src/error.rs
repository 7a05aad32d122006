use thiserror::Error;

/// Errors from the fallible allocation path. Exhaustion is a hard failure:
/// callers get an `Err`, never a silently empty handle.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error("node pool exhausted: all {capacity} slots are live")]
    Exhausted { capacity: u32 },

    #[error("node of {size} bytes does not fit a {slot_size}-byte slot")]
    NodeTooLarge { size: usize, slot_size: usize },

    #[error("node alignment {align} exceeds the slot alignment {slot_align}")]
    AlignmentUnsupported { align: usize, slot_align: usize },

    #[error("memory resource refused a {size}-byte slot")]
    ResourceExhausted { size: usize },
}

/// Errors from the pool configuration entry points.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("pool already in use: configuration must happen before the first allocation")]
    PoolInUse,

    #[error("invalid slot size: {size} bytes")]
    InvalidSlotSize { size: usize },
}
