//! Error types for the toolkit.
//!
//! None of the primitives fail on valid input. What remains is invalid
//! configuration and lock misuse. Misuse is reported through the `try_*`
//! entry points; the plain entry points panic with the same message.

/// Error returned when building a configuration with out-of-range values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A merge forwarder must wait on at least two inputs.
    #[error("fan-in width must be at least 2, got {0}")]
    InvalidFanInWidth(usize),

    /// Channel capacities must be non-zero.
    #[error("merge buffer size must be non-zero")]
    ZeroBuffer,
}

/// Error returned when releasing a keyed lock that is not held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    /// `unlock` without a matching `lock`.
    #[error("unlock of a keyed lock that is not write-locked")]
    NotWriteLocked,

    /// `runlock` without a matching `rlock`.
    #[error("runlock of a keyed lock that is not read-locked")]
    NotReadLocked,
}
