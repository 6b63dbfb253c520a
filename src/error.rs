//! Error taxonomy for minimization runs.
//!
//! Only problems the caller has to act on surface here. Per-candidate
//! trouble (an UNRESOLVED probe, a replacement that cannot be spliced in,
//! an exhausted budget) is absorbed by the search loop and reported through
//! the trace and the termination reason instead.

use std::io;

use crate::driver::Strategy;
use crate::outcome::Outcome;

/// Type alias for minimization results
pub type MinimizeResult<T> = Result<T, MinimizeError>;

/// Type alias for cache persistence results
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors surfaced to the caller of a minimization run
#[derive(Debug, thiserror::Error)]
pub enum MinimizeError {
    /// The original input does not reproduce the failure (or, for
    /// difference isolation, the passing input does not pass).
    #[error("precondition violated: input classified {outcome}, expected {expected}")]
    PreconditionViolation { outcome: Outcome, expected: Outcome },

    #[error("precondition violated: cannot minimize an empty input")]
    EmptyInput,

    /// The oracle budget ran out before the entry check could run.
    #[error("precondition violated: oracle budget exhausted before the input was confirmed")]
    Unconfirmed,

    #[error("passing input is not a subsequence of the failing input")]
    NotSubsequence,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("strategy {strategy:?} cannot be applied to a {input} input")]
    StrategyMismatch { strategy: Strategy, input: &'static str },

    #[error("outcome cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("internal invariant violated: {0}")]
    Invariant(String),

    #[error("failed to create thread pool: {0}")]
    ThreadPool(String),
}

/// Errors raised while persisting or restoring an outcome cache
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cache corruption: {0}")]
    Corruption(String),
}
