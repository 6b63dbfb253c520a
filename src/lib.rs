//! # deltadebug
//!
//! A delta debugging engine. Given an input that makes a test fail and an
//! oracle that classifies candidates as FAIL, PASS or UNRESOLVED, it searches
//! for a smaller input that still fails.
//!
//! Two minimizers share one search core:
//!
//! - [`sequence::ddmin`] reduces a flat sequence to a 1-minimal failing
//!   subsequence, and [`sequence::isolate`] narrows the difference between a
//!   passing and a failing sequence.
//! - [`structured::reduce_tree`] reduces a tree whose nodes carry replacement
//!   tables supplied by a grammar collaborator.
//!
//! Every probe goes through an [`OracleAdapter`] backed by an
//! [`OutcomeCache`], so equal candidates are tested once, panicking probes
//! become UNRESOLVED and the oracle call budget is enforced in one place.
//! [`SearchDriver`] ties this together behind a [`MinimizerConfig`].
//!
//! ```
//! use deltadebug::{MinimizerConfig, Outcome, SearchDriver};
//!
//! let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
//! let oracle = |s: &[u8]| if s.contains(&3) { Outcome::Fail } else { Outcome::Pass };
//! let report = driver.minimize_sequence(vec![1u8, 2, 3, 4, 5], &oracle).unwrap();
//! assert_eq!(report.minimized, vec![3]);
//! ```

pub mod cache;
pub mod driver;
pub mod error;
pub mod oracle;
pub mod outcome;
pub mod persistence;
pub mod search;
pub mod sequence;
pub mod structured;
pub mod trace;
pub mod tree;

// Re-export core types for easy access
pub use cache::{CacheStats, OutcomeCache};
pub use driver::{
    Input, IsolationReport, MinimizeReport, MinimizerConfig, SearchDriver, SearchStats, Strategy,
};
pub use error::{CacheError, CacheResult, MinimizeError, MinimizeResult};
pub use oracle::{Oracle, OracleAdapter, Verdict};
pub use outcome::{ContentHash, Extent, Fingerprint, Outcome};
pub use persistence::MergeSummary;
pub use search::{CancelToken, SearchContext, SearchLimits, TerminationReason};
pub use sequence::{Isolation, Minimized};
pub use trace::{Reduction, Rejection, SearchTrace, SkippedAlternative, Step};
pub use tree::{Node, NodeId, Replacement, TreeBuilder};
