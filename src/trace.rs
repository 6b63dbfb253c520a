//! Search trace: the ordered record of what a minimization run did
//!
//! Accepted reductions are the primary content: each holds the candidate
//! before and after the step and the outcome that justified it. Rejected
//! probes are kept separately and only as fingerprints, so callers can tell
//! "proven not to reproduce" (PASS) from "inconclusive" (UNRESOLVED) without
//! the trace holding a copy of every candidate ever tried.

use serde::Serialize;

use crate::outcome::{Fingerprint, Outcome};
use crate::tree::NodeId;

/// What kind of edit produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Step {
    /// Sequence chunk `index` of `granularity` removed
    RemoveChunk { index: usize, granularity: usize },
    /// Sequence chunk `index` of `granularity` kept alone
    KeepChunk { index: usize, granularity: usize },
    /// Tree node replaced by its alternative number `alternative`
    Replace { node: NodeId, alternative: usize },
    /// Tree node deleted through a deletion alternative
    Delete { node: NodeId, alternative: usize },
    /// Difference isolation: a delta added to the passing side
    GrowPassing { index: usize, granularity: usize },
    /// Difference isolation: a delta removed from the failing side
    ShrinkFailing { index: usize, granularity: usize },
}

/// One accepted step
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction<C> {
    pub before: C,
    pub after: C,
    pub outcome: Outcome,
    pub step: Step,
    /// Sequence round or structured pass in which the step was accepted
    pub round: usize,
}

/// A probe that did not lead to a reduction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub round: usize,
    pub step: Step,
    pub fingerprint: Fingerprint,
    pub size: usize,
    pub outcome: Outcome,
    pub cached: bool,
}

/// A structured alternative that could not even be turned into a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedAlternative {
    pub round: usize,
    pub node: NodeId,
    pub alternative: usize,
    pub reason: String,
}

/// Ordered log of a minimization run
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTrace<C> {
    pub reductions: Vec<Reduction<C>>,
    pub rejections: Vec<Rejection>,
    pub skipped: Vec<SkippedAlternative>,
}

impl<C> Default for SearchTrace<C> {
    fn default() -> Self {
        Self {
            reductions: Vec::new(),
            rejections: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<C> SearchTrace<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accepted(&self) -> usize {
        self.reductions.len()
    }

    /// Rejected probes the oracle could not decide
    pub fn unresolved(&self) -> impl Iterator<Item = &Rejection> {
        self.rejections
            .iter()
            .filter(|r| r.outcome == Outcome::Unresolved)
    }

    /// Rejected probes proven not to reproduce the failure
    pub fn passed(&self) -> impl Iterator<Item = &Rejection> {
        self.rejections.iter().filter(|r| r.outcome == Outcome::Pass)
    }

    /// Convert the stored candidates, e.g. to unwrap them into caller types
    pub fn map<D, F>(self, mut f: F) -> SearchTrace<D>
    where
        F: FnMut(C) -> D,
    {
        SearchTrace {
            reductions: self
                .reductions
                .into_iter()
                .map(|r| Reduction {
                    before: f(r.before),
                    after: f(r.after),
                    outcome: r.outcome,
                    step: r.step,
                    round: r.round,
                })
                .collect(),
            rejections: self.rejections,
            skipped: self.skipped,
        }
    }
}
