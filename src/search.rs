//! Shared search machinery: limits, cancellation and candidate scanning
//!
//! Both minimizers work the same way at the level of a single round: they
//! produce an ordered list of candidates and need the *first* one (in that
//! order) whose outcome satisfies some condition. [`SearchContext::scan`]
//! answers exactly that question, either one probe at a time or in batches
//! on a bounded thread pool. Batches are resolved strictly left to right
//! after every probe in them has finished, so the accepted candidate never
//! depends on which oracle call happened to return first.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{MinimizeError, MinimizeResult};
use crate::oracle::{OracleAdapter, Verdict};
use crate::outcome::{ContentHash, Extent, Outcome};
use crate::trace::{Rejection, Step};

/// Why a search stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// No further reduction is possible (1-minimal sequence, irreducible tree)
    Minimal,
    /// Oracle call or round budget ran out; the result is the best so far
    BudgetExceeded,
    /// Stopped on request; the result is the best so far
    Cancelled,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            TerminationReason::Minimal => "minimal",
            TerminationReason::BudgetExceeded => "budget exceeded",
            TerminationReason::Cancelled => "cancelled",
        };
        f.write_str(reason)
    }
}

/// Cooperative cancellation flag, checked at round boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Limits that end a search early with the best result so far
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Maximum sequence rounds / structured passes
    pub max_rounds: Option<usize>,
    pub cancel: Option<CancelToken>,
}

/// Result of scanning an ordered list of candidates
#[derive(Debug)]
pub(crate) enum Scan<K> {
    /// The leftmost candidate whose outcome matched
    Found { index: usize, candidate: K, step: Step },
    /// No candidate matched
    Exhausted,
    /// A probe was refused by the budget before any match was found
    OutOfBudget,
}

/// Everything a minimizer needs to classify candidates within one search
pub struct SearchContext<'a, C: ?Sized> {
    adapter: OracleAdapter<'a, C>,
    pool: Option<rayon::ThreadPool>,
    parallelism: usize,
    limits: SearchLimits,
}

impl<'a, C> SearchContext<'a, C>
where
    C: ContentHash + Extent + ?Sized + Sync,
{
    /// Create a context evaluating up to `parallelism` probes at a time
    pub fn new(
        adapter: OracleAdapter<'a, C>,
        parallelism: usize,
        limits: SearchLimits,
    ) -> MinimizeResult<Self> {
        if parallelism == 0 {
            return Err(MinimizeError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }

        let pool = if parallelism > 1 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(parallelism)
                    .thread_name(|i| format!("deltadebug-probe-{}", i))
                    .build()
                    .map_err(|e| MinimizeError::ThreadPool(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            adapter,
            pool,
            parallelism,
            limits,
        })
    }

    pub fn adapter(&self) -> &OracleAdapter<'a, C> {
        &self.adapter
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Check the entry precondition: `input` must classify as `expected`
    pub(crate) fn confirm(&self, input: &C, expected: Outcome) -> MinimizeResult<()> {
        match self.adapter.classify(input) {
            Verdict::BudgetExhausted => Err(MinimizeError::Unconfirmed),
            Verdict::Decided { outcome, .. } if outcome == expected => Ok(()),
            Verdict::Decided { outcome, .. } => {
                info!("precondition check: input classified {}, expected {}", outcome, expected);
                Err(MinimizeError::PreconditionViolation { outcome, expected })
            }
        }
    }

    /// Termination reason if the search must stop before starting round
    /// `rounds_done + 1`
    pub(crate) fn interrupted(&self, rounds_done: usize) -> Option<TerminationReason> {
        if self.is_cancelled() {
            return Some(TerminationReason::Cancelled);
        }
        match self.limits.max_rounds {
            Some(max) if rounds_done >= max => {
                debug!("round limit {} reached", max);
                Some(TerminationReason::BudgetExceeded)
            }
            _ => None,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.limits
            .cancel
            .as_ref()
            .map_or(false, CancelToken::is_cancelled)
    }

    /// Find the leftmost of `count` candidates whose outcome satisfies
    /// `wanted`. Candidates are built on demand by `build`. Probes that are
    /// passed over are appended to `rejections` when given.
    pub(crate) fn scan<K, B, W>(
        &self,
        count: usize,
        build: B,
        wanted: W,
        round: usize,
        mut rejections: Option<&mut Vec<Rejection>>,
    ) -> Scan<K>
    where
        K: Borrow<C> + Sync,
        B: Fn(usize) -> (K, Step),
        W: Fn(Outcome) -> bool,
    {
        let mut start = 0;
        while start < count {
            let end = (start + self.parallelism).min(count);
            let (candidates, steps): (Vec<K>, Vec<Step>) = (start..end).map(&build).unzip();
            let verdicts = self.evaluate(&candidates);

            let probes = candidates.into_iter().zip(steps).zip(verdicts);
            for (offset, ((candidate, step), verdict)) in probes.enumerate() {
                match verdict {
                    Verdict::BudgetExhausted => return Scan::OutOfBudget,
                    Verdict::Decided { outcome, .. } if wanted(outcome) => {
                        return Scan::Found {
                            index: start + offset,
                            candidate,
                            step,
                        };
                    }
                    Verdict::Decided {
                        outcome,
                        fingerprint,
                        cached,
                    } => {
                        if let Some(log) = rejections.as_deref_mut() {
                            log.push(Rejection {
                                round,
                                step,
                                fingerprint,
                                size: candidate.borrow().extent(),
                                outcome,
                                cached,
                            });
                        }
                    }
                }
            }
            start = end;
        }
        Scan::Exhausted
    }

    /// Classify every candidate (no short-circuit), in order
    pub(crate) fn classify_all<K>(&self, candidates: &[K]) -> Vec<Verdict>
    where
        K: Borrow<C> + Sync,
    {
        candidates
            .chunks(self.parallelism)
            .flat_map(|batch| self.evaluate(batch))
            .collect()
    }

    /// Classify one batch. Fingerprint-equal candidates are probed once.
    fn evaluate<K>(&self, batch: &[K]) -> Vec<Verdict>
    where
        K: Borrow<C> + Sync,
    {
        let pool = match &self.pool {
            Some(pool) if batch.len() > 1 => pool,
            _ => {
                return batch
                    .iter()
                    .map(|k| self.adapter.classify(k.borrow()))
                    .collect();
            }
        };

        let fingerprints: Vec<_> = batch.iter().map(|k| k.borrow().fingerprint()).collect();
        let mut first_seen = HashMap::new();
        let mut unique = Vec::new();
        for (i, fp) in fingerprints.iter().enumerate() {
            first_seen.entry(*fp).or_insert_with(|| {
                unique.push(i);
                i
            });
        }

        let decided: Vec<Verdict> = pool.install(|| {
            unique
                .par_iter()
                .map(|&i| self.adapter.classify_with(fingerprints[i], batch[i].borrow()))
                .collect()
        });
        let by_index: HashMap<usize, Verdict> = unique.iter().copied().zip(decided).collect();

        fingerprints
            .iter()
            .enumerate()
            .map(|(i, fp)| {
                let owner = first_seen[fp];
                let verdict = by_index[&owner];
                match verdict {
                    Verdict::Decided {
                        outcome,
                        fingerprint,
                        ..
                    } if owner != i => Verdict::Decided {
                        outcome,
                        fingerprint,
                        cached: true,
                    },
                    other => other,
                }
            })
            .collect()
    }
}
