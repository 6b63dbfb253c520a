//! Oracle adapter: three-valued classification with caching and budgets
//!
//! The oracle is the externally supplied test function. It is the only
//! expensive operation in a search, so the adapter makes sure it runs at most
//! once per distinct candidate content, never more often than the configured
//! budget allows, and never lets a panicking probe tear down the search.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{trace, warn};

use crate::cache::OutcomeCache;
use crate::outcome::{ContentHash, Fingerprint, Outcome};

/// A black-box test classifying candidates as FAIL, PASS or UNRESOLVED.
///
/// Must be total and should be deterministic: equal candidates are only ever
/// tested once, so a flaky oracle silently keeps whichever answer came first.
/// Any `Fn(&C) -> Outcome + Sync` closure is an oracle.
pub trait Oracle<C: ?Sized>: Sync {
    fn test(&self, candidate: &C) -> Outcome;
}

impl<C: ?Sized, F> Oracle<C> for F
where
    F: Fn(&C) -> Outcome + Sync,
{
    fn test(&self, candidate: &C) -> Outcome {
        self(candidate)
    }
}

/// Answer from [`OracleAdapter::classify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Decided {
        outcome: Outcome,
        fingerprint: Fingerprint,
        /// Answered from the cache without running the oracle
        cached: bool,
    },
    /// The oracle call budget is spent and the cache had no answer
    BudgetExhausted,
}

impl Verdict {
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Verdict::Decided { outcome, .. } => Some(*outcome),
            Verdict::BudgetExhausted => None,
        }
    }

    pub fn is_fail(&self) -> bool {
        self.outcome() == Some(Outcome::Fail)
    }
}

/// Wraps an oracle into the cached, budgeted, panic-safe classification
/// contract used by the minimizers.
pub struct OracleAdapter<'a, C: ?Sized> {
    oracle: &'a dyn Oracle<C>,
    cache: &'a OutcomeCache,
    max_calls: Option<usize>,
    calls: AtomicUsize,
    cache_hits: AtomicUsize,
    panics: AtomicUsize,
}

impl<'a, C> OracleAdapter<'a, C>
where
    C: ContentHash + ?Sized,
{
    pub fn new(oracle: &'a dyn Oracle<C>, cache: &'a OutcomeCache) -> Self {
        Self {
            oracle,
            cache,
            max_calls: None,
            calls: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            panics: AtomicUsize::new(0),
        }
    }

    /// Limit the number of real oracle invocations (cache hits are free)
    pub fn with_budget(mut self, max_calls: Option<usize>) -> Self {
        self.max_calls = max_calls;
        self
    }

    /// Classify a candidate
    pub fn classify(&self, candidate: &C) -> Verdict {
        self.classify_with(candidate.fingerprint(), candidate)
    }

    /// Classify a candidate whose fingerprint the caller already computed
    pub(crate) fn classify_with(&self, fingerprint: Fingerprint, candidate: &C) -> Verdict {
        if let Some(outcome) = self.cache.lookup(&fingerprint) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            trace!("probe {} -> {} (cached)", fingerprint.short(), outcome);
            return Verdict::Decided {
                outcome,
                fingerprint,
                cached: true,
            };
        }

        if !self.reserve_call() {
            trace!("probe {} refused: oracle budget exhausted", fingerprint.short());
            return Verdict::BudgetExhausted;
        }

        let outcome = match catch_unwind(AssertUnwindSafe(|| self.oracle.test(candidate))) {
            Ok(outcome) => outcome,
            Err(payload) => {
                self.panics.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "oracle panicked on {} ({}); treating as UNRESOLVED",
                    fingerprint.short(),
                    panic_message(&payload)
                );
                Outcome::Unresolved
            }
        };

        self.cache.record(fingerprint, outcome);
        // A racing probe of the same content may have recorded first.
        let outcome = self.cache.peek(&fingerprint).unwrap_or(outcome);
        trace!("probe {} -> {}", fingerprint.short(), outcome);

        Verdict::Decided {
            outcome,
            fingerprint,
            cached: false,
        }
    }

    fn reserve_call(&self) -> bool {
        match self.max_calls {
            None => {
                self.calls.fetch_add(1, Ordering::SeqCst);
                true
            }
            Some(limit) => self
                .calls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                    (used < limit).then_some(used + 1)
                })
                .is_ok(),
        }
    }

    /// Number of times the underlying oracle actually ran
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Oracle invocations that panicked and were reported as UNRESOLVED
    pub fn panics(&self) -> usize {
        self.panics.load(Ordering::Relaxed)
    }

    pub fn budget_exhausted(&self) -> bool {
        self.max_calls.map_or(false, |limit| self.calls() >= limit)
    }

    pub fn cache(&self) -> &OutcomeCache {
        self.cache
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
