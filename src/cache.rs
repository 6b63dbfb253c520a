//! Outcome cache: write-once memoization of oracle results
//!
//! The cache is keyed by content [`Fingerprint`]. Once an outcome is recorded
//! for a fingerprint it is never replaced; a later, different outcome for the
//! same content means the oracle is not deterministic, which is counted and
//! logged but otherwise ignored. Because every key is written at most once,
//! the only synchronization needed is the single insertion itself.
//!
//! A cache is scoped to one search by default. Callers that want to amortize
//! oracle cost across runs on the same input family construct it themselves,
//! pass it to every run, and optionally persist it with
//! [`OutcomeCache::save`] (see `persistence`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use log::warn;
use serde::Serialize;

use crate::outcome::{Fingerprint, Outcome};

/// Counters describing how a cache has been used
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    /// Records that disagreed with an already stored outcome
    pub conflicts: usize,
}

/// Thread-safe, monotonic fingerprint -> outcome map
#[derive(Debug, Default)]
pub struct OutcomeCache {
    entries: RwLock<HashMap<Fingerprint, Outcome>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    conflicts: AtomicUsize,
}

impl OutcomeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the stored outcome for a fingerprint
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<Outcome> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let found = entries.get(fingerprint).copied();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Record an outcome. Returns `true` if the fingerprint was new.
    ///
    /// Recording an already known fingerprint is a no-op; the stored outcome
    /// always wins.
    pub fn record(&self, fingerprint: Fingerprint, outcome: Outcome) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&fingerprint) {
            Some(&existing) => {
                if existing != outcome {
                    self.conflicts.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "non-deterministic oracle: {} recorded as {} but now classified {}; keeping {}",
                        fingerprint.short(),
                        existing,
                        outcome,
                        existing
                    );
                }
                false
            }
            None => {
                entries.insert(fingerprint, outcome);
                true
            }
        }
    }

    /// Look up without touching the hit/miss counters
    pub(crate) fn peek(&self, fingerprint: &Fingerprint) -> Option<Outcome> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(fingerprint)
            .copied()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries sorted by fingerprint
    pub fn entries(&self) -> Vec<(Fingerprint, Outcome)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<(Fingerprint, Outcome)> =
            entries.iter().map(|(fp, outcome)| (*fp, *outcome)).collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

impl FromIterator<(Fingerprint, Outcome)> for OutcomeCache {
    fn from_iter<I: IntoIterator<Item = (Fingerprint, Outcome)>>(iter: I) -> Self {
        let cache = OutcomeCache::new();
        for (fingerprint, outcome) in iter {
            cache.record(fingerprint, outcome);
        }
        cache
    }
}
