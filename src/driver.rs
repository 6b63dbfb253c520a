//! Search driver: configuration, strategy dispatch and result reporting
//!
//! The driver owns nothing that outlives a call except its configuration and
//! cancellation token. Each `minimize_*` call builds an oracle adapter and a
//! search context, runs one minimizer and packages what it found together
//! with the statistics of the run. The `*_with_cache` variants take a caller
//! owned [`OutcomeCache`] so outcomes can be reused across runs.

use std::fmt;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cache::OutcomeCache;
use crate::error::{MinimizeError, MinimizeResult};
use crate::oracle::{Oracle, OracleAdapter};
use crate::outcome::{ContentHash, Extent};
use crate::search::{CancelToken, SearchContext, SearchLimits, TerminationReason};
use crate::sequence::{self, Isolation, Minimized};
use crate::structured;
use crate::trace::SearchTrace;
use crate::tree::Node;

/// Which minimizer to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// ddmin over a flat sequence
    Sequence,
    /// Replacement-table reduction over a tree
    Structured,
    /// Pick by the shape of the input
    #[default]
    Auto,
}

/// Configuration for a minimization run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerConfig {
    /// Maximum number of real oracle invocations, including the entry check
    pub max_oracle_calls: Option<usize>,

    /// Maximum sequence rounds or structured passes
    pub max_rounds: Option<usize>,

    pub strategy: Strategy,

    /// Maximum concurrent oracle invocations within one round
    pub parallelism: usize,

    /// Re-probe every single-element removal of a sequence result
    pub verify_minimality: bool,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            max_oracle_calls: None,
            max_rounds: None,
            strategy: Strategy::Auto,
            parallelism: 1,
            verify_minimality: false,
        }
    }
}

impl MinimizerConfig {
    /// Parse a JSON configuration; omitted fields take their defaults
    pub fn from_json(json: &str) -> MinimizeResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| MinimizeError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> MinimizeResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| MinimizeError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> MinimizeResult<()> {
        if self.parallelism == 0 {
            return Err(MinimizeError::InvalidConfig(
                "parallelism must be at least 1".to_string(),
            ));
        }
        if self.max_oracle_calls == Some(0) {
            return Err(MinimizeError::InvalidConfig(
                "max_oracle_calls must allow the entry check".to_string(),
            ));
        }
        Ok(())
    }
}

/// Input of either shape, for callers that let the driver choose
#[derive(Debug, Clone, PartialEq)]
pub enum Input<T, P> {
    Sequence(Vec<T>),
    Tree(Node<P>),
}

impl<T, P> Input<T, P> {
    /// Sequence length or tree node count
    pub fn size(&self) -> usize {
        match self {
            Input::Sequence(items) => items.len(),
            Input::Tree(tree) => tree.size(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Input::Sequence(_) => "sequence",
            Input::Tree(_) => "tree",
        }
    }
}

/// Statistics of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchStats {
    /// Real oracle invocations, entry check included
    pub oracle_calls: usize,
    pub cache_hits: usize,
    pub oracle_panics: usize,
    pub rounds: usize,
    pub accepted_steps: usize,
    pub original_size: usize,
    pub minimized_size: usize,
    /// `minimized_size / original_size`
    pub reduction_ratio: f64,
    pub wall_time: Duration,
    /// Outcome of the 1-minimality probe, when it ran to completion
    pub one_minimal: Option<bool>,
}

impl SearchStats {
    fn collect<K: ContentHash + ?Sized>(
        adapter: &OracleAdapter<'_, K>,
        rounds: usize,
        accepted_steps: usize,
        original_size: usize,
        minimized_size: usize,
        started: Instant,
    ) -> Self {
        Self {
            oracle_calls: adapter.calls(),
            cache_hits: adapter.cache_hits(),
            oracle_panics: adapter.panics(),
            rounds,
            accepted_steps,
            original_size,
            minimized_size,
            reduction_ratio: minimized_size as f64 / original_size.max(1) as f64,
            wall_time: started.elapsed(),
            one_minimal: None,
        }
    }
}

/// Result of a minimization run: the smallest FAIL-confirmed input found
#[derive(Debug, Clone)]
pub struct MinimizeReport<C> {
    pub minimized: C,
    pub trace: SearchTrace<C>,
    pub stats: SearchStats,
    pub termination: TerminationReason,
}

impl<C> MinimizeReport<C> {
    /// Convert the stored inputs, keeping stats and termination
    pub fn map<D, F>(self, mut f: F) -> MinimizeReport<D>
    where
        F: FnMut(C) -> D,
    {
        MinimizeReport {
            minimized: f(self.minimized),
            trace: self.trace.map(&mut f),
            stats: self.stats,
            termination: self.termination,
        }
    }
}

impl<C> fmt::Display for MinimizeReport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({:.1}% of original), {} oracle calls, {} rounds, {}",
            self.stats.original_size,
            self.stats.minimized_size,
            self.stats.reduction_ratio * 100.0,
            self.stats.oracle_calls,
            self.stats.rounds,
            self.termination
        )
    }
}

/// Result of narrowing a pass/fail difference
#[derive(Debug, Clone)]
pub struct IsolationReport<T> {
    pub isolation: Isolation<T>,
    /// Sizes refer to the difference between the two sides
    pub stats: SearchStats,
}

/// Runs minimizations under one configuration
#[derive(Debug, Clone)]
pub struct SearchDriver {
    config: MinimizerConfig,
    cancel: CancelToken,
}

impl SearchDriver {
    pub fn new(config: MinimizerConfig) -> MinimizeResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &MinimizerConfig {
        &self.config
    }

    /// Token that stops running and future searches of this driver at
    /// their next round boundary
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    fn context<'a, C>(
        &self,
        oracle: &'a dyn Oracle<C>,
        cache: &'a OutcomeCache,
    ) -> MinimizeResult<SearchContext<'a, C>>
    where
        C: ContentHash + Extent + ?Sized + Sync,
    {
        let adapter = OracleAdapter::new(oracle, cache).with_budget(self.config.max_oracle_calls);
        let limits = SearchLimits {
            max_rounds: self.config.max_rounds,
            cancel: Some(self.cancel.clone()),
        };
        SearchContext::new(adapter, self.config.parallelism, limits)
    }

    fn require(&self, wanted: Strategy, input: &'static str) -> MinimizeResult<()> {
        match self.config.strategy {
            Strategy::Auto => Ok(()),
            strategy if strategy == wanted => Ok(()),
            strategy => Err(MinimizeError::StrategyMismatch { strategy, input }),
        }
    }

    pub fn minimize_sequence<T>(
        &self,
        input: Vec<T>,
        oracle: &dyn Oracle<[T]>,
    ) -> MinimizeResult<MinimizeReport<Vec<T>>>
    where
        T: Clone + ContentHash + Send + Sync,
    {
        self.minimize_sequence_with_cache(input, oracle, &OutcomeCache::new())
    }

    /// Minimize a failing sequence, reading and filling `cache`
    pub fn minimize_sequence_with_cache<T>(
        &self,
        input: Vec<T>,
        oracle: &dyn Oracle<[T]>,
        cache: &OutcomeCache,
    ) -> MinimizeResult<MinimizeReport<Vec<T>>>
    where
        T: Clone + ContentHash + Send + Sync,
    {
        self.require(Strategy::Sequence, "sequence")?;
        let started = Instant::now();
        let original_size = input.len();
        info!(
            "minimizing sequence of {} elements (parallelism {}, {} cached outcomes)",
            original_size,
            self.config.parallelism,
            cache.len()
        );

        let ctx = self.context(oracle, cache)?;
        let run = sequence::ddmin(&ctx, input)?;

        let one_minimal = if self.config.verify_minimality && run.termination == TerminationReason::Minimal {
            let reducible = sequence::probe_one_minimal(&ctx, &run.minimized);
            debug!("1-minimality probe: {:?}", reducible);
            reducible.map(|indices| indices.is_empty())
        } else {
            None
        };

        let mut report = finish(run, ctx.adapter(), original_size, started);
        report.stats.one_minimal = one_minimal;
        info!("sequence minimization: {}", report);
        Ok(report)
    }

    pub fn minimize_tree<P>(
        &self,
        input: Node<P>,
        oracle: &dyn Oracle<Node<P>>,
    ) -> MinimizeResult<MinimizeReport<Node<P>>>
    where
        P: Clone + ContentHash + Send + Sync,
    {
        self.minimize_tree_with_cache(input, oracle, &OutcomeCache::new())
    }

    /// Minimize a failing tree, reading and filling `cache`
    pub fn minimize_tree_with_cache<P>(
        &self,
        input: Node<P>,
        oracle: &dyn Oracle<Node<P>>,
        cache: &OutcomeCache,
    ) -> MinimizeResult<MinimizeReport<Node<P>>>
    where
        P: Clone + ContentHash + Send + Sync,
    {
        self.require(Strategy::Structured, "tree")?;
        let started = Instant::now();
        let original_size = input.size();
        info!(
            "minimizing tree of {} nodes (parallelism {}, {} cached outcomes)",
            original_size,
            self.config.parallelism,
            cache.len()
        );

        let ctx = self.context(oracle, cache)?;
        let run = structured::reduce_tree(&ctx, input)?;
        let report = finish(run, ctx.adapter(), original_size, started);
        info!("tree minimization: {}", report);
        Ok(report)
    }

    /// Minimize an input of either shape. The oracle always sees the same
    /// shape it was given.
    pub fn minimize<T, P>(
        &self,
        input: Input<T, P>,
        oracle: &dyn Oracle<Input<T, P>>,
    ) -> MinimizeResult<MinimizeReport<Input<T, P>>>
    where
        T: Clone + ContentHash + Send + Sync,
        P: Clone + ContentHash + Send + Sync,
    {
        self.minimize_with_cache(input, oracle, &OutcomeCache::new())
    }

    pub fn minimize_with_cache<T, P>(
        &self,
        input: Input<T, P>,
        oracle: &dyn Oracle<Input<T, P>>,
        cache: &OutcomeCache,
    ) -> MinimizeResult<MinimizeReport<Input<T, P>>>
    where
        T: Clone + ContentHash + Send + Sync,
        P: Clone + ContentHash + Send + Sync,
    {
        debug!("strategy {:?} on a {} input", self.config.strategy, input.kind());
        match input {
            Input::Sequence(items) => {
                let as_sequence = |s: &[T]| oracle.test(&Input::Sequence(s.to_vec()));
                let report = self.minimize_sequence_with_cache(items, &as_sequence, cache)?;
                Ok(report.map(Input::Sequence))
            }
            Input::Tree(tree) => {
                let as_tree = |t: &Node<P>| oracle.test(&Input::Tree(t.clone()));
                let report = self.minimize_tree_with_cache(tree, &as_tree, cache)?;
                Ok(report.map(Input::Tree))
            }
        }
    }

    pub fn isolate<T>(
        &self,
        passing: Vec<T>,
        failing: Vec<T>,
        oracle: &dyn Oracle<[T]>,
    ) -> MinimizeResult<IsolationReport<T>>
    where
        T: Clone + ContentHash + PartialEq + Send + Sync,
    {
        self.isolate_with_cache(passing, failing, oracle, &OutcomeCache::new())
    }

    /// Narrow the difference between a passing sequence and a failing
    /// sequence that contains it
    pub fn isolate_with_cache<T>(
        &self,
        passing: Vec<T>,
        failing: Vec<T>,
        oracle: &dyn Oracle<[T]>,
        cache: &OutcomeCache,
    ) -> MinimizeResult<IsolationReport<T>>
    where
        T: Clone + ContentHash + PartialEq + Send + Sync,
    {
        self.require(Strategy::Sequence, "sequence")?;
        let started = Instant::now();
        let original_size = failing.len().saturating_sub(passing.len());
        info!(
            "isolating a difference of {} elements ({} passing, {} failing)",
            original_size,
            passing.len(),
            failing.len()
        );

        let ctx = self.context(oracle, cache)?;
        let isolation = sequence::isolate(&ctx, passing, failing)?;
        let stats = SearchStats::collect(
            ctx.adapter(),
            isolation.rounds,
            isolation.trace.accepted(),
            original_size,
            isolation.difference.len(),
            started,
        );
        info!(
            "isolation finished ({}): difference {} -> {} in {} oracle calls",
            isolation.termination, original_size, stats.minimized_size, stats.oracle_calls
        );
        Ok(IsolationReport { isolation, stats })
    }
}

fn finish<C, K>(
    run: Minimized<C>,
    adapter: &OracleAdapter<'_, K>,
    original_size: usize,
    started: Instant,
) -> MinimizeReport<C>
where
    C: Extent,
    K: ContentHash + ?Sized,
{
    let stats = SearchStats::collect(
        adapter,
        run.rounds,
        run.trace.accepted(),
        original_size,
        run.minimized.extent(),
        started,
    );
    MinimizeReport {
        minimized: run.minimized,
        trace: run.trace,
        stats,
        termination: run.termination,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Outcome;
    use crate::tree::{Replacement, TreeBuilder};

    fn contains_c(s: &[char]) -> Outcome {
        if s.contains(&'c') {
            Outcome::Fail
        } else {
            Outcome::Pass
        }
    }

    #[test]
    fn test_config_defaults_and_json() {
        let config = MinimizerConfig::from_json("{}").unwrap();
        assert_eq!(config, MinimizerConfig::default());

        let config =
            MinimizerConfig::from_json(r#"{"max_oracle_calls": 50, "strategy": "structured", "parallelism": 4}"#)
                .unwrap();
        assert_eq!(config.max_oracle_calls, Some(50));
        assert_eq!(config.strategy, Strategy::Structured);
        assert_eq!(config.parallelism, 4);
        assert!(!config.verify_minimality);

        let back = MinimizerConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_config_rejects_invalid_values() {
        assert!(matches!(
            MinimizerConfig::from_json(r#"{"parallelism": 0}"#),
            Err(MinimizeError::InvalidConfig(_))
        ));
        assert!(matches!(
            MinimizerConfig::from_json(r#"{"strategy": "random"}"#),
            Err(MinimizeError::InvalidConfig(_))
        ));
        let config = MinimizerConfig {
            max_oracle_calls: Some(0),
            ..MinimizerConfig::default()
        };
        assert!(SearchDriver::new(config).is_err());
    }

    #[test]
    fn test_budget_of_one_returns_original() {
        let config = MinimizerConfig {
            max_oracle_calls: Some(1),
            ..MinimizerConfig::default()
        };
        let driver = SearchDriver::new(config).unwrap();
        let input: Vec<char> = "abcdefgh".chars().collect();

        let report = driver.minimize_sequence(input.clone(), &contains_c).unwrap();
        assert_eq!(report.termination, TerminationReason::BudgetExceeded);
        assert_eq!(report.minimized, input);
        assert_eq!(report.stats.oracle_calls, 1);
        assert_eq!(report.stats.accepted_steps, 0);
        assert_eq!(report.stats.reduction_ratio, 1.0);
    }

    #[test]
    fn test_stats_and_display() {
        let config = MinimizerConfig {
            verify_minimality: true,
            ..MinimizerConfig::default()
        };
        let driver = SearchDriver::new(config).unwrap();
        let input: Vec<char> = "abcdefgh".chars().collect();

        let report = driver.minimize_sequence(input, &contains_c).unwrap();
        assert_eq!(report.minimized, vec!['c']);
        assert_eq!(report.stats.original_size, 8);
        assert_eq!(report.stats.minimized_size, 1);
        assert_eq!(report.stats.reduction_ratio, 0.125);
        assert_eq!(report.stats.one_minimal, Some(true));
        assert_eq!(report.stats.accepted_steps, report.trace.accepted());

        let line = report.to_string();
        assert!(line.starts_with("8 -> 1 (12.5% of original)"), "{}", line);
        assert!(line.ends_with("minimal"), "{}", line);
    }

    #[test]
    fn test_strategy_mismatch() {
        let config = MinimizerConfig {
            strategy: Strategy::Structured,
            ..MinimizerConfig::default()
        };
        let driver = SearchDriver::new(config).unwrap();
        let err = driver.minimize_sequence(vec!['c'], &contains_c).unwrap_err();
        assert!(matches!(
            err,
            MinimizeError::StrategyMismatch {
                strategy: Strategy::Structured,
                input: "sequence"
            }
        ));
    }

    #[test]
    fn test_auto_dispatch_on_input_shape() {
        let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
        let oracle = |input: &Input<char, String>| match input {
            Input::Sequence(items) => contains_c(items),
            Input::Tree(tree) if tree.contains(|n| n.payload() == "c") => Outcome::Fail,
            Input::Tree(_) => Outcome::Pass,
        };

        let sequence = Input::Sequence("xcz".chars().collect());
        let report = driver.minimize(sequence, &oracle).unwrap();
        assert_eq!(report.minimized, Input::Sequence(vec!['c']));
        assert!(report
            .trace
            .reductions
            .iter()
            .all(|r| r.after.size() < r.before.size()));

        let mut b = TreeBuilder::new();
        let c = b.leaf("c".to_string());
        let d = b.leaf("d".to_string()).with_alternatives(vec![Replacement::Delete]);
        let tree = b.node("pair".to_string(), vec![c, d]);
        let report = driver.minimize(Input::Tree(tree), &oracle).unwrap();
        match report.minimized {
            Input::Tree(tree) => assert_eq!(tree.to_string(), "(pair c)"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_cancelled_driver_returns_input() {
        let driver = SearchDriver::new(MinimizerConfig::default()).unwrap();
        driver.cancel_token().cancel();
        let input: Vec<char> = "abcdefgh".chars().collect();
        let report = driver.minimize_sequence(input.clone(), &contains_c).unwrap();
        assert_eq!(report.termination, TerminationReason::Cancelled);
        assert_eq!(report.minimized, input);
    }
}
