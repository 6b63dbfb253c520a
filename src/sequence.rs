//! Sequence minimization (ddmin) and failure-inducing difference isolation
//!
//! # Algorithm
//!
//! The minimizer keeps the smallest FAIL-confirmed sequence `S` and a
//! granularity `n` (the number of chunks `S` is cut into):
//!
//! 1. Partition `S` into `n` contiguous chunks; the last chunk absorbs the
//!    remainder.
//! 2. Try removing each chunk, left to right. The first removal that still
//!    FAILs is adopted and `n` becomes `max(2, n - 1)`.
//! 3. If no removal worked, try keeping each chunk alone. The first chunk
//!    that FAILs on its own is adopted and `n` resets to 2.
//! 4. If nothing worked and `n < |S|`, double `n` (capped at `|S|`) and
//!    retry. With `n == |S|` every single element has been tried: `S` is
//!    1-minimal and the search ends.
//!
//! PASS and UNRESOLVED probes are both rejections; the trace keeps them
//! apart. The number of oracle calls per round is O(n) because the first
//! success ends the round.

use std::ops::Range;

use log::{debug, info};

use crate::error::{MinimizeError, MinimizeResult};
use crate::oracle::Verdict;
use crate::outcome::{ContentHash, Outcome};
use crate::search::{Scan, SearchContext, TerminationReason};
use crate::trace::{Reduction, SearchTrace, Step};

/// What a minimizer hands back to the driver
#[derive(Debug, Clone)]
pub struct Minimized<C> {
    pub minimized: C,
    pub trace: SearchTrace<C>,
    pub termination: TerminationReason,
    /// Rounds (sequence) or passes (structured) started
    pub rounds: usize,
}

/// Split `0..len` into `n` contiguous ranges, the last taking the remainder.
///
/// Requires `1 <= n <= len`.
pub(crate) fn partition(len: usize, n: usize) -> Vec<Range<usize>> {
    debug_assert!(n >= 1 && n <= len);
    let size = len / n;
    (0..n)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == n { len } else { start + size };
            start..end
        })
        .collect()
}

fn without<T: Clone>(items: &[T], chunk: &Range<usize>) -> Vec<T> {
    let mut out = Vec::with_capacity(items.len() - chunk.len());
    out.extend_from_slice(&items[..chunk.start]);
    out.extend_from_slice(&items[chunk.end..]);
    out
}

/// Reduce `input` to a 1-minimal failing subsequence.
///
/// `input` must be non-empty and must FAIL under the context's oracle; the
/// entry check is the first oracle call of the search.
pub fn ddmin<T>(ctx: &SearchContext<'_, [T]>, input: Vec<T>) -> MinimizeResult<Minimized<Vec<T>>>
where
    T: Clone + ContentHash + Send + Sync,
{
    if input.is_empty() {
        return Err(MinimizeError::EmptyInput);
    }
    ctx.confirm(&input, Outcome::Fail)?;

    let original_len = input.len();
    let mut current = input;
    let mut trace = SearchTrace::new();
    let mut n = 2usize;
    let mut round = 0;

    let termination = loop {
        if current.len() <= 1 {
            break TerminationReason::Minimal;
        }
        if let Some(reason) = ctx.interrupted(round) {
            break reason;
        }
        round += 1;
        n = n.min(current.len());
        let chunks = partition(current.len(), n);

        let removal = ctx.scan(
            chunks.len(),
            |i| {
                let step = Step::RemoveChunk { index: i, granularity: n };
                (without(&current, &chunks[i]), step)
            },
            Outcome::is_fail,
            round,
            Some(&mut trace.rejections),
        );
        match removal {
            Scan::Found { index, candidate, step } => {
                debug!("round {}: removed chunk {}/{} -> {} elements", round, index, n, candidate.len());
                accept(&mut trace, &mut current, candidate, step, round)?;
                n = (n - 1).max(2);
                continue;
            }
            Scan::OutOfBudget => break TerminationReason::BudgetExceeded,
            Scan::Exhausted => {}
        }

        // With two chunks each subset is the other chunk's complement.
        if n > 2 {
            let subset = ctx.scan(
                chunks.len(),
                |i| {
                    let step = Step::KeepChunk { index: i, granularity: n };
                    (current[chunks[i].clone()].to_vec(), step)
                },
                Outcome::is_fail,
                round,
                Some(&mut trace.rejections),
            );
            match subset {
                Scan::Found { index, candidate, step } => {
                    debug!("round {}: kept chunk {}/{} alone -> {} elements", round, index, n, candidate.len());
                    accept(&mut trace, &mut current, candidate, step, round)?;
                    n = 2;
                    continue;
                }
                Scan::OutOfBudget => break TerminationReason::BudgetExceeded,
                Scan::Exhausted => {}
            }
        }

        if n >= current.len() {
            break TerminationReason::Minimal;
        }
        n = (2 * n).min(current.len());
        debug!("round {}: no reduction, granularity -> {}", round, n);
    };

    info!(
        "ddmin finished ({:?}): {} -> {} elements in {} rounds, {} oracle calls",
        termination,
        original_len,
        current.len(),
        round,
        ctx.adapter().calls()
    );

    Ok(Minimized {
        minimized: current,
        trace,
        termination,
        rounds: round,
    })
}

fn accept<T: Clone>(
    trace: &mut SearchTrace<Vec<T>>,
    current: &mut Vec<T>,
    candidate: Vec<T>,
    step: Step,
    round: usize,
) -> MinimizeResult<()> {
    if candidate.len() >= current.len() {
        return Err(MinimizeError::Invariant(format!(
            "accepted candidate of {} elements does not shrink {}",
            candidate.len(),
            current.len()
        )));
    }
    let after = candidate.clone();
    let before = std::mem::replace(current, candidate);
    trace.reductions.push(Reduction {
        before,
        after,
        outcome: Outcome::Fail,
        step,
        round,
    });
    Ok(())
}

/// Probe every single-element removal of `sequence`.
///
/// Returns the indices whose removal still FAILs (empty means the sequence
/// is 1-minimal), or `None` if the budget ran out before every probe ran.
pub fn probe_one_minimal<T>(ctx: &SearchContext<'_, [T]>, sequence: &[T]) -> Option<Vec<usize>>
where
    T: Clone + ContentHash + Send + Sync,
{
    if sequence.len() <= 1 {
        return Some(Vec::new());
    }
    let candidates: Vec<Vec<T>> = (0..sequence.len())
        .map(|i| without(sequence, &(i..i + 1)))
        .collect();

    let mut reducible = Vec::new();
    for (i, verdict) in ctx.classify_all(&candidates).into_iter().enumerate() {
        match verdict {
            Verdict::BudgetExhausted => return None,
            Verdict::Decided { outcome: Outcome::Fail, .. } => reducible.push(i),
            Verdict::Decided { .. } => {}
        }
    }
    Some(reducible)
}

/// Result of narrowing the difference between a passing and a failing input
#[derive(Debug, Clone)]
pub struct Isolation<T> {
    /// Largest known passing configuration
    pub passing: Vec<T>,
    /// Smallest known failing configuration
    pub failing: Vec<T>,
    /// Elements of `failing` that are not in `passing`
    pub difference: Vec<T>,
    /// Steps record the difference before and after each narrowing
    pub trace: SearchTrace<Vec<T>>,
    pub termination: TerminationReason,
    pub rounds: usize,
}

/// Find where `passing` embeds into `failing` (leftmost embedding)
fn embed<T: PartialEq>(passing: &[T], failing: &[T]) -> Option<Vec<usize>> {
    let mut positions = Vec::with_capacity(passing.len());
    let mut cursor = 0;
    for item in passing {
        let offset = failing[cursor..].iter().position(|x| x == item)?;
        positions.push(cursor + offset);
        cursor += offset + 1;
    }
    Some(positions)
}

fn select<T: Clone>(items: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| items[i].clone()).collect()
}

fn union(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out: Vec<usize> = a.iter().chain(b).copied().collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn minus(a: &[usize], b: &[usize]) -> Vec<usize> {
    a.iter().filter(|i| b.binary_search(i).is_err()).copied().collect()
}

/// Narrow the difference between a passing and a failing input until it is
/// 1-minimal: adding any single difference element to the passing side, or
/// removing it from the failing side, no longer flips the outcome.
///
/// `passing` must be a subsequence of `failing`, classify PASS, and
/// `failing` must classify FAIL.
pub fn isolate<T>(
    ctx: &SearchContext<'_, [T]>,
    passing: Vec<T>,
    failing: Vec<T>,
) -> MinimizeResult<Isolation<T>>
where
    T: Clone + ContentHash + PartialEq + Send + Sync,
{
    let embedding = embed(&passing, &failing).ok_or(MinimizeError::NotSubsequence)?;
    ctx.confirm(&passing, Outcome::Pass)?;
    ctx.confirm(&failing, Outcome::Fail)?;

    let mut c_pass = embedding;
    let mut c_fail: Vec<usize> = (0..failing.len()).collect();
    let mut trace = SearchTrace::new();
    let mut n = 2usize;
    let mut round = 0;

    let termination = loop {
        let delta = minus(&c_fail, &c_pass);
        if delta.len() <= 1 {
            break TerminationReason::Minimal;
        }
        if let Some(reason) = ctx.interrupted(round) {
            break reason;
        }
        round += 1;
        n = n.min(delta.len());
        let deltas: Vec<Vec<usize>> = partition(delta.len(), n)
            .into_iter()
            .map(|r| delta[r].to_vec())
            .collect();

        let grown = |i: usize| {
            let indices = union(&c_pass, &deltas[i]);
            let step = Step::GrowPassing { index: i, granularity: n };
            (select(&failing, &indices), step)
        };
        let shrunk = |i: usize| {
            let indices = minus(&c_fail, &deltas[i]);
            let step = Step::ShrinkFailing { index: i, granularity: n };
            (select(&failing, &indices), step)
        };

        // Rules in priority order: (passing + delta) FAILs, (failing - delta)
        // PASSes, (passing + delta) PASSes, (failing - delta) FAILs.
        let rules: [(bool, Outcome); 4] = [
            (true, Outcome::Fail),
            (false, Outcome::Pass),
            (true, Outcome::Pass),
            (false, Outcome::Fail),
        ];

        let mut narrowed = None;
        let mut out_of_budget = false;
        for (rule, &(grow, wanted)) in rules.iter().enumerate() {
            // Later rules re-read probes already logged by earlier ones.
            let log = if rule < 2 { Some(&mut trace.rejections) } else { None };
            let scan = if grow {
                ctx.scan(deltas.len(), &grown, |o| o == wanted, round, log)
            } else {
                ctx.scan(deltas.len(), &shrunk, |o| o == wanted, round, log)
            };
            match scan {
                Scan::Found { index, step, .. } => {
                    narrowed = Some((rule, index, step));
                    break;
                }
                Scan::OutOfBudget => {
                    out_of_budget = true;
                    break;
                }
                Scan::Exhausted => {}
            }
        }
        if out_of_budget {
            break TerminationReason::BudgetExceeded;
        }

        let Some((rule, index, step)) = narrowed else {
            if n >= delta.len() {
                break TerminationReason::Minimal;
            }
            n = (2 * n).min(delta.len());
            debug!("isolate round {}: no narrowing, granularity -> {}", round, n);
            continue;
        };

        let outcome = rules[rule].1;
        match rule {
            0 => {
                c_fail = union(&c_pass, &deltas[index]);
                n = 2;
            }
            1 => {
                c_pass = minus(&c_fail, &deltas[index]);
                n = 2;
            }
            2 => {
                c_pass = union(&c_pass, &deltas[index]);
                n = (n - 1).max(2);
            }
            _ => {
                c_fail = minus(&c_fail, &deltas[index]);
                n = (n - 1).max(2);
            }
        }

        let after = minus(&c_fail, &c_pass);
        if after.len() >= delta.len() {
            return Err(MinimizeError::Invariant(format!(
                "difference grew from {} to {} elements",
                delta.len(),
                after.len()
            )));
        }
        debug!(
            "isolate round {}: {:?} -> difference of {} elements",
            round,
            step,
            after.len()
        );
        trace.reductions.push(Reduction {
            before: select(&failing, &delta),
            after: select(&failing, &after),
            outcome,
            step,
            round,
        });
    };

    let difference = select(&failing, &minus(&c_fail, &c_pass));
    info!(
        "isolate finished ({:?}): difference of {} elements in {} rounds",
        termination,
        difference.len(),
        round
    );

    Ok(Isolation {
        passing: select(&failing, &c_pass),
        failing: select(&failing, &c_fail),
        difference,
        trace,
        termination,
        rounds: round,
    })
}
