//! Structured minimization over trees with replacement tables
//!
//! A pass walks the tree in pre-order. At each node the replacement table is
//! tried largest alternative first; the first alternative that still FAILs
//! is spliced in and the walk continues from the replacement itself, so its
//! own table and children are the new frontier. A node with no working
//! alternative is left alone and its children are visited.
//!
//! Accepted substitutions are batched within a pass: the walk does not
//! restart from the root after each one. Passes repeat until one accepts
//! nothing, at which point the tree is irreducible under its tables.

use std::cmp::Reverse;
use std::collections::HashSet;

use log::{debug, info, warn};

use crate::error::{MinimizeError, MinimizeResult};
use crate::outcome::{ContentHash, Outcome};
use crate::search::{Scan, SearchContext, TerminationReason};
use crate::sequence::Minimized;
use crate::trace::{Reduction, SearchTrace, SkippedAlternative, Step};
use crate::tree::{Node, NodeId, Replacement};

/// What happened to the node a visit started at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Kept,
    Removed,
}

/// Reasons a pass ends before reaching the last node
#[derive(Debug)]
enum Halt {
    Stop(TerminationReason),
    Error(MinimizeError),
}

impl From<MinimizeError> for Halt {
    fn from(err: MinimizeError) -> Self {
        Halt::Error(err)
    }
}

struct TreeReduction<'c, 'a, P> {
    ctx: &'c SearchContext<'a, Node<P>>,
    current: Node<P>,
    trace: SearchTrace<Node<P>>,
    pass: usize,
    /// (node, alternative) pairs already reported as unusable
    reported: HashSet<(NodeId, usize)>,
}

/// Reduce a tree by substituting alternatives from its replacement tables.
///
/// The input tree must FAIL under the context's oracle; the entry check is
/// the first oracle call of the search.
pub fn reduce_tree<P>(
    ctx: &SearchContext<'_, Node<P>>,
    input: Node<P>,
) -> MinimizeResult<Minimized<Node<P>>>
where
    P: Clone + ContentHash + Send + Sync,
{
    ctx.confirm(&input, Outcome::Fail)?;
    let original_size = input.size();

    let mut state = TreeReduction {
        ctx,
        current: input,
        trace: SearchTrace::new(),
        pass: 0,
        reported: HashSet::new(),
    };

    let termination = loop {
        if let Some(reason) = ctx.interrupted(state.pass) {
            break reason;
        }
        state.pass += 1;
        let accepted_before = state.trace.accepted();

        match state.visit(&mut Vec::new()) {
            Ok(_) => {}
            Err(Halt::Stop(reason)) => break reason,
            Err(Halt::Error(err)) => return Err(err),
        }

        let accepted = state.trace.accepted() - accepted_before;
        debug!(
            "pass {}: {} substitutions, {} nodes",
            state.pass,
            accepted,
            state.current.size()
        );
        if accepted == 0 {
            break TerminationReason::Minimal;
        }
    };

    info!(
        "tree reduction finished ({:?}): {} -> {} nodes in {} passes, {} oracle calls",
        termination,
        original_size,
        state.current.size(),
        state.pass,
        ctx.adapter().calls()
    );

    Ok(Minimized {
        minimized: state.current,
        trace: state.trace,
        termination,
        rounds: state.pass,
    })
}

impl<'c, 'a, P> TreeReduction<'c, 'a, P>
where
    P: Clone + ContentHash + Send + Sync,
{
    fn visit(&mut self, path: &mut Vec<usize>) -> Result<Visit, Halt> {
        loop {
            if self.ctx.is_cancelled() {
                return Err(Halt::Stop(TerminationReason::Cancelled));
            }
            let candidates = self.usable_alternatives(path)?;
            if candidates.is_empty() {
                break;
            }

            let ctx = self.ctx;
            let scan = ctx.scan(
                candidates.len(),
                |i| candidates[i].clone(),
                Outcome::is_fail,
                self.pass,
                Some(&mut self.trace.rejections),
            );
            match scan {
                Scan::Found { candidate, step, .. } => {
                    debug!("pass {}: {:?} -> {} nodes", self.pass, step, candidate.size());
                    self.accept(candidate, step)?;
                    if let Step::Delete { .. } = step {
                        return Ok(Visit::Removed);
                    }
                }
                Scan::OutOfBudget => return Err(Halt::Stop(TerminationReason::BudgetExceeded)),
                Scan::Exhausted => break,
            }
        }

        let mut index = 0;
        while index < self.node_at(path)?.children().len() {
            path.push(index);
            let visit = self.visit(path);
            path.pop();
            if visit? == Visit::Kept {
                index += 1;
            }
        }
        Ok(Visit::Kept)
    }

    /// Candidate trees for the node at `path`, largest alternative first.
    /// Alternatives that cannot shrink the tree are skipped and reported.
    fn usable_alternatives(&mut self, path: &[usize]) -> MinimizeResult<Vec<(Node<P>, Step)>> {
        let node = self.node_at(path)?;
        let (node_id, node_size) = (node.id(), node.size());

        let mut order: Vec<usize> = (0..node.alternatives().len()).collect();
        order.sort_by_key(|&i| Reverse(node.alternatives()[i].size()));

        let mut usable = Vec::with_capacity(order.len());
        let mut skipped = Vec::new();
        for alternative in order {
            let replacement = &node.alternatives()[alternative];
            if replacement.size() >= node_size {
                skipped.push((alternative, "replacement is not smaller than the node"));
                continue;
            }
            let step = match replacement {
                Replacement::Subtree(_) => Step::Replace { node: node_id, alternative },
                Replacement::Delete => Step::Delete { node: node_id, alternative },
            };
            match self.current.replaced_at(path, replacement) {
                Some(tree) => usable.push((tree, step)),
                None => skipped.push((alternative, "cannot delete the root node")),
            }
        }

        for (alternative, reason) in skipped {
            self.skip(node_id, alternative, reason);
        }
        Ok(usable)
    }

    fn skip(&mut self, node: NodeId, alternative: usize, reason: &str) {
        if !self.reported.insert((node, alternative)) {
            return;
        }
        warn!("skipping alternative {} of node {}: {}", alternative, node, reason);
        self.trace.skipped.push(SkippedAlternative {
            round: self.pass,
            node,
            alternative,
            reason: reason.to_string(),
        });
    }

    fn accept(&mut self, candidate: Node<P>, step: Step) -> MinimizeResult<()> {
        let (before_size, after_size) = (self.current.size(), candidate.size());
        if after_size >= before_size {
            return Err(MinimizeError::Invariant(format!(
                "accepted tree of {} nodes does not shrink {}",
                after_size, before_size
            )));
        }
        let after = candidate.clone();
        let before = std::mem::replace(&mut self.current, candidate);
        self.trace.reductions.push(Reduction {
            before,
            after,
            outcome: Outcome::Fail,
            step,
            round: self.pass,
        });
        Ok(())
    }

    fn node_at(&self, path: &[usize]) -> MinimizeResult<&Node<P>> {
        self.current.at(path).ok_or_else(|| {
            MinimizeError::Invariant(format!("traversal path {:?} left the tree", path))
        })
    }
}
