//! Profitability policy.
//!
//! The pack builder asks a policy two questions: "how much is pairing
//! these two instructions worth" while extending the pair set, and "which
//! combined packs survive" once chains are assembled. Both are behind a
//! trait so a target or an experiment can swap the heuristics without
//! touching the discovery algorithm.

use crate::ir::NodeId;
use crate::slp::analysis::BlockAnalysis;
use crate::slp::packset::{Pack, PackSet};

/// Scoring and pruning strategy for pack discovery.
pub trait ProfitabilityPolicy {
    /// Estimated benefit of pairing `a` (lane i) with `b` (lane i+1),
    /// given the pairs discovered so far. Higher is better; negative
    /// means "do not pair".
    fn estimate_savings(
        &self,
        analysis: &BlockAnalysis<'_>,
        pairs: &PackSet,
        a: NodeId,
        b: NodeId,
    ) -> i32;

    /// Prune or shrink combined packs before scheduling.
    fn filter_packs(&self, analysis: &BlockAnalysis<'_>, packs: &mut Vec<Pack>);
}

// =============================================================================
// Default Policy
// =============================================================================

/// Benefit of eliminating one of the two scalar instructions.
const SAVE_PAIRED: i32 = 1;
/// Benefit per operand pair that vectorizes for free (already paired, or
/// adjacent memory accesses that will pair).
const SAVE_FREE_OPERANDS: i32 = 2;
/// Cost per operand pair that would need a scalar-to-vector gather.
const COST_GATHER: i32 = 4;
/// Benefit per consumer pair that is itself already paired.
const SAVE_PAIRED_USE: i32 = 2;
/// Cost per side whose value must still be extracted for scalar consumers.
const COST_EXTRACT: i32 = 1;

/// The built-in policy.
///
/// Operand-side score (`save_in`): start from the pairing benefit, reward
/// operand pairs the vector instruction gets for free, and charge for
/// operand pairs that would have to be gathered lane by lane. Consumer-side
/// score (`save_use`): reward consumer pairs that are already paired and
/// charge each side that still feeds scalar consumers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPolicy;

impl DefaultPolicy {
    fn save_in(
        &self,
        analysis: &BlockAnalysis<'_>,
        pairs: &PackSet,
        a: NodeId,
        b: NodeId,
    ) -> i32 {
        let graph = analysis.graph();
        let mut save = SAVE_PAIRED;
        let count = graph.node(a).inputs.len().min(graph.node(b).inputs.len());
        for index in 0..count {
            let (Some(oa), Some(ob)) = (
                graph.node(a).inputs.get(index),
                graph.node(b).inputs.get(index),
            ) else {
                continue;
            };
            if oa == ob {
                // shared operand broadcasts into every lane
                continue;
            }
            if pairs.contains_pair(oa, ob) || analysis.adjacent(oa, ob) {
                save += SAVE_FREE_OPERANDS;
            } else {
                save -= COST_GATHER;
            }
        }
        save
    }

    fn save_use(
        &self,
        analysis: &BlockAnalysis<'_>,
        pairs: &PackSet,
        a: NodeId,
        b: NodeId,
    ) -> i32 {
        let graph = analysis.graph();
        let mut save = 0;
        let mut matched_a = 0usize;
        let mut matched_b = 0usize;
        for &ua in graph.uses(a) {
            for &ub in graph.uses(b) {
                if pairs.contains_pair(ua, ub) || pairs.contains_pair(ub, ua) {
                    save += SAVE_PAIRED_USE;
                    matched_a += 1;
                    matched_b += 1;
                }
            }
        }
        if matched_a < graph.use_count(a) {
            save -= COST_EXTRACT;
        }
        if matched_b < graph.use_count(b) {
            save -= COST_EXTRACT;
        }
        save
    }
}

impl ProfitabilityPolicy for DefaultPolicy {
    // Both sides can come out negative, so the max can too; the builder's
    // `>= 0` checks rely on that.
    fn estimate_savings(
        &self,
        analysis: &BlockAnalysis<'_>,
        pairs: &PackSet,
        a: NodeId,
        b: NodeId,
    ) -> i32 {
        let save_in = self.save_in(analysis, pairs, a, b);
        let save_use = self.save_use(analysis, pairs, a, b);
        save_in.max(save_use)
    }

    /// Shrink each pack to the largest power-of-two lane count the target
    /// supports for its element kind; drop packs that end up below two
    /// lanes.
    fn filter_packs(&self, analysis: &BlockAnalysis<'_>, packs: &mut Vec<Pack>) {
        packs.retain_mut(|pack| {
            let kind = analysis.graph().node(pack.first()).stamp.kind;
            if !kind.is_primitive() {
                return false;
            }
            let limit = analysis.max_lanes(kind).min(pack.lanes());
            if limit < 2 {
                return false;
            }
            let lanes = 1usize << limit.ilog2();
            pack.elements.truncate(lanes);
            true
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
