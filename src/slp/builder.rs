//! Pack discovery.
//!
//! Discovery runs in two stages. Seeding pairs adjacent memory accesses,
//! picking the reference access with the most isomorphic company first so
//! the densest group claims its lanes before stragglers do. Extension then
//! grows the pair set along operand edges (use-def) and consumer edges
//! (def-use) until a fixed point, consulting the profitability policy for
//! every non-seed pair.

use log::trace;

use crate::ir::NodeId;
use crate::slp::analysis::BlockAnalysis;
use crate::slp::packset::PackSet;
use crate::slp::policy::ProfitabilityPolicy;

/// Builds the candidate pair set for one block.
pub struct PackSetBuilder<'a, 'g> {
    analysis: &'a mut BlockAnalysis<'g>,
    policy: &'a dyn ProfitabilityPolicy,
    pairs: PackSet,
}

impl<'a, 'g> PackSetBuilder<'a, 'g> {
    /// Create a builder over a block's analysis context.
    pub fn new(analysis: &'a mut BlockAnalysis<'g>, policy: &'a dyn ProfitabilityPolicy) -> Self {
        PackSetBuilder {
            analysis,
            policy,
            pairs: PackSet::new(),
        }
    }

    /// Run seeding and extension, yielding the final pair set.
    pub fn build(mut self, schedule: &[NodeId]) -> PackSet {
        self.seed(schedule);
        self.extend();
        self.pairs
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Pair adjacent memory accesses, densest isomorphism group first.
    fn seed(&mut self, schedule: &[NodeId]) {
        let mut remaining: Vec<NodeId> = schedule
            .iter()
            .copied()
            .filter(|&id| {
                let node = self.analysis.graph().node(id);
                node.op.is_packable()
                    && node.op.is_memory_access()
                    && self.analysis.memory_alignment(id).is_some()
            })
            .collect();

        while let Some(reference) = self.pick_reference(&remaining) {
            let group: Vec<NodeId> = remaining
                .iter()
                .copied()
                .filter(|&id| self.analysis.isomorphic(reference, id))
                .collect();

            self.assign_group_alignments(reference, &group);

            for &left in &group {
                for &right in &group {
                    if self.analysis.adjacent(left, right) && self.stmts_can_pack(left, right) {
                        trace!("seed pair {left:?} / {right:?}");
                        self.pairs.insert(left, right);
                    }
                }
            }

            remaining.retain(|id| !group.contains(id));
        }
    }

    /// The access with the most isomorphic company among `remaining`, or
    /// `None` when no access has any.
    fn pick_reference(&self, remaining: &[NodeId]) -> Option<NodeId> {
        let mut best: Option<(NodeId, usize)> = None;
        for &candidate in remaining {
            let company = remaining
                .iter()
                .filter(|&&other| other != candidate && self.analysis.isomorphic(candidate, other))
                .count();
            if company == 0 {
                continue;
            }
            match best {
                Some((current, current_company))
                    if !self.reference_beats(candidate, company, current, current_company) => {}
                _ => best = Some((candidate, company)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Ordering between reference candidates: more company, then wider
    /// usable vectors, then smaller elements, then smaller displacement,
    /// then writes before reads.
    fn reference_beats(
        &self,
        challenger: NodeId,
        challenger_company: usize,
        incumbent: NodeId,
        incumbent_company: usize,
    ) -> bool {
        if challenger_company != incumbent_company {
            return challenger_company > incumbent_company;
        }
        let graph = self.analysis.graph();
        let ca = graph.node(challenger);
        let ia = graph.node(incumbent);
        let cw = self.analysis.vector_width_bytes(ca.stamp.kind);
        let iw = self.analysis.vector_width_bytes(ia.stamp.kind);
        if cw != iw {
            return cw > iw;
        }
        if ca.element_size() != ia.element_size() {
            return ca.element_size() < ia.element_size();
        }
        let cd = ca.op.displacement().unwrap_or(0);
        let id = ia.op.displacement().unwrap_or(0);
        if cd != id {
            return cd < id;
        }
        ca.op.is_write() && !ia.op.is_write()
    }

    /// Give every group member an alignment: relative to the reference
    /// when their index expressions agree, from its own displacement
    /// otherwise.
    fn assign_group_alignments(&mut self, reference: NodeId, group: &[NodeId]) {
        let Some(ref_align) = self.analysis.memory_alignment(reference) else {
            return;
        };
        let ref_disp = self
            .analysis
            .graph()
            .node(reference)
            .op
            .displacement()
            .unwrap_or(0);
        let ref_vars = self.analysis.induction_vars(reference);
        let width = self
            .analysis
            .vector_width_bytes(self.analysis.graph().node(reference).stamp.kind);

        for &member in group {
            let member_disp = self
                .analysis
                .graph()
                .node(member)
                .op
                .displacement()
                .unwrap_or(0);
            if self.analysis.induction_vars(member) == ref_vars {
                let align = (ref_align + member_disp - ref_disp).rem_euclid(width);
                self.analysis.set_alignment(member, align);
            } else if let Some(own) = self.analysis.memory_alignment(member) {
                self.analysis.set_alignment(member, own);
            }
        }
    }

    // =========================================================================
    // Extension
    // =========================================================================

    /// Grow the pair set along operand and consumer edges to a fixed point.
    fn extend(&mut self) {
        loop {
            let mut changed = false;
            let mut index = 0;
            while index < self.pairs.len() {
                let pair = self.pairs.pairs()[index];
                changed |= self.follow_use_defs(pair.left, pair.right);
                changed |= self.follow_def_uses(pair.left, pair.right);
                index += 1;
            }
            if !changed {
                break;
            }
        }
    }

    /// Pair the operands of an existing pair, position by position.
    fn follow_use_defs(&mut self, left: NodeId, right: NodeId) -> bool {
        let graph = self.analysis.graph();
        let count = graph
            .node(left)
            .inputs
            .len()
            .min(graph.node(right).inputs.len());
        let mut changed = false;
        for position in 0..count {
            let graph = self.analysis.graph();
            let (Some(x), Some(y)) = (
                graph.node(left).inputs.get(position),
                graph.node(right).inputs.get(position),
            ) else {
                continue;
            };
            if x == y || !self.analysis.in_block(x) || !self.analysis.in_block(y) {
                continue;
            }
            if !self.stmts_can_pack(x, y) {
                continue;
            }
            if self
                .policy
                .estimate_savings(self.analysis, &self.pairs, x, y)
                < 0
            {
                continue;
            }
            trace!("use-def pair {x:?} / {y:?} from {left:?} / {right:?}");
            self.pairs.insert(x, y);
            self.propagate_alignment(left, x);
            self.propagate_alignment(right, y);
            changed = true;
        }
        changed
    }

    /// Pair the single best-scoring consumer pair of an existing pair.
    /// Ties go to the first candidate found.
    fn follow_def_uses(&mut self, left: NodeId, right: NodeId) -> bool {
        let mut best: Option<(NodeId, NodeId)> = None;
        let mut best_savings = -1;
        let left_uses = self.analysis.graph().uses(left).to_vec();
        let right_uses = self.analysis.graph().uses(right).to_vec();
        for &ua in &left_uses {
            if !self.analysis.in_block(ua) {
                continue;
            }
            for &ub in &right_uses {
                if ua == ub || !self.analysis.in_block(ub) {
                    continue;
                }
                if !self.stmts_can_pack(ua, ub) {
                    continue;
                }
                let savings = self
                    .policy
                    .estimate_savings(self.analysis, &self.pairs, ua, ub);
                if savings > best_savings {
                    best_savings = savings;
                    best = Some((ua, ub));
                }
            }
        }
        let Some((ua, ub)) = best else {
            return false;
        };
        if best_savings < 0 {
            return false;
        }
        trace!("def-use pair {ua:?} / {ub:?} from {left:?} / {right:?}");
        self.pairs.insert(ua, ub);
        self.propagate_alignment(left, ua);
        self.propagate_alignment(right, ub);
        true
    }

    /// Carry a source pair member's alignment onto the instruction it got
    /// paired through; no alignment clears any stale one.
    fn propagate_alignment(&mut self, from: NodeId, to: NodeId) {
        match self.analysis.alignment(from) {
            Some(align) => self.analysis.set_alignment(to, align),
            None => self.analysis.clear_alignment(to),
        }
    }

    // =========================================================================
    // Pairing Gate
    // =========================================================================

    /// Whether `a` (lane i) and `b` (lane i+1) may form a pair at all:
    /// distinct packable instructions, isomorphic, independent, lanes
    /// still free, and alignments consistent when both are known.
    fn stmts_can_pack(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        let graph = self.analysis.graph();
        if !graph.node(a).op.is_packable() || !graph.node(b).op.is_packable() {
            return false;
        }
        if !self.analysis.isomorphic(a, b) || !self.analysis.independent(a, b) {
            return false;
        }
        if self.pairs.has_left(a) || self.pairs.has_right(b) {
            return false;
        }
        match (self.analysis.alignment(a), self.analysis.alignment(b)) {
            (Some(align_a), Some(align_b)) => {
                align_b == align_a + graph.node(a).element_size()
            }
            _ => true,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinaryOp, BlockId, ElementKind, Method};
    use crate::slp::policy::DefaultPolicy;
    use crate::target::SimdLevel;

    fn build_pairs(method: &Method, block: BlockId, oracle: &SimdLevel) -> PackSet {
        let schedule = method.block(block).schedule.clone();
        let mut analysis = BlockAnalysis::new(&method.graph, block, &schedule, oracle);
        let policy = DefaultPolicy;
        PackSetBuilder::new(&mut analysis, &policy).build(&schedule)
    }

    #[test]
    fn test_seeds_adjacent_reads() {
        let mut method = Method::new("m");
        let block = method.add_block();
        let base = method.graph.parameter(block, ElementKind::I64, 0);
        method.schedule_existing(block, base);
        let r0 = method.graph.read(block, ElementKind::I32, base, None, 0);
        method.schedule_existing(block, r0);
        let r1 = method.graph.read(block, ElementKind::I32, base, None, 4);
        method.schedule_existing(block, r1);

        let pairs = build_pairs(&method, block, &SimdLevel::Avx2);
        assert!(pairs.contains_pair(r0, r1));
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn test_seed_chains_whole_group() {
        let mut method = Method::new("m");
        let block = method.add_block();
        let base = method.graph.parameter(block, ElementKind::I64, 0);
        method.schedule_existing(block, base);
        let src = method.graph.parameter(block, ElementKind::I64, 1);
        method.schedule_existing(block, src);
        let mut writes = Vec::new();
        for i in 0..4 {
            let v = method.graph.read(block, ElementKind::I32, src, None, i * 4);
            method.schedule_existing(block, v);
            let w = method
                .graph
                .write(block, ElementKind::I32, base, None, i * 4, v);
            method.schedule_existing(block, w);
            writes.push(w);
        }

        let pairs = build_pairs(&method, block, &SimdLevel::Avx2);
        for window in writes.windows(2) {
            assert!(pairs.contains_pair(window[0], window[1]));
        }
    }

    #[test]
    fn test_distinct_bases_do_not_pair() {
        let mut method = Method::new("m");
        let block = method.add_block();
        let p = method.graph.parameter(block, ElementKind::I64, 0);
        method.schedule_existing(block, p);
        let q = method.graph.parameter(block, ElementKind::I64, 1);
        method.schedule_existing(block, q);
        let r0 = method.graph.read(block, ElementKind::I32, p, None, 0);
        method.schedule_existing(block, r0);
        let r1 = method.graph.read(block, ElementKind::I32, q, None, 4);
        method.schedule_existing(block, r1);

        let pairs = build_pairs(&method, block, &SimdLevel::Avx2);
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_use_def_extends_into_arithmetic() {
        // w[i] = a[i] + b[i] for i in 0..2: seeding pairs the writes and
        // both read streams, use-def pairs the adds
        let mut method = Method::new("m");
        let block = method.add_block();
        let dst = method.graph.parameter(block, ElementKind::I64, 0);
        method.schedule_existing(block, dst);
        let a = method.graph.parameter(block, ElementKind::I64, 1);
        method.schedule_existing(block, a);
        let b = method.graph.parameter(block, ElementKind::I64, 2);
        method.schedule_existing(block, b);
        let mut adds = Vec::new();
        for i in 0..2 {
            let ra = method.graph.read(block, ElementKind::I32, a, None, i * 4);
            method.schedule_existing(block, ra);
            let rb = method.graph.read(block, ElementKind::I32, b, None, i * 4);
            method.schedule_existing(block, rb);
            let sum = method.graph.binary(block, BinaryOp::Add, ra, rb);
            method.schedule_existing(block, sum);
            let w = method
                .graph
                .write(block, ElementKind::I32, dst, None, i * 4, sum);
            method.schedule_existing(block, w);
            adds.push(sum);
        }

        let pairs = build_pairs(&method, block, &SimdLevel::Avx2);
        assert!(pairs.contains_pair(adds[0], adds[1]));
    }

    #[test]
    fn test_gathered_operands_stay_scalar() {
        // each add mixes a paired read with a loose scalar and its write
        // lands far from its sibling's, so extension leaves the adds alone
        let mut method = Method::new("m");
        let block = method.add_block();
        let dst = method.graph.parameter(block, ElementKind::I64, 0);
        method.schedule_existing(block, dst);
        let src = method.graph.parameter(block, ElementKind::I64, 1);
        method.schedule_existing(block, src);
        let x = method.graph.parameter(block, ElementKind::I32, 2);
        method.schedule_existing(block, x);
        let y = method.graph.parameter(block, ElementKind::I32, 3);
        method.schedule_existing(block, y);
        let extras = [x, y];
        let mut adds = Vec::new();
        for i in 0..2i64 {
            let r = method.graph.read(block, ElementKind::I32, src, None, i * 4);
            method.schedule_existing(block, r);
            let sum = method
                .graph
                .binary(block, BinaryOp::Add, r, extras[i as usize]);
            method.schedule_existing(block, sum);
            let w = method
                .graph
                .write(block, ElementKind::I32, dst, None, i * 64, sum);
            method.schedule_existing(block, w);
            adds.push(sum);
        }

        let pairs = build_pairs(&method, block, &SimdLevel::Avx2);
        assert!(!pairs.contains_pair(adds[0], adds[1]));
        assert!(!pairs.is_paired(adds[0]));
    }
}
