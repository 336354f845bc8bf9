//! Per-block analysis context.
//!
//! All pairing predicates (isomorphism, independence, adjacency) and the
//! alignment bookkeeping for one block live here, so the pack builder and
//! the profitability policy query a single immutable context instead of
//! re-deriving facts from the graph. The context borrows the graph; it is
//! built per block and dropped before the rewriter mutates anything.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::ir::{BlockId, ElementKind, Graph, NodeId, Opcode};
use crate::target::VectorWidthOracle;

/// Transitive-dependence walks give up past this many visited frames and
/// report "dependent", trading precision for a hard bound on pathological
/// blocks.
const INDEPENDENCE_WALK_LIMIT: usize = 1000;

/// Immutable pairing context for one basic block.
pub struct BlockAnalysis<'a> {
    graph: &'a Graph,
    block: BlockId,
    /// Schedule position of each live instruction in the block.
    depth: FxHashMap<NodeId, u32>,
    /// `barrier_prefix[i]` = barriers among schedule positions `0..i`.
    barrier_prefix: Vec<u32>,
    /// Lane-relative byte alignment assigned during pack discovery.
    /// Absence means "alignment unknown".
    alignment: FxHashMap<NodeId, i64>,
    oracle: &'a dyn VectorWidthOracle,
}

impl<'a> BlockAnalysis<'a> {
    /// Build the context for `block` from its current schedule.
    pub fn new(
        graph: &'a Graph,
        block: BlockId,
        schedule: &[NodeId],
        oracle: &'a dyn VectorWidthOracle,
    ) -> Self {
        let mut depth = FxHashMap::default();
        let mut barrier_prefix = Vec::with_capacity(schedule.len() + 1);
        let mut barriers = 0u32;
        barrier_prefix.push(0);
        for (position, &id) in schedule.iter().enumerate() {
            depth.insert(id, position as u32);
            if matches!(graph.node(id).op, Opcode::Barrier) {
                barriers += 1;
            }
            barrier_prefix.push(barriers);
        }
        BlockAnalysis {
            graph,
            block,
            depth,
            barrier_prefix,
            alignment: FxHashMap::default(),
            oracle,
        }
    }

    /// The graph this context was built over.
    #[inline]
    pub fn graph(&self) -> &Graph {
        self.graph
    }

    /// The block this context covers.
    #[inline]
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// Whether `node` is scheduled in this block.
    #[inline]
    pub fn in_block(&self, node: NodeId) -> bool {
        self.depth.contains_key(&node)
    }

    /// Schedule position of `node`, if it is in this block.
    #[inline]
    pub fn depth_of(&self, node: NodeId) -> Option<u32> {
        self.depth.get(&node).copied()
    }

    // =========================================================================
    // Pairing Predicates
    // =========================================================================

    /// Whether two instructions perform the same operation on values of the
    /// same shape. Memory accesses additionally have to share their base,
    /// so both lanes address the same object.
    pub fn isomorphic(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return true;
        }
        let na = self.graph.node(a);
        let nb = self.graph.node(b);
        if !na.op.same_tag(&nb.op) {
            return false;
        }
        if na.inputs.len() != nb.inputs.len() {
            return false;
        }
        if !na.stamp.compatible(nb.stamp) {
            return false;
        }
        if na.op.is_memory_access() {
            return na.access_base() == nb.access_base();
        }
        true
    }

    /// Whether `a` and `b` can execute side by side: neither reaches the
    /// other through operand edges within the block, and no barrier sits
    /// between them in the schedule.
    ///
    /// An instruction is never independent of itself. The operand walk is
    /// bounded by [`INDEPENDENCE_WALK_LIMIT`]; when the bound trips the
    /// answer is the conservative "dependent".
    pub fn independent(&self, a: NodeId, b: NodeId) -> bool {
        if a == b {
            return false;
        }
        let (Some(da), Some(db)) = (self.depth_of(a), self.depth_of(b)) else {
            return false;
        };
        let (shallow, shallow_depth, deep, deep_depth) = if da < db {
            (a, da, b, db)
        } else {
            (b, db, a, da)
        };

        // a barrier anywhere in the schedule window orders the two sides
        if self.barrier_prefix[shallow_depth as usize] != self.barrier_prefix[deep_depth as usize] {
            return false;
        }

        // walk deep's operand cone, pruned to the (shallow, deep) depth
        // window; inputs always precede their users in the schedule
        let mut worklist: Vec<NodeId> = Vec::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        let mut frames = 0usize;
        worklist.push(deep);
        while let Some(current) = worklist.pop() {
            frames += 1;
            if frames > INDEPENDENCE_WALK_LIMIT {
                return false;
            }
            for input in self.graph.node(current).inputs.iter() {
                if input == shallow {
                    return false;
                }
                let Some(input_depth) = self.depth_of(input) else {
                    continue;
                };
                if input_depth <= shallow_depth {
                    continue;
                }
                if input_depth < deep_depth && visited.insert(input) {
                    worklist.push(input);
                }
            }
        }
        true
    }

    /// Whether `a` and `b` are adjacent memory accesses: same base, same
    /// variable address contribution, and `b` starts exactly where `a`
    /// ends.
    pub fn adjacent(&self, a: NodeId, b: NodeId) -> bool {
        let na = self.graph.node(a);
        let nb = self.graph.node(b);
        if !self.in_block(a) || !self.in_block(b) {
            return false;
        }
        if !na.op.is_memory_access() || !nb.op.is_memory_access() {
            return false;
        }
        if !na.stamp.is_scalar() || !nb.stamp.is_scalar() {
            return false;
        }
        if !na.stamp.kind.is_primitive() || na.element_size() != nb.element_size() {
            return false;
        }
        if na.access_base() != nb.access_base() {
            return false;
        }
        if self.induction_vars(a) != self.induction_vars(b) {
            return false;
        }
        match (na.op.displacement(), nb.op.displacement()) {
            (Some(da), Some(db)) => db == da + na.element_size(),
            _ => false,
        }
    }

    /// The variable leaves of a memory access's index expression.
    ///
    /// Walks through the address-shaped arithmetic (add, shifts, sign
    /// extension) and collects every non-constant leaf. Two accesses with
    /// the same leaf set differ only by a constant, so constant
    /// displacement comparison is sound between them.
    pub fn induction_vars(&self, access: NodeId) -> FxHashSet<NodeId> {
        use crate::ir::{BinaryOp, UnaryOp};

        let mut leaves = FxHashSet::default();
        let Some(index) = self.graph.node(access).access_index() else {
            return leaves;
        };
        let mut worklist = vec![index];
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();
        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            match self.graph.node(current).op {
                Opcode::Binary(BinaryOp::Add | BinaryOp::Shl | BinaryOp::Shr)
                | Opcode::Unary(UnaryOp::SignExtend) => {
                    worklist.extend(self.graph.node(current).inputs.iter());
                }
                Opcode::ConstInt(_) | Opcode::ConstFloat(_) => {}
                _ => {
                    leaves.insert(current);
                }
            }
        }
        leaves
    }

    // =========================================================================
    // Alignment
    // =========================================================================

    /// Full vector register width in bytes for elements of `kind`.
    pub fn vector_width_bytes(&self, kind: ElementKind) -> i64 {
        self.oracle.max_lanes(kind) as i64 * kind.bytes()
    }

    /// Maximum lane count the target supports for `kind`.
    pub fn max_lanes(&self, kind: ElementKind) -> usize {
        self.oracle.max_lanes(kind)
    }

    /// Byte offset of a memory access within its vector-width window,
    /// derived from the constant displacement alone. `None` when the
    /// target has no multi-lane register for the element kind.
    pub fn memory_alignment(&self, access: NodeId) -> Option<i64> {
        let node = self.graph.node(access);
        let displacement = node.op.displacement()?;
        let width = self.vector_width_bytes(node.stamp.kind);
        if width <= node.element_size() {
            return None;
        }
        Some(displacement.rem_euclid(width))
    }

    /// Alignment assigned to `node` during discovery, if any.
    #[inline]
    pub fn alignment(&self, node: NodeId) -> Option<i64> {
        self.alignment.get(&node).copied()
    }

    /// Record the discovered alignment of `node`.
    #[inline]
    pub fn set_alignment(&mut self, node: NodeId, value: i64) {
        self.alignment.insert(node, value);
    }

    /// Forget the alignment of `node`.
    #[inline]
    pub fn clear_alignment(&mut self, node: NodeId) {
        self.alignment.remove(&node);
    }
}

// =============================================================================
// Tests
// =============================================================================
