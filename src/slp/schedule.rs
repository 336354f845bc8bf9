//! Pack-atomic scheduling and vector codegen.
//!
//! Scheduling runs first, over an immutable graph: it linearizes the
//! block into scalar and pack units, dropping packs whose lanes cannot be
//! scheduled side by side. Codegen runs second and is the only phase that
//! mutates the graph, so a failed schedule never leaves the block half
//! rewritten.

use log::debug;
use rustc_hash::FxHashMap;

use crate::error::SlpError;
use crate::ir::{BitSet, BlockId, Graph, InputList, Method, Node, NodeId, Opcode, Stamp};
use crate::slp::packset::Pack;

/// One slot of the new block order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleUnit {
    /// A scalar instruction keeps its place.
    Scalar(NodeId),
    /// All lanes of `packs[index]` execute as one vector instruction.
    Pack(usize),
}

// =============================================================================
// Scheduler
// =============================================================================

/// Linearizes one block around a set of packs.
pub struct BlockScheduler<'a> {
    graph: &'a Graph,
    original: Vec<NodeId>,
    /// Original position of each instruction in the block.
    position: FxHashMap<NodeId, usize>,
    /// Control-chain instructions in original order.
    fixed: Vec<NodeId>,
    /// Rank of each control-chain instruction within `fixed`.
    fixed_rank: FxHashMap<NodeId, usize>,
}

impl<'a> BlockScheduler<'a> {
    /// Create a scheduler over the block's current order.
    pub fn new(graph: &'a Graph, schedule: &[NodeId]) -> Self {
        let original = schedule.to_vec();
        let mut position = FxHashMap::default();
        let mut fixed = Vec::new();
        let mut fixed_rank = FxHashMap::default();
        for (index, &id) in original.iter().enumerate() {
            position.insert(id, index);
            if graph.node(id).is_fixed() {
                fixed_rank.insert(id, fixed.len());
                fixed.push(id);
            }
        }
        BlockScheduler {
            graph,
            original,
            position,
            fixed,
            fixed_rank,
        }
    }

    /// Produce a valid unit order covering every instruction of the block.
    ///
    /// A pack whose lanes cannot all become ready at once is a dependency
    /// violation: the pack is removed from `packs` and scheduling restarts
    /// from scratch. Non-packed instructions are never dropped, so the
    /// loop terminates once at most every pack has been discarded.
    pub fn linearize(&self, packs: &mut Vec<Pack>) -> Vec<ScheduleUnit> {
        'restart: loop {
            let mut pack_of: FxHashMap<NodeId, usize> = FxHashMap::default();
            for (index, pack) in packs.iter().enumerate() {
                for &element in &pack.elements {
                    pack_of.insert(element, index);
                }
            }

            let mut scheduled = BitSet::new();
            let mut remaining = self.original.len();
            let mut units = Vec::with_capacity(self.original.len());
            while remaining > 0 {
                let mut progress = false;
                for &node in &self.original {
                    if scheduled.contains(node.as_usize()) {
                        continue;
                    }
                    match pack_of.get(&node) {
                        Some(&index) => {
                            if self.pack_ready(&packs[index], &scheduled) {
                                units.push(ScheduleUnit::Pack(index));
                                for &element in &packs[index].elements {
                                    scheduled.insert(element.as_usize());
                                }
                                remaining -= packs[index].lanes();
                                progress = true;
                            }
                        }
                        None => {
                            if self.scalar_ready(node, &scheduled) {
                                units.push(ScheduleUnit::Scalar(node));
                                scheduled.insert(node.as_usize());
                                remaining -= 1;
                                progress = true;
                            }
                        }
                    }
                }
                if !progress {
                    let victim = self
                        .original
                        .iter()
                        .copied()
                        .find(|id| !scheduled.contains(id.as_usize()) && pack_of.contains_key(id))
                        .and_then(|id| pack_of.get(&id).copied());
                    match victim {
                        Some(index) => {
                            debug!(
                                "dependency violation: dropping {}-lane pack at {:?}",
                                packs[index].lanes(),
                                packs[index].first()
                            );
                            packs.remove(index);
                            continue 'restart;
                        }
                        None => {
                            // a deadlock among plain scalars means the input
                            // order was already invalid; fall back to it
                            packs.clear();
                            return self
                                .original
                                .iter()
                                .map(|&id| ScheduleUnit::Scalar(id))
                                .collect();
                        }
                    }
                }
            }
            return units;
        }
    }

    fn scalar_ready(&self, node: NodeId, scheduled: &BitSet) -> bool {
        if !self.inputs_scheduled(node, scheduled, None) {
            return false;
        }
        match self.fixed_rank.get(&node) {
            Some(&rank) => self.fixed[..rank]
                .iter()
                .all(|f| scheduled.contains(f.as_usize())),
            None => true,
        }
    }

    /// A pack is ready when every lane's block-local operands are
    /// scheduled and the control-chain predecessors of its earliest lane
    /// are scheduled. Later lanes' control predecessors are their pack
    /// siblings entering the same vector instruction and are not checked.
    fn pack_ready(&self, pack: &Pack, scheduled: &BitSet) -> bool {
        for &element in &pack.elements {
            if !self.inputs_scheduled(element, scheduled, Some(pack)) {
                return false;
            }
        }
        let earliest = pack
            .elements
            .iter()
            .copied()
            .min_by_key(|id| self.position.get(id).copied().unwrap_or(usize::MAX));
        let Some(earliest) = earliest else {
            return false;
        };
        match self.fixed_rank.get(&earliest) {
            Some(&rank) => self.fixed[..rank]
                .iter()
                .all(|f| scheduled.contains(f.as_usize()) || pack.contains(*f)),
            None => true,
        }
    }

    fn inputs_scheduled(&self, node: NodeId, scheduled: &BitSet, pack: Option<&Pack>) -> bool {
        self.graph.node(node).inputs.iter().all(|input| {
            if !self.position.contains_key(&input) {
                return true;
            }
            if pack.is_some_and(|p| p.contains(input)) {
                // an operand edge between lanes can never be satisfied
                return false;
            }
            scheduled.contains(input.as_usize())
        })
    }
}

// =============================================================================
// Codegen
// =============================================================================

/// What the rewriter did to one block.
#[derive(Debug, Clone, Copy, Default)]
pub struct RewriteCounts {
    /// Vector instructions materialized (reads, writes, packs, arithmetic).
    pub vector_nodes: u32,
    /// Scalar instructions deleted.
    pub scalars_removed: u32,
    /// Lane extracts inserted for scalar consumers.
    pub extracts: u32,
}

/// Rewrite `block` to the unit order, materializing one vector instruction
/// per pack and deleting the packed scalars.
pub fn rewrite(
    method: &mut Method,
    block: BlockId,
    units: &[ScheduleUnit],
    packs: &[Pack],
) -> Result<RewriteCounts, SlpError> {
    let mut counts = RewriteCounts::default();
    let mut schedule = Vec::with_capacity(units.len());
    for unit in units {
        match *unit {
            ScheduleUnit::Scalar(id) => schedule.push(id),
            ScheduleUnit::Pack(index) => {
                rewrite_pack(method, block, &packs[index], &mut schedule, &mut counts)?;
            }
        }
    }
    method.block_mut(block).schedule = schedule;
    Ok(counts)
}

fn rewrite_pack(
    method: &mut Method,
    block: BlockId,
    pack: &Pack,
    schedule: &mut Vec<NodeId>,
    counts: &mut RewriteCounts,
) -> Result<(), SlpError> {
    let representative = pack.first();
    let op = method.graph.node(representative).op;
    match op {
        Opcode::Read { displacement } => {
            rewrite_read_pack(method, block, pack, displacement, schedule, counts)
        }
        Opcode::Write { displacement } => {
            rewrite_write_pack(method, block, pack, displacement, schedule, counts)
        }
        Opcode::Unary(_) | Opcode::Binary(_) => {
            rewrite_arith_pack(method, block, pack, schedule, counts)
        }
        _ => Err(SlpError::UnsupportedPack {
            node: representative,
            op,
            lanes: pack.lanes(),
        }),
    }
}

fn access_shape(graph: &Graph, access: NodeId) -> Result<(NodeId, Option<NodeId>), SlpError> {
    let node = graph.node(access);
    match node.access_base() {
        Some(base) => Ok((base, node.access_index())),
        None => Err(SlpError::MalformedAccess { node: access }),
    }
}

fn rewrite_read_pack(
    method: &mut Method,
    block: BlockId,
    pack: &Pack,
    displacement: i64,
    schedule: &mut Vec<NodeId>,
    counts: &mut RewriteCounts,
) -> Result<(), SlpError> {
    let representative = pack.first();
    let kind = method.graph.node(representative).stamp.kind;
    let (base, index) = access_shape(&method.graph, representative)?;
    let lanes = pack.lanes() as u8;

    let vector = method
        .graph
        .vec_read(block, kind, lanes, base, index, displacement);
    schedule.push(vector);
    counts.vector_nodes += 1;

    for (lane, &element) in pack.elements.iter().enumerate() {
        if method.graph.use_count(element) > 0 {
            let extract = method.graph.vec_extract(block, vector, lane as u8, kind);
            schedule.push(extract);
            method.graph.replace_all_uses(element, extract);
            counts.extracts += 1;
        }
        method.graph.kill(element);
        counts.scalars_removed += 1;
    }
    Ok(())
}

fn rewrite_write_pack(
    method: &mut Method,
    block: BlockId,
    pack: &Pack,
    displacement: i64,
    schedule: &mut Vec<NodeId>,
    counts: &mut RewriteCounts,
) -> Result<(), SlpError> {
    let representative = pack.first();
    let kind = method.graph.node(representative).stamp.kind;
    let (base, index) = access_shape(&method.graph, representative)?;
    let lanes = pack.lanes() as u8;

    let mut values = Vec::with_capacity(pack.lanes());
    for &element in &pack.elements {
        match method.graph.node(element).stored_value() {
            Some(value) => values.push(value),
            None => return Err(SlpError::MalformedAccess { node: element }),
        }
    }

    let packed = method.graph.vec_pack(block, kind, &values);
    schedule.push(packed);
    let vector = method
        .graph
        .vec_write(block, kind, lanes, base, index, displacement, packed);
    schedule.push(vector);
    counts.vector_nodes += 2;

    for &element in &pack.elements {
        method.graph.kill(element);
        counts.scalars_removed += 1;
    }
    Ok(())
}

/// Arithmetic packs always materialize a fresh vector instruction and
/// retarget every lane's consumers, the first lane's included, onto
/// extracts of it.
fn rewrite_arith_pack(
    method: &mut Method,
    block: BlockId,
    pack: &Pack,
    schedule: &mut Vec<NodeId>,
    counts: &mut RewriteCounts,
) -> Result<(), SlpError> {
    let representative = pack.first();
    let op = method.graph.node(representative).op;
    let kind = method.graph.node(representative).stamp.kind;
    let lanes = pack.lanes() as u8;
    let operand_count = method.graph.node(representative).inputs.len();

    let mut packed_operands = Vec::with_capacity(operand_count);
    for position in 0..operand_count {
        let mut lane_operands = Vec::with_capacity(pack.lanes());
        for &element in &pack.elements {
            match method.graph.node(element).inputs.get(position) {
                Some(operand) => lane_operands.push(operand),
                None => {
                    return Err(SlpError::UnsupportedPack {
                        node: element,
                        op,
                        lanes: pack.lanes(),
                    })
                }
            }
        }
        let operand_kind = method.graph.node(lane_operands[0]).stamp.kind;
        let packed = method.graph.vec_pack(block, operand_kind, &lane_operands);
        schedule.push(packed);
        packed_operands.push(packed);
        counts.vector_nodes += 1;
    }

    let vector = method.graph.add_node(Node::new(
        op,
        InputList::from_slice(&packed_operands),
        Stamp::vector(kind, lanes),
        block,
    ));
    schedule.push(vector);
    counts.vector_nodes += 1;

    for (lane, &element) in pack.elements.iter().enumerate() {
        if method.graph.use_count(element) > 0 {
            let extract = method.graph.vec_extract(block, vector, lane as u8, kind);
            schedule.push(extract);
            method.graph.replace_all_uses(element, extract);
            counts.extracts += 1;
        }
        method.graph.kill(element);
        counts.scalars_removed += 1;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
