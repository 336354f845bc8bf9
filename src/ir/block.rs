//! Basic blocks and the method container.

use super::arena::{Arena, Id};
use super::graph::Graph;
use super::node::{Node, NodeId};

/// Unique identifier of a basic block.
pub type BlockId = Id<Block>;

/// A basic block: a linear schedule of instructions.
///
/// The schedule is authoritative. Side-effecting instructions appear in it
/// in program order; pure instructions appear wherever the scheduler put
/// them, always after their operands.
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Instructions in execution order.
    pub schedule: Vec<NodeId>,
}

impl Block {
    /// Create an empty block.
    pub fn new() -> Self {
        Block::default()
    }
}

/// A compiled method: its graph, blocks, and block order.
pub struct Method {
    /// Instruction graph.
    pub graph: Graph,
    /// Basic blocks.
    blocks: Arena<Block>,
    /// Reverse-postorder walk of the blocks.
    pub rpo: Vec<BlockId>,
    /// Diagnostic name, also matched by the method filter.
    pub name: String,
}

impl Method {
    /// Create an empty method.
    pub fn new(name: impl Into<String>) -> Self {
        Method {
            graph: Graph::new(),
            blocks: Arena::new(),
            rpo: Vec::new(),
            name: name.into(),
        }
    }

    /// Append a new empty block to the method and the rpo walk.
    pub fn add_block(&mut self) -> BlockId {
        let id = self.blocks.alloc(Block::new());
        self.rpo.push(id);
        id
    }

    /// Borrow a block.
    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Mutably borrow a block.
    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    /// Insert `node` into the graph and append it to `block`'s schedule.
    pub fn push(&mut self, block: BlockId, node: Node) -> NodeId {
        let mut node = node;
        node.block = block;
        let id = self.graph.add_node(node);
        self.blocks[block].schedule.push(id);
        id
    }

    /// Append an already-inserted node to `block`'s schedule.
    pub fn schedule_existing(&mut self, block: BlockId, id: NodeId) {
        self.graph.node_mut(id).block = block;
        self.blocks[block].schedule.push(id);
    }

    /// Live instruction count across all blocks.
    pub fn live_instruction_count(&self) -> usize {
        self.blocks
            .iter()
            .flat_map(|(_, b)| b.schedule.iter())
            .filter(|&&id| !self.graph.node(id).is_dead())
            .count()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::stamp::ElementKind;

    #[test]
    fn test_blocks_and_rpo() {
        let mut method = Method::new("m");
        let b0 = method.add_block();
        let b1 = method.add_block();
        assert_eq!(method.rpo, vec![b0, b1]);
        assert!(method.block(b0).schedule.is_empty());
    }

    #[test]
    fn test_schedule_existing() {
        let mut method = Method::new("m");
        let b0 = method.add_block();
        let c = method.graph.const_int(b0, ElementKind::I32, 7);
        method.schedule_existing(b0, c);
        assert_eq!(method.block(b0).schedule, vec![c]);
        assert_eq!(method.live_instruction_count(), 1);
    }
}
