//! Instruction nodes.
//!
//! An instruction is an opcode plus an ordered operand list, a stamp, and
//! its owning block. Memory accesses put their base at operand 0, the
//! optional index expression at operand 1 (signalled by the `INDEXED`
//! flag), and writes put the stored value last.

use super::arena::Id;
use super::block::BlockId;
use super::opcode::Opcode;
use super::stamp::Stamp;

/// Unique identifier of an instruction.
pub type NodeId = Id<Node>;

// =============================================================================
// Input List
// =============================================================================

/// Compact operand list.
///
/// Almost every instruction has at most three operands (an indexed write);
/// only `VecPack` spills to the heap variant.
#[derive(Clone, Default)]
pub enum InputList {
    /// No operands.
    #[default]
    Empty,
    /// One operand.
    Single(NodeId),
    /// Two operands.
    Pair(NodeId, NodeId),
    /// Three operands.
    Triple(NodeId, NodeId, NodeId),
    /// Four or more operands.
    Many(Vec<NodeId>),
}

impl InputList {
    /// Build from a slice.
    pub fn from_slice(inputs: &[NodeId]) -> Self {
        match inputs {
            [] => InputList::Empty,
            [a] => InputList::Single(*a),
            [a, b] => InputList::Pair(*a, *b),
            [a, b, c] => InputList::Triple(*a, *b, *c),
            _ => InputList::Many(inputs.to_vec()),
        }
    }

    /// Operand count.
    pub fn len(&self) -> usize {
        match self {
            InputList::Empty => 0,
            InputList::Single(_) => 1,
            InputList::Pair(..) => 2,
            InputList::Triple(..) => 3,
            InputList::Many(v) => v.len(),
        }
    }

    /// Whether there are no operands.
    pub fn is_empty(&self) -> bool {
        matches!(self, InputList::Empty)
    }

    /// Operand at `index`.
    pub fn get(&self, index: usize) -> Option<NodeId> {
        match self {
            InputList::Empty => None,
            InputList::Single(a) => (index == 0).then_some(*a),
            InputList::Pair(a, b) => match index {
                0 => Some(*a),
                1 => Some(*b),
                _ => None,
            },
            InputList::Triple(a, b, c) => match index {
                0 => Some(*a),
                1 => Some(*b),
                2 => Some(*c),
                _ => None,
            },
            InputList::Many(v) => v.get(index).copied(),
        }
    }

    /// Overwrite the operand at `index`; out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, value: NodeId) {
        match self {
            InputList::Single(a) if index == 0 => *a = value,
            InputList::Pair(a, b) => match index {
                0 => *a = value,
                1 => *b = value,
                _ => {}
            },
            InputList::Triple(a, b, c) => match index {
                0 => *a = value,
                1 => *b = value,
                2 => *c = value,
                _ => {}
            },
            InputList::Many(v) => {
                if index < v.len() {
                    v[index] = value;
                }
            }
            _ => {}
        }
    }

    /// Iterate over operands.
    pub fn iter(&self) -> InputIter<'_> {
        InputIter {
            list: self,
            index: 0,
        }
    }
}

impl std::fmt::Debug for InputList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Iterator over an [`InputList`].
pub struct InputIter<'a> {
    list: &'a InputList,
    index: usize,
}

impl Iterator for InputIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.list.get(self.index);
        self.index += 1;
        result
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.list.len().saturating_sub(self.index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for InputIter<'_> {}

// =============================================================================
// Node Flags
// =============================================================================

bitflags::bitflags! {
    /// Instruction property flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct NodeFlags: u8 {
        /// Deleted by a rewrite; skipped by every traversal.
        const DEAD = 0b0000_0001;
        /// Memory access has an index operand at position 1.
        const INDEXED = 0b0000_0010;
    }
}

// =============================================================================
// Node
// =============================================================================

/// An instruction in the method's graph.
#[derive(Clone)]
pub struct Node {
    /// Operation.
    pub op: Opcode,
    /// Ordered operands (use-def edges).
    pub inputs: InputList,
    /// Value stamp.
    pub stamp: Stamp,
    /// Owning basic block.
    pub block: BlockId,
    /// Property flags.
    pub flags: NodeFlags,
}

impl Node {
    /// Create a node.
    pub fn new(op: Opcode, inputs: InputList, stamp: Stamp, block: BlockId) -> Self {
        Node {
            op,
            inputs,
            stamp,
            block,
            flags: NodeFlags::empty(),
        }
    }

    /// Whether this node has been deleted.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }

    /// Mark this node deleted.
    #[inline]
    pub fn mark_dead(&mut self) {
        self.flags.insert(NodeFlags::DEAD);
    }

    /// Whether this node sits in the block's control chain.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.op.is_fixed()
    }

    /// Base reference of a memory access.
    pub fn access_base(&self) -> Option<NodeId> {
        if self.op.is_memory_access() {
            self.inputs.get(0)
        } else {
            None
        }
    }

    /// Index expression of a memory access, if it has one.
    pub fn access_index(&self) -> Option<NodeId> {
        if self.op.is_memory_access() && self.flags.contains(NodeFlags::INDEXED) {
            self.inputs.get(1)
        } else {
            None
        }
    }

    /// Value stored by a memory write.
    pub fn stored_value(&self) -> Option<NodeId> {
        if self.op.is_write() {
            let idx = if self.flags.contains(NodeFlags::INDEXED) {
                2
            } else {
                1
            };
            self.inputs.get(idx)
        } else {
            None
        }
    }

    /// Element byte size of this instruction's value.
    #[inline]
    pub fn element_size(&self) -> i64 {
        self.stamp.kind.bytes()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} {:?} : {}", self.op, self.inputs, self.stamp)
    }
}

// =============================================================================
// Tests
// =============================================================================
