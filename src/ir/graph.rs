//! Instruction graph with def-use bookkeeping.
//!
//! The graph owns every instruction of a method and maintains, for each
//! instruction, the list of instructions that consume its value. Operand
//! edges and use lists are kept in sync by [`Graph::add_node`],
//! [`Graph::replace_input`], [`Graph::replace_all_uses`] and
//! [`Graph::kill`].

use super::arena::{Arena, SecondaryMap};
use super::block::BlockId;
use super::node::{InputList, Node, NodeFlags, NodeId};
use super::opcode::{BinaryOp, Opcode, UnaryOp};
use super::stamp::{ElementKind, Stamp};

/// The instruction graph of one method.
#[derive(Default)]
pub struct Graph {
    nodes: Arena<Node>,
    uses: SecondaryMap<Node, Vec<NodeId>>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Graph {
            nodes: Arena::new(),
            uses: SecondaryMap::new(),
        }
    }

    // =========================================================================
    // Access
    // =========================================================================

    /// Borrow an instruction.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Mutably borrow an instruction.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Borrow an instruction, if the id is in range.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Total instruction count, dead ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no instructions.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over `(id, node)` pairs, dead ones included.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter()
    }

    /// Consumers of `id`'s value.
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        self.uses.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of consumers of `id`'s value.
    #[inline]
    pub fn use_count(&self, id: NodeId) -> usize {
        self.uses(id).len()
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Insert a node, registering it as a user of each of its operands.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let inputs: smallvec::SmallVec<[NodeId; 4]> = node.inputs.iter().collect();
        let id = self.nodes.alloc(node);
        self.uses.set(id, Vec::new());
        for input in inputs {
            self.record_use(input, id);
        }
        id
    }

    /// Swap operand `index` of `user` from its current value to `new_input`.
    pub fn replace_input(&mut self, user: NodeId, index: usize, new_input: NodeId) {
        if let Some(old) = self.nodes[user].inputs.get(index) {
            if old == new_input {
                return;
            }
            self.remove_use(old, user);
            self.nodes[user].inputs.set(index, new_input);
            self.record_use(new_input, user);
        }
    }

    /// Redirect every consumer of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        let users: Vec<NodeId> = self.uses(old).to_vec();
        for user in users {
            let count = self.nodes[user].inputs.len();
            for index in 0..count {
                if self.nodes[user].inputs.get(index) == Some(old) {
                    self.replace_input(user, index, new);
                }
            }
        }
    }

    /// Mark a node dead and drop its operand edges.
    ///
    /// The caller is responsible for the node having no remaining uses and
    /// for removing it from its block's schedule.
    pub fn kill(&mut self, id: NodeId) {
        debug_assert_eq!(self.use_count(id), 0, "killing {id:?} with live uses");
        let inputs: smallvec::SmallVec<[NodeId; 4]> = self.nodes[id].inputs.iter().collect();
        for input in inputs {
            self.remove_use(input, id);
        }
        self.nodes[id].inputs = InputList::Empty;
        self.nodes[id].mark_dead();
    }

    fn record_use(&mut self, def: NodeId, user: NodeId) {
        self.uses.resize(def.as_usize() + 1);
        if let Some(list) = self.uses.get_mut(def) {
            list.push(user);
        }
    }

    fn remove_use(&mut self, def: NodeId, user: NodeId) {
        if let Some(list) = self.uses.get_mut(def) {
            if let Some(pos) = list.iter().position(|&u| u == user) {
                list.swap_remove(pos);
            }
        }
    }

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Integer constant.
    pub fn const_int(&mut self, block: BlockId, kind: ElementKind, value: i64) -> NodeId {
        self.add_node(Node::new(
            Opcode::ConstInt(value),
            InputList::Empty,
            Stamp::scalar(kind),
            block,
        ))
    }

    /// Float constant from its bit pattern.
    pub fn const_float(&mut self, block: BlockId, kind: ElementKind, bits: u64) -> NodeId {
        self.add_node(Node::new(
            Opcode::ConstFloat(bits),
            InputList::Empty,
            Stamp::scalar(kind),
            block,
        ))
    }

    /// Method parameter.
    pub fn parameter(&mut self, block: BlockId, kind: ElementKind, index: u16) -> NodeId {
        self.add_node(Node::new(
            Opcode::Parameter(index),
            InputList::Empty,
            Stamp::scalar(kind),
            block,
        ))
    }

    /// Unary arithmetic; the result inherits the operand's stamp.
    pub fn unary(&mut self, block: BlockId, op: UnaryOp, operand: NodeId) -> NodeId {
        let stamp = self.nodes[operand].stamp;
        self.add_node(Node::new(
            Opcode::Unary(op),
            InputList::Single(operand),
            stamp,
            block,
        ))
    }

    /// Binary arithmetic; the result inherits the left operand's stamp.
    pub fn binary(&mut self, block: BlockId, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
        let stamp = self.nodes[lhs].stamp;
        self.add_node(Node::new(
            Opcode::Binary(op),
            InputList::Pair(lhs, rhs),
            stamp,
            block,
        ))
    }

    /// Scalar memory read.
    pub fn read(
        &mut self,
        block: BlockId,
        kind: ElementKind,
        base: NodeId,
        index: Option<NodeId>,
        displacement: i64,
    ) -> NodeId {
        let (inputs, flags) = Self::access_inputs(base, index, None);
        let mut node = Node::new(
            Opcode::Read { displacement },
            inputs,
            Stamp::scalar(kind),
            block,
        );
        node.flags = flags;
        self.add_node(node)
    }

    /// Scalar memory write. The node's stamp records the stored element
    /// kind; the write itself produces no value.
    pub fn write(
        &mut self,
        block: BlockId,
        kind: ElementKind,
        base: NodeId,
        index: Option<NodeId>,
        displacement: i64,
        value: NodeId,
    ) -> NodeId {
        let (inputs, flags) = Self::access_inputs(base, index, Some(value));
        let mut node = Node::new(
            Opcode::Write { displacement },
            inputs,
            Stamp::scalar(kind),
            block,
        );
        node.flags = flags;
        self.add_node(node)
    }

    /// Memory barrier.
    pub fn barrier(&mut self, block: BlockId) -> NodeId {
        self.add_node(Node::new(
            Opcode::Barrier,
            InputList::Empty,
            Stamp::VOID,
            block,
        ))
    }

    /// Control split on `condition`.
    pub fn branch(&mut self, block: BlockId, condition: NodeId) -> NodeId {
        self.add_node(Node::new(
            Opcode::Branch,
            InputList::Single(condition),
            Stamp::VOID,
            block,
        ))
    }

    /// Method return, optionally carrying a value.
    pub fn ret(&mut self, block: BlockId, value: Option<NodeId>) -> NodeId {
        let inputs = match value {
            Some(v) => InputList::Single(v),
            None => InputList::Empty,
        };
        self.add_node(Node::new(Opcode::Return, inputs, Stamp::VOID, block))
    }

    /// Vector memory read of `lanes` consecutive elements.
    pub fn vec_read(
        &mut self,
        block: BlockId,
        kind: ElementKind,
        lanes: u8,
        base: NodeId,
        index: Option<NodeId>,
        displacement: i64,
    ) -> NodeId {
        let (inputs, flags) = Self::access_inputs(base, index, None);
        let mut node = Node::new(
            Opcode::VecRead { displacement },
            inputs,
            Stamp::vector(kind, lanes),
            block,
        );
        node.flags = flags;
        self.add_node(node)
    }

    /// Vector memory write of a whole vector value.
    pub fn vec_write(
        &mut self,
        block: BlockId,
        kind: ElementKind,
        lanes: u8,
        base: NodeId,
        index: Option<NodeId>,
        displacement: i64,
        value: NodeId,
    ) -> NodeId {
        let (inputs, flags) = Self::access_inputs(base, index, Some(value));
        let mut node = Node::new(
            Opcode::VecWrite { displacement },
            inputs,
            Stamp::vector(kind, lanes),
            block,
        );
        node.flags = flags;
        self.add_node(node)
    }

    /// Gather scalars into one vector value, lane order = operand order.
    pub fn vec_pack(&mut self, block: BlockId, kind: ElementKind, elements: &[NodeId]) -> NodeId {
        self.add_node(Node::new(
            Opcode::VecPack,
            InputList::from_slice(elements),
            Stamp::vector(kind, elements.len() as u8),
            block,
        ))
    }

    /// Extract one lane of a vector value.
    pub fn vec_extract(
        &mut self,
        block: BlockId,
        vector: NodeId,
        lane: u8,
        kind: ElementKind,
    ) -> NodeId {
        self.add_node(Node::new(
            Opcode::VecExtract { lane },
            InputList::Single(vector),
            Stamp::scalar(kind),
            block,
        ))
    }

    fn access_inputs(
        base: NodeId,
        index: Option<NodeId>,
        value: Option<NodeId>,
    ) -> (InputList, NodeFlags) {
        let mut operands: smallvec::SmallVec<[NodeId; 3]> = smallvec::smallvec![base];
        let mut flags = NodeFlags::empty();
        if let Some(index) = index {
            operands.push(index);
            flags.insert(NodeFlags::INDEXED);
        }
        if let Some(value) = value {
            operands.push(value);
        }
        (InputList::from_slice(&operands), flags)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn block0() -> BlockId {
        BlockId::new(0)
    }

    #[test]
    fn test_default_graph_is_usable() {
        // Node carries no Default; an empty graph must not require one.
        let mut graph = Graph::default();
        assert!(graph.is_empty());
        let a = graph.const_int(block0(), ElementKind::I32, 1);
        let neg = graph.unary(block0(), UnaryOp::Neg, a);
        assert_eq!(graph.uses(a), &[neg]);
    }

    #[test]
    fn test_use_lists_track_operands() {
        let mut graph = Graph::new();
        let a = graph.const_int(block0(), ElementKind::I32, 1);
        let b = graph.const_int(block0(), ElementKind::I32, 2);
        let sum = graph.binary(block0(), BinaryOp::Add, a, b);
        assert_eq!(graph.uses(a), &[sum]);
        assert_eq!(graph.uses(b), &[sum]);
        assert_eq!(graph.use_count(sum), 0);
    }

    #[test]
    fn test_replace_all_uses() {
        let mut graph = Graph::new();
        let a = graph.const_int(block0(), ElementKind::I32, 1);
        let b = graph.const_int(block0(), ElementKind::I32, 2);
        let s1 = graph.binary(block0(), BinaryOp::Add, a, a);
        let s2 = graph.binary(block0(), BinaryOp::Mul, a, b);

        graph.replace_all_uses(a, b);
        assert_eq!(graph.use_count(a), 0);
        assert_eq!(graph.node(s1).inputs.get(0), Some(b));
        assert_eq!(graph.node(s1).inputs.get(1), Some(b));
        assert_eq!(graph.node(s2).inputs.get(0), Some(b));
        assert_eq!(graph.uses(b).len(), 4);
    }

    #[test]
    fn test_kill_clears_edges() {
        let mut graph = Graph::new();
        let a = graph.const_int(block0(), ElementKind::I32, 1);
        let neg = graph.unary(block0(), UnaryOp::Neg, a);
        graph.kill(neg);
        assert!(graph.node(neg).is_dead());
        assert_eq!(graph.use_count(a), 0);
        assert!(graph.node(neg).inputs.is_empty());
    }

    #[test]
    fn test_memory_constructors() {
        let mut graph = Graph::new();
        let base = graph.parameter(block0(), ElementKind::I64, 0);
        let idx = graph.parameter(block0(), ElementKind::I64, 1);
        let load = graph.read(block0(), ElementKind::I32, base, Some(idx), 8);
        let store = graph.write(block0(), ElementKind::I32, base, None, 16, load);

        let load_node = graph.node(load);
        assert_eq!(load_node.access_base(), Some(base));
        assert_eq!(load_node.access_index(), Some(idx));
        assert_eq!(load_node.op.displacement(), Some(8));

        let store_node = graph.node(store);
        assert_eq!(store_node.access_base(), Some(base));
        assert_eq!(store_node.access_index(), None);
        assert_eq!(store_node.stored_value(), Some(load));
        assert_eq!(store_node.element_size(), 4);
    }

    #[test]
    fn test_vector_constructors() {
        let mut graph = Graph::new();
        let base = graph.parameter(block0(), ElementKind::I64, 0);
        let vload = graph.vec_read(block0(), ElementKind::F32, 4, base, None, 0);
        assert_eq!(graph.node(vload).stamp, Stamp::vector(ElementKind::F32, 4));

        let lane = graph.vec_extract(block0(), vload, 2, ElementKind::F32);
        assert_eq!(graph.node(lane).stamp, Stamp::scalar(ElementKind::F32));
        assert_eq!(graph.uses(vload), &[lane]);
    }
}
