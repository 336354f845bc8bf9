//! Instruction graph for a compiled method.
//!
//! The IR is deliberately small: a flat arena of instructions connected by
//! operand edges, grouped into basic blocks whose linear order has already
//! been fixed by an external scheduler. Side-effecting instructions keep
//! their relative order within a block (the control chain); pure
//! instructions are ordered by the schedule alone.

pub mod arena;
pub mod block;
pub mod graph;
pub mod node;
pub mod opcode;
pub mod stamp;

pub use arena::{Arena, BitSet, Id, SecondaryMap};
pub use block::{Block, BlockId, Method};
pub use graph::Graph;
pub use node::{InputList, Node, NodeFlags, NodeId};
pub use opcode::{BinaryOp, Opcode, UnaryOp};
pub use stamp::{ElementKind, Stamp};
