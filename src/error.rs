//! Error taxonomy for the vectorization pass.
//!
//! Almost nothing in this pass is an error: independence failures,
//! missing seeds, denied methods, and scheduling conflicts are all ordinary
//! outcomes handled inline. The single fatal case is reaching codegen with
//! a pack whose representative instruction is not one of the closed set of
//! rewritable kinds; that indicates the pack builder admitted something it
//! must not have, and the method's compilation is aborted.

use crate::ir::node::NodeId;
use crate::ir::opcode::Opcode;
use thiserror::Error;

/// Errors surfaced by the SLP pass.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SlpError {
    /// A pack reached codegen whose representative element is not a memory
    /// read, memory write, or unary/binary arithmetic instruction.
    #[error("unsupported instruction kind {op:?} in {lanes}-lane pack (representative {node:?})")]
    UnsupportedPack {
        /// Representative (first) element of the offending pack.
        node: NodeId,
        /// Its operation.
        op: Opcode,
        /// Pack width.
        lanes: usize,
    },

    /// A packed memory access is missing its base or stored-value operand.
    #[error("memory access {node:?} is missing an address or value operand")]
    MalformedAccess {
        /// The malformed access.
        node: NodeId,
    },
}
