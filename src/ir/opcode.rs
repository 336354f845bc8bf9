//! Instruction opcodes.
//!
//! The opcode set is closed on purpose: pack codegen dispatches over it
//! with a match whose default arm is a hard invariant violation, so every
//! kind the pack builder may admit has to be spelled out here.
//!
//! Memory accesses carry their constant byte displacement in the opcode;
//! base and (optional) index live in the operand list, see
//! [`crate::ir::node::Node`].

// =============================================================================
// Arithmetic Operators
// =============================================================================

/// Unary arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise not.
    Not,
    /// Sign extension (also an address sub-expression).
    SignExtend,
}

/// Binary arithmetic operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Addition.
    Add,
    /// Subtraction.
    Sub,
    /// Multiplication.
    Mul,
    /// Bitwise and.
    And,
    /// Bitwise or.
    Or,
    /// Bitwise xor.
    Xor,
    /// Shift left.
    Shl,
    /// Arithmetic shift right.
    Shr,
}

// =============================================================================
// Opcode
// =============================================================================

/// Operation performed by an instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Opcode {
    /// Integer constant.
    ConstInt(i64),
    /// Float constant (bit pattern).
    ConstFloat(u64),
    /// Method parameter.
    Parameter(u16),
    /// Unary arithmetic.
    Unary(UnaryOp),
    /// Binary arithmetic.
    Binary(BinaryOp),
    /// Scalar memory read at `base [+ index] + displacement`.
    Read {
        /// Constant byte displacement.
        displacement: i64,
    },
    /// Scalar memory write at `base [+ index] + displacement`.
    Write {
        /// Constant byte displacement.
        displacement: i64,
    },
    /// Memory barrier: orders the control chain around it.
    Barrier,
    /// Control split. A block containing one is never vectorized.
    Branch,
    /// Block/method exit.
    Return,
    /// Vector memory read (materialized by the rewriter).
    VecRead {
        /// Constant byte displacement of lane 0.
        displacement: i64,
    },
    /// Vector memory write (materialized by the rewriter).
    VecWrite {
        /// Constant byte displacement of lane 0.
        displacement: i64,
    },
    /// Gather scalars into a vector value.
    VecPack,
    /// Extract one lane of a vector value.
    VecExtract {
        /// Lane to extract.
        lane: u8,
    },
}

impl Opcode {
    /// Operation-tag equality: same kind of operation, payload ignored for
    /// everything except the arithmetic operator itself.
    ///
    /// Two reads at different displacements share a tag (that difference is
    /// exactly what adjacency is about); an `Add` and a `Sub` do not.
    pub fn same_tag(&self, other: &Opcode) -> bool {
        match (self, other) {
            (Opcode::Unary(a), Opcode::Unary(b)) => a == b,
            (Opcode::Binary(a), Opcode::Binary(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }

    /// Whether this instruction is a memory access (scalar or vector).
    #[inline]
    pub const fn is_memory_access(&self) -> bool {
        matches!(
            self,
            Opcode::Read { .. }
                | Opcode::Write { .. }
                | Opcode::VecRead { .. }
                | Opcode::VecWrite { .. }
        )
    }

    /// Whether this is a memory write (scalar or vector).
    #[inline]
    pub const fn is_write(&self) -> bool {
        matches!(self, Opcode::Write { .. } | Opcode::VecWrite { .. })
    }

    /// Constant byte displacement, for memory accesses.
    #[inline]
    pub const fn displacement(&self) -> Option<i64> {
        match self {
            Opcode::Read { displacement }
            | Opcode::Write { displacement }
            | Opcode::VecRead { displacement }
            | Opcode::VecWrite { displacement } => Some(*displacement),
            _ => None,
        }
    }

    /// Whether this instruction is pinned in the block's control chain.
    #[inline]
    pub const fn is_fixed(&self) -> bool {
        matches!(
            self,
            Opcode::Read { .. }
                | Opcode::Write { .. }
                | Opcode::VecRead { .. }
                | Opcode::VecWrite { .. }
                | Opcode::Barrier
                | Opcode::Branch
                | Opcode::Return
        )
    }

    /// Whether the pack builder may ever put this instruction into a pair.
    ///
    /// Restricting pairing to the kinds codegen can rewrite keeps the
    /// unsupported-kind arm of codegen a true internal invariant.
    #[inline]
    pub const fn is_packable(&self) -> bool {
        matches!(
            self,
            Opcode::Read { .. } | Opcode::Write { .. } | Opcode::Unary(_) | Opcode::Binary(_)
        )
    }

    /// Whether the presence of this instruction disqualifies its whole
    /// block from vectorization.
    #[inline]
    pub const fn disqualifies_block(&self) -> bool {
        matches!(self, Opcode::Branch)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_tag_ignores_displacement() {
        let a = Opcode::Read { displacement: 0 };
        let b = Opcode::Read { displacement: 4 };
        assert!(a.same_tag(&b));
        assert!(!a.same_tag(&Opcode::Write { displacement: 4 }));
    }

    #[test]
    fn test_same_tag_distinguishes_operators() {
        assert!(Opcode::Binary(BinaryOp::Add).same_tag(&Opcode::Binary(BinaryOp::Add)));
        assert!(!Opcode::Binary(BinaryOp::Add).same_tag(&Opcode::Binary(BinaryOp::Sub)));
        assert!(!Opcode::Unary(UnaryOp::Neg).same_tag(&Opcode::Binary(BinaryOp::Add)));
    }

    #[test]
    fn test_packable_kinds() {
        assert!(Opcode::Read { displacement: 0 }.is_packable());
        assert!(Opcode::Binary(BinaryOp::Mul).is_packable());
        assert!(!Opcode::Barrier.is_packable());
        assert!(!Opcode::ConstInt(3).is_packable());
        assert!(!Opcode::VecPack.is_packable());
    }

    #[test]
    fn test_fixed_kinds() {
        assert!(Opcode::Write { displacement: 0 }.is_fixed());
        assert!(Opcode::Barrier.is_fixed());
        assert!(!Opcode::Binary(BinaryOp::Add).is_fixed());
        assert!(!Opcode::VecPack.is_fixed());
    }
}
