//! Target SIMD capability modeling.
//!
//! The pass only needs one fact about the target: the maximum number of
//! lanes a vector of a given element kind may have. That oracle is kept
//! behind a trait so tests and embedders can substitute fixed widths, with
//! [`SimdLevel`] providing the stock x86-64 answers.

use crate::ir::stamp::ElementKind;

// =============================================================================
// SIMD Level
// =============================================================================

/// Target SIMD capability level.
///
/// Higher levels include all capabilities of lower levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SimdLevel {
    /// SSE4.2: 128-bit vectors.
    Sse42,
    /// AVX: 256-bit floating-point, integer operations still 128-bit.
    Avx,
    /// AVX2: full 256-bit integer and floating-point support.
    Avx2,
    /// AVX-512: 512-bit vectors with masking.
    Avx512,
}

impl SimdLevel {
    /// Maximum vector register width in bytes for the given element kind.
    ///
    /// AVX is the only asymmetric level: 256-bit floats, 128-bit integers.
    pub const fn max_vector_bytes(self, kind: ElementKind) -> usize {
        match self {
            SimdLevel::Sse42 => 16,
            SimdLevel::Avx => {
                if kind.is_float() {
                    32
                } else {
                    16
                }
            }
            SimdLevel::Avx2 => 32,
            SimdLevel::Avx512 => 64,
        }
    }
}

impl Default for SimdLevel {
    fn default() -> Self {
        SimdLevel::Avx2
    }
}

// =============================================================================
// Width Oracle
// =============================================================================

/// Oracle answering "how many lanes can a vector of this element kind have".
///
/// Supplied externally; the pass never second-guesses it. A result below 2
/// means the kind cannot be vectorized at all.
pub trait VectorWidthOracle {
    /// Maximum supported lane count for `kind`.
    fn max_lanes(&self, kind: ElementKind) -> usize;
}

impl VectorWidthOracle for SimdLevel {
    fn max_lanes(&self, kind: ElementKind) -> usize {
        let bytes = kind.bytes();
        if bytes == 0 {
            return 0;
        }
        self.max_vector_bytes(kind) / bytes as usize
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_lanes_by_level() {
        assert_eq!(SimdLevel::Sse42.max_lanes(ElementKind::I32), 4);
        assert_eq!(SimdLevel::Sse42.max_lanes(ElementKind::I64), 2);
        assert_eq!(SimdLevel::Avx2.max_lanes(ElementKind::I64), 4);
        assert_eq!(SimdLevel::Avx512.max_lanes(ElementKind::I64), 8);
        assert_eq!(SimdLevel::Avx512.max_lanes(ElementKind::I8), 64);
    }

    #[test]
    fn test_avx_integer_stays_narrow() {
        assert_eq!(SimdLevel::Avx.max_lanes(ElementKind::F64), 4);
        assert_eq!(SimdLevel::Avx.max_lanes(ElementKind::I64), 2);
    }

    #[test]
    fn test_void_has_no_lanes() {
        assert_eq!(SimdLevel::Avx2.max_lanes(ElementKind::Void), 0);
    }
}
