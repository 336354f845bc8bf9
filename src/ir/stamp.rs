//! Value stamps: element kind, byte width, lane count.
//!
//! A stamp describes the value an instruction produces. For this pass the
//! interesting facts are the element byte size (adjacency and alignment
//! arithmetic), primitive-ness (only primitive accesses are vectorized),
//! and the lane count (1 for scalars, >1 for vector instructions the
//! rewriter materializes).

use std::fmt;

// =============================================================================
// Element Kind
// =============================================================================

/// Primitive element kind of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// 8-bit integer.
    I8,
    /// 16-bit integer.
    I16,
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// No value (control effects, store results).
    Void,
}

impl ElementKind {
    /// Size of one element in bytes.
    #[inline]
    pub const fn bytes(self) -> i64 {
        match self {
            ElementKind::I8 => 1,
            ElementKind::I16 => 2,
            ElementKind::I32 => 4,
            ElementKind::I64 => 8,
            ElementKind::F32 => 4,
            ElementKind::F64 => 8,
            ElementKind::Void => 0,
        }
    }

    /// Whether this is a vectorizable primitive kind.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, ElementKind::Void)
    }

    /// Whether this is a floating-point kind.
    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ElementKind::F32 | ElementKind::F64)
    }
}

// =============================================================================
// Stamp
// =============================================================================

/// Kind and lane count of an instruction's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stamp {
    /// Element kind of each lane.
    pub kind: ElementKind,
    /// Lane count; 1 for scalar values.
    pub lanes: u8,
}

impl Stamp {
    /// Scalar stamp of the given kind.
    #[inline]
    pub const fn scalar(kind: ElementKind) -> Self {
        Stamp { kind, lanes: 1 }
    }

    /// Vector stamp with `lanes` elements of `kind`.
    #[inline]
    pub const fn vector(kind: ElementKind, lanes: u8) -> Self {
        Stamp { kind, lanes }
    }

    /// Stamp for instructions producing no value.
    pub const VOID: Stamp = Stamp {
        kind: ElementKind::Void,
        lanes: 1,
    };

    /// Whether this stamp is a single lane.
    #[inline]
    pub const fn is_scalar(self) -> bool {
        self.lanes == 1
    }

    /// Total width in bytes.
    #[inline]
    pub const fn byte_width(self) -> i64 {
        self.kind.bytes() * self.lanes as i64
    }

    /// Stamps are compatible when kind and lane count agree.
    #[inline]
    pub const fn compatible(self, other: Stamp) -> bool {
        matches!(
            (self.kind, other.kind),
            (ElementKind::I8, ElementKind::I8)
                | (ElementKind::I16, ElementKind::I16)
                | (ElementKind::I32, ElementKind::I32)
                | (ElementKind::I64, ElementKind::I64)
                | (ElementKind::F32, ElementKind::F32)
                | (ElementKind::F64, ElementKind::F64)
                | (ElementKind::Void, ElementKind::Void)
        ) && self.lanes == other.lanes
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_scalar() {
            write!(f, "{:?}", self.kind)
        } else {
            write!(f, "<{}x{:?}>", self.lanes, self.kind)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        assert_eq!(ElementKind::I8.bytes(), 1);
        assert_eq!(ElementKind::I32.bytes(), 4);
        assert_eq!(ElementKind::F64.bytes(), 8);
        assert_eq!(ElementKind::Void.bytes(), 0);
    }

    #[test]
    fn test_primitiveness() {
        assert!(ElementKind::I32.is_primitive());
        assert!(ElementKind::F32.is_primitive());
        assert!(!ElementKind::Void.is_primitive());
    }

    #[test]
    fn test_stamp_widths() {
        assert_eq!(Stamp::scalar(ElementKind::I32).byte_width(), 4);
        assert_eq!(Stamp::vector(ElementKind::I32, 4).byte_width(), 16);
        assert!(Stamp::vector(ElementKind::I32, 4) == Stamp::vector(ElementKind::I32, 4));
    }

    #[test]
    fn test_stamp_compatibility() {
        let a = Stamp::scalar(ElementKind::I32);
        let b = Stamp::scalar(ElementKind::I32);
        let c = Stamp::scalar(ElementKind::I64);
        assert!(a.compatible(b));
        assert!(!a.compatible(c));
        assert!(!a.compatible(Stamp::vector(ElementKind::I32, 2)));
    }
}
