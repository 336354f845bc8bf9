//! Pair set and pack combination.
//!
//! During pack discovery candidates live as ordered pairs `(left, right)`,
//! meaning "left provides lane i, right lane i+1". Each instruction may be
//! the left of at most one pair and the right of at most one pair, so
//! pairs sharing an endpoint chain into longer packs:
//! `(a,b)` and `(b,c)` combine to the pack `[a, b, c]`.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::ir::NodeId;

// =============================================================================
// Pairs
// =============================================================================

/// An ordered candidate pair of lane-adjacent instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    /// Lane i.
    pub left: NodeId,
    /// Lane i+1.
    pub right: NodeId,
}

/// The set of candidate pairs for one block.
#[derive(Debug, Default)]
pub struct PackSet {
    pairs: Vec<Pair>,
    left_index: FxHashMap<NodeId, usize>,
    right_index: FxHashMap<NodeId, usize>,
}

impl PackSet {
    /// Create an empty set.
    pub fn new() -> Self {
        PackSet::default()
    }

    /// Try to insert a pair. Fails when either endpoint already occupies
    /// the same lane side in another pair, keeping lane assignment
    /// injective.
    pub fn insert(&mut self, left: NodeId, right: NodeId) -> bool {
        if self.left_index.contains_key(&left) || self.right_index.contains_key(&right) {
            return false;
        }
        let index = self.pairs.len();
        self.pairs.push(Pair { left, right });
        self.left_index.insert(left, index);
        self.right_index.insert(right, index);
        true
    }

    /// Whether exactly this pair is present.
    pub fn contains_pair(&self, left: NodeId, right: NodeId) -> bool {
        self.left_index
            .get(&left)
            .is_some_and(|&i| self.pairs[i].right == right)
    }

    /// Whether `node` is the left endpoint of some pair.
    #[inline]
    pub fn has_left(&self, node: NodeId) -> bool {
        self.left_index.contains_key(&node)
    }

    /// Whether `node` is the right endpoint of some pair.
    #[inline]
    pub fn has_right(&self, node: NodeId) -> bool {
        self.right_index.contains_key(&node)
    }

    /// The right partner of `node`, if it is a left endpoint.
    pub fn right_of(&self, node: NodeId) -> Option<NodeId> {
        self.left_index.get(&node).map(|&i| self.pairs[i].right)
    }

    /// The left partner of `node`, if it is a right endpoint.
    pub fn left_of(&self, node: NodeId) -> Option<NodeId> {
        self.right_index.get(&node).map(|&i| self.pairs[i].left)
    }

    /// Whether `node` participates in any pair, on either side.
    pub fn is_paired(&self, node: NodeId) -> bool {
        self.has_left(node) || self.has_right(node)
    }

    /// All pairs, in insertion order.
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Number of pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the set holds no pairs.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

// =============================================================================
// Packs
// =============================================================================

/// A maximal chain of pairs: the instructions that become one vector
/// instruction, in lane order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pack {
    /// Lane members, lane 0 first.
    pub elements: SmallVec<[NodeId; 8]>,
}

impl Pack {
    /// Lane count.
    #[inline]
    pub fn lanes(&self) -> usize {
        self.elements.len()
    }

    /// Lane 0 member.
    #[inline]
    pub fn first(&self) -> NodeId {
        self.elements[0]
    }

    /// Whether `node` occupies some lane of this pack.
    pub fn contains(&self, node: NodeId) -> bool {
        self.elements.contains(&node)
    }
}

/// Combine the pair set into maximal packs.
///
/// Chains start at pairs whose left endpoint is not the right endpoint of
/// any other pair and follow `right_of` links. A visited set guards
/// against degenerate cyclic chains; members of a cycle produce no pack.
pub fn combine_pairs(pairs: &PackSet) -> Vec<Pack> {
    let mut packs = Vec::new();
    let mut visited: FxHashSet<NodeId> = FxHashSet::default();

    for pair in pairs.pairs() {
        if pairs.has_right(pair.left) || visited.contains(&pair.left) {
            continue;
        }
        let mut elements: SmallVec<[NodeId; 8]> = SmallVec::new();
        let mut current = pair.left;
        loop {
            if !visited.insert(current) {
                break;
            }
            elements.push(current);
            match pairs.right_of(current) {
                Some(next) => current = next,
                None => break,
            }
        }
        if elements.len() >= 2 {
            packs.push(Pack { elements });
        }
    }
    packs
}

// =============================================================================
// Tests
// =============================================================================
