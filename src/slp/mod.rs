//! The SLP vectorization pass.
//!
//! [`SlpVectorize`] wires the per-block pipeline together: analysis
//! context, seeding and extension, pair combination, policy filtering,
//! pack-atomic scheduling, and finally codegen. Everything up to codegen
//! treats the graph as read-only, so a block that fails to schedule is
//! left untouched.

pub mod analysis;
pub mod builder;
pub mod filter;
pub mod packset;
pub mod policy;
pub mod schedule;

use log::{debug, trace};

use crate::error::SlpError;
use crate::ir::{BlockId, Method};
use crate::target::SimdLevel;
use crate::OptimizationPass;

pub use analysis::BlockAnalysis;
pub use builder::PackSetBuilder;
pub use filter::{FilterMode, MethodFilter};
pub use packset::{combine_pairs, Pack, PackSet, Pair};
pub use policy::{DefaultPolicy, ProfitabilityPolicy};
pub use schedule::{rewrite, BlockScheduler, ScheduleUnit};

// =============================================================================
// Configuration
// =============================================================================

/// Pass configuration.
#[derive(Debug, Clone, Default)]
pub struct SlpConfig {
    /// Target SIMD capability, the source of all vector widths.
    pub simd_level: SimdLevel,
    /// Method allow/deny filter consulted before running on a method.
    pub filter: MethodFilter,
}

impl SlpConfig {
    /// 128-bit configuration.
    pub fn sse42() -> Self {
        SlpConfig {
            simd_level: SimdLevel::Sse42,
            ..Default::default()
        }
    }

    /// 256-bit configuration.
    pub fn avx2() -> Self {
        SlpConfig {
            simd_level: SimdLevel::Avx2,
            ..Default::default()
        }
    }

    /// 512-bit configuration.
    pub fn avx512() -> Self {
        SlpConfig {
            simd_level: SimdLevel::Avx512,
            ..Default::default()
        }
    }

    /// Replace the method filter.
    pub fn with_filter(mut self, filter: MethodFilter) -> Self {
        self.filter = filter;
        self
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Counters accumulated across every method the pass runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlpStats {
    /// Methods handed to the pass.
    pub methods_seen: u32,
    /// Methods skipped by the allow/deny filter.
    pub methods_filtered: u32,
    /// Blocks examined.
    pub blocks_seen: u32,
    /// Blocks skipped because a control split disqualified them.
    pub blocks_skipped: u32,
    /// Packs that survived filtering and scheduling.
    pub packs_formed: u32,
    /// Packs discarded by scheduling violations.
    pub packs_discarded: u32,
    /// Vector instructions materialized.
    pub vector_nodes: u32,
    /// Scalar instructions deleted.
    pub scalars_removed: u32,
    /// Lane extracts inserted.
    pub extracts: u32,
}

impl SlpStats {
    /// Fold another set of counters into this one.
    pub fn merge(&mut self, other: &SlpStats) {
        self.methods_seen += other.methods_seen;
        self.methods_filtered += other.methods_filtered;
        self.blocks_seen += other.blocks_seen;
        self.blocks_skipped += other.blocks_skipped;
        self.packs_formed += other.packs_formed;
        self.packs_discarded += other.packs_discarded;
        self.vector_nodes += other.vector_nodes;
        self.scalars_removed += other.scalars_removed;
        self.extracts += other.extracts;
    }
}

// =============================================================================
// Pass
// =============================================================================

/// The block-local SLP autovectorization pass.
pub struct SlpVectorize {
    config: SlpConfig,
    stats: SlpStats,
    policy: Box<dyn ProfitabilityPolicy>,
}

impl SlpVectorize {
    /// Create the pass with the built-in profitability policy.
    pub fn new(config: SlpConfig) -> Self {
        SlpVectorize {
            config,
            stats: SlpStats::default(),
            policy: Box::new(DefaultPolicy),
        }
    }

    /// Create the pass with a custom profitability policy.
    pub fn with_policy(config: SlpConfig, policy: Box<dyn ProfitabilityPolicy>) -> Self {
        SlpVectorize {
            config,
            stats: SlpStats::default(),
            policy,
        }
    }

    /// Counters accumulated so far.
    pub fn stats(&self) -> &SlpStats {
        &self.stats
    }

    fn run_block(&mut self, method: &mut Method, block: BlockId) -> Result<bool, SlpError> {
        self.stats.blocks_seen += 1;
        let schedule = method.block(block).schedule.clone();
        if schedule
            .iter()
            .any(|&id| method.graph.node(id).op.disqualifies_block())
        {
            trace!("{}: block {block:?} has a control split, skipping", method.name);
            self.stats.blocks_skipped += 1;
            return Ok(false);
        }

        let mut analysis =
            analysis::BlockAnalysis::new(&method.graph, block, &schedule, &self.config.simd_level);
        let pairs = PackSetBuilder::new(&mut analysis, self.policy.as_ref()).build(&schedule);
        if pairs.is_empty() {
            return Ok(false);
        }
        trace!(
            "{}: block {block:?} has {} candidate pairs",
            method.name,
            pairs.len()
        );

        let mut packs = combine_pairs(&pairs);
        self.policy.filter_packs(&analysis, &mut packs);
        if packs.is_empty() {
            return Ok(false);
        }

        let scheduler = BlockScheduler::new(&method.graph, &schedule);
        let before = packs.len();
        let units = scheduler.linearize(&mut packs);
        self.stats.packs_discarded += (before - packs.len()) as u32;
        if packs.is_empty() {
            return Ok(false);
        }
        self.stats.packs_formed += packs.len() as u32;

        let counts = schedule::rewrite(method, block, &units, &packs)?;
        self.stats.vector_nodes += counts.vector_nodes;
        self.stats.scalars_removed += counts.scalars_removed;
        self.stats.extracts += counts.extracts;
        debug!(
            "{}: block {block:?} vectorized, {} packs, {} vector nodes, {} scalars removed",
            method.name,
            packs.len(),
            counts.vector_nodes,
            counts.scalars_removed
        );
        Ok(true)
    }
}

impl OptimizationPass for SlpVectorize {
    fn name(&self) -> &'static str {
        "slp-vectorize"
    }

    fn run(&mut self, method: &mut Method) -> Result<bool, SlpError> {
        self.stats.methods_seen += 1;
        if !self.config.filter.allows(&method.name) {
            debug!("{}: denied by method filter", method.name);
            self.stats.methods_filtered += 1;
            return Ok(false);
        }
        let mut changed = false;
        for block in method.rpo.clone() {
            changed |= self.run_block(method, block)?;
        }
        Ok(changed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ElementKind, Opcode};

    /// dst[0..n] = src[0..n], element by element.
    fn copy_method(n: i64) -> Method {
        let mut method = Method::new("copy");
        let block = method.add_block();
        let dst = method.graph.parameter(block, ElementKind::I32, 0);
        method.schedule_existing(block, dst);
        let src = method.graph.parameter(block, ElementKind::I32, 1);
        method.schedule_existing(block, src);
        for i in 0..n {
            let value = method.graph.read(block, ElementKind::I32, src, None, i * 4);
            method.schedule_existing(block, value);
            let store = method
                .graph
                .write(block, ElementKind::I32, dst, None, i * 4, value);
            method.schedule_existing(block, store);
        }
        method
    }

    #[test]
    fn test_pass_vectorizes_copy() {
        let mut pass = SlpVectorize::new(SlpConfig::avx2());
        let mut method = copy_method(4);
        let changed = pass.run(&mut method).unwrap();
        assert!(changed);

        let block = method.rpo[0];
        let ops: Vec<Opcode> = method
            .block(block)
            .schedule
            .iter()
            .map(|&id| method.graph.node(id).op)
            .collect();
        assert!(ops
            .iter()
            .any(|op| matches!(op, Opcode::VecRead { displacement: 0 })));
        assert!(ops
            .iter()
            .any(|op| matches!(op, Opcode::VecWrite { displacement: 0 })));
        assert!(!ops.iter().any(|op| matches!(op, Opcode::Read { .. })));
        assert!(!ops.iter().any(|op| matches!(op, Opcode::Write { .. })));

        let stats = pass.stats();
        assert_eq!(stats.blocks_seen, 1);
        assert!(stats.packs_formed >= 2);
        assert_eq!(stats.scalars_removed, 8);
    }

    #[test]
    fn test_pass_skips_blocks_with_control_splits() {
        let mut method = copy_method(4);
        let block = method.rpo[0];
        let cond = method.graph.parameter(block, ElementKind::I32, 2);
        method.schedule_existing(block, cond);
        let split = method.graph.branch(block, cond);
        method.schedule_existing(block, split);

        let mut pass = SlpVectorize::new(SlpConfig::avx2());
        let changed = pass.run(&mut method).unwrap();
        assert!(!changed);
        assert_eq!(pass.stats().blocks_skipped, 1);
    }

    #[test]
    fn test_pass_honors_method_filter() {
        let config = SlpConfig::avx2().with_filter(MethodFilter::deny(["copy"]));
        let mut pass = SlpVectorize::new(config);
        let mut method = copy_method(4);
        let changed = pass.run(&mut method).unwrap();
        assert!(!changed);
        assert_eq!(pass.stats().methods_filtered, 1);
        assert_eq!(pass.stats().blocks_seen, 0);
    }

    #[test]
    fn test_pass_is_noop_without_seeds() {
        let mut method = Method::new("scalars");
        let block = method.add_block();
        let a = method.graph.parameter(block, ElementKind::I32, 0);
        method.schedule_existing(block, a);
        let b = method.graph.parameter(block, ElementKind::I32, 1);
        method.schedule_existing(block, b);
        let sum = method
            .graph
            .binary(block, crate::ir::BinaryOp::Add, a, b);
        method.schedule_existing(block, sum);
        let out = method.graph.ret(block, Some(sum));
        method.schedule_existing(block, out);

        let mut pass = SlpVectorize::new(SlpConfig::avx2());
        let changed = pass.run(&mut method).unwrap();
        assert!(!changed);
        assert_eq!(pass.stats().packs_formed, 0);
    }

    #[test]
    fn test_stats_merge() {
        let mut a = SlpStats {
            methods_seen: 1,
            packs_formed: 2,
            ..Default::default()
        };
        let b = SlpStats {
            methods_seen: 3,
            scalars_removed: 4,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.methods_seen, 4);
        assert_eq!(a.packs_formed, 2);
        assert_eq!(a.scalars_removed, 4);
    }
}
