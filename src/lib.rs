//! Block-local superword-level parallelism (SLP) autovectorization.
//!
//! This crate rewrites groups of isomorphic, independent, memory-adjacent
//! scalar instructions inside a single basic block into vector (SIMD)
//! instructions, with scalar extracts as glue for consumers outside the
//! group. It operates on a compact instruction graph whose per-block linear
//! order has already been produced by an external scheduler.
//!
//! The pass pipeline, per block:
//!
//! 1. **Analysis**: depth index, barrier positions, alignment map
//! 2. **Seeding**: pairs of adjacent primitive memory accesses
//! 3. **Extension**: use-def and def-use chain walks to a fixed point
//! 4. **Combination**: chained pairs spliced into multi-lane packs
//! 5. **Scheduling/Rewriting**: pack-atomic linearization and codegen
//!
//! Loop vectorization and cross-block packing are out of scope; the pass is
//! a no-op for blocks with no vectorization opportunity.

pub mod error;
pub mod ir;
pub mod slp;
pub mod target;

pub use error::SlpError;
pub use slp::{SlpConfig, SlpStats, SlpVectorize};
pub use target::{SimdLevel, VectorWidthOracle};

use ir::block::Method;

/// An optimization pass over a single compiled method.
///
/// Passes are run once per method and report whether they changed the
/// instruction graph. Only internal-invariant violations surface as errors;
/// every analysis decision is a total function.
pub trait OptimizationPass {
    /// Short name for diagnostics.
    fn name(&self) -> &'static str;

    /// Run the pass, returning whether the method was modified.
    fn run(&mut self, method: &mut Method) -> Result<bool, SlpError>;
}
