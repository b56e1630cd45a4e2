//! Tuning constants shared by the evaluators and drivers.

/// Default sampled-bias quality: the estimator draws `2^QUALITY` inputs.
pub const QUALITY: u32 = 18;

/// Lowest accepted quality knob.
pub const QUALITY_MIN: u32 = 12;

/// Highest accepted quality knob.
pub const QUALITY_MAX: u32 = 30;

/// Number of equal input ranges the exact 32-bit evaluator runs in
/// parallel. Must divide 2^32.
pub const EXACT_SPLIT: usize = 32;

/// Size of the JIT code page in bytes.
pub const PAGE_LEN: usize = 4096;

/// Genetic pool size.
pub const POOL: usize = 40;

/// Genes estimating below this sampled bias are re-scored exactly.
pub const THRESHOLD: f64 = 2.0;

/// Only genes with bias below this are worth printing.
pub const DONTCARE: f64 = 0.3;

/// Regenerate the genetic pool after this many minutes without
/// improvement.
pub const RESET_MINS: u64 = 90;

/// Number of multiplies in the hill-climb schema.
pub const HASHN: usize = 3;

/// Radius of the hill-climb shift neighborhood.
pub const SHIFT_RANGE: u32 = 1;

/// Radius of the hill-climb constant neighborhood, in steps of two.
pub const CONST_RANGE: u32 = 2;

/// Random hill-climb starts re-roll until the sampled estimate drops
/// below this.
pub const CLIMB_THRESHOLD: f64 = 1.95;

/// Default op-count range for the random driver.
pub const RANDOM_OPS: (usize, usize) = (3, 6);

/// Default initial best score for the random driver.
pub const RANDOM_THRESHOLD: f64 = 10.0;
