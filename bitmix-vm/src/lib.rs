//! Mixer materialization and measurement.
//!
//! The two subsystems every driver leans on: turning a
//! [`bitmix_asm::Program`] into a callable (an interpreter everywhere, a
//! runtime assembler on x86-64), and quantifying how far a callable
//! departs from ideal avalanche. On top sit the three search drivers
//! (random, genetic, steepest hill-climb) and the collaborators for
//! externally supplied mixers.

#![warn(missing_docs)]
#![deny(unused_must_use)]

pub mod consts;
pub mod dynload;
pub mod error;
pub mod eval;
pub mod interpreter;
#[cfg(target_arch = "x86_64")]
pub mod jit;
pub mod invert;
pub mod rng;
pub mod search;

pub use error::Error;

pub mod prelude {
    //! Everything a driver binary needs.
    #[doc(no_inline)]
    pub use bitmix_asm::{Kind, KindSet, Op, ParseError, Program, Template, Width};

    pub use crate::consts;
    pub use crate::dynload::{MixerLib, SeededMixer};
    pub use crate::error::Error;
    pub use crate::eval::{
        estimate_bias32, estimate_bias64, estimate_bias_seeded, exact_bias16,
        exact_bias32, SeededParams,
    };
    pub use crate::interpreter::{eval16, eval32, eval64, Sbox16};
    #[cfg(target_arch = "x86_64")]
    pub use crate::jit::ExecPage;
    pub use crate::rng::{driver_rng, rng_from_seed_str, sampled_rng, seed_from_entropy};
    pub use crate::search::climb::{self, Climber, Point};
    pub use crate::search::genetic::{self, Crossover, Gene, Pool};
    pub use crate::search::random::{self, RandomSearch};
}
