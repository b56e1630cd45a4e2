//! Engine error variants.
//!
//! Only the environment can fail here: entropy, page protection, dynamic
//! loading. Evaluators never fail and internal dispatch errors abort.

use std::io;

use thiserror::Error;

/// Engine runtime error variants.
#[derive(Debug, Error)]
pub enum Error {
    /// The OS entropy source could not be read.
    #[error("entropy source unavailable: {0}")]
    Entropy(#[source] rand::Error),
    /// A user-supplied seed string exceeded 32 bytes.
    #[error("seed too long ({0} bytes > 32)")]
    SeedTooLong(usize),
    /// Mapping the executable page failed.
    #[error("executable page allocation failed: {0}")]
    ExecMap(#[source] io::Error),
    /// Changing the page protection failed.
    #[error("executable page protection failed: {0}")]
    ExecProtect(#[source] io::Error),
    /// The shared object could not be loaded or lacks a `hash` symbol.
    #[error("could not load mixer: {0}")]
    DynLoad(#[from] libloading::Error),
    /// Writing an improvement event failed.
    #[error("output: {0}")]
    Io(#[from] io::Error),
}
