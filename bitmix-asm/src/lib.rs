//! Atomic types of the bitmix search engine.
//!
//! A mixer is a short straight-line program of reversible bit-mixing
//! operations over one machine word. This crate defines the operation set,
//! the program and template types, their text forms, and random generation.
//! Materialization (interpretation, JIT) and measurement live in
//! `bitmix-vm`.

#![warn(missing_docs)]
#![deny(unused_must_use)]

mod conv;
mod op;
mod program;
mod template;

pub use conv::ParseError;
pub use op::{Direction, Kind, KindSet, Op, Width};
pub use program::{valid_adjacent, Program};
pub use template::{Template, TemplatePrograms};
