//! Genetic search over xorshift-multiply-xorshift mixers.
//!
//! No knobs: seed from OS entropy, breed forever, print every gene whose
//! exact bias crosses the printability threshold.

use std::io::stdout;

use clap::Parser;

use bitmix_cli::run_driver;
use bitmix_vm::prelude::*;
use bitmix_vm::search::genetic::{pool_from_entropy, BiasScorer};

#[derive(Debug, Parser)]
#[command(
    name = "bitmix-genetic",
    version,
    about = "Genetic search for low-bias xorshift-multiply mixers"
)]
struct Args {}

fn main() {
    run_driver("bitmix-genetic", || {
        let Args {} = Args::parse();
        let mut pool = pool_from_entropy()?;
        let scorer = BiasScorer::default();
        let mut out = stdout().lock();
        pool.run(&scorer, &mut out)?;
        Ok(())
    })
}
