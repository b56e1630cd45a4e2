//! Steepest hill-climb refinement of three-multiply mixers.

use std::io::stdout;

use anyhow::{bail, Context};
use clap::Parser;

use bitmix_cli::run_driver;
use bitmix_vm::invert;
use bitmix_vm::prelude::*;
use bitmix_vm::search::climb::{generate_strict, BiasPointScorer, PointScorer};

#[derive(Debug, Parser)]
#[command(
    name = "bitmix-climb",
    version,
    about = "Refine a three-multiply mixer by steepest descent"
)]
struct Args {
    /// Evaluate the given pattern exactly and exit.
    #[arg(short = 'E', conflicts_with = "invert")]
    evaluate: bool,

    /// Print the inverse of the given pattern and exit.
    #[arg(short = 'I')]
    invert: bool,

    /// Initial point in bracket form, e.g. "[16 21f0aaad 15 d35a2d97 15 d35a2d97 16]".
    #[arg(short = 'p', value_name = "INIT")]
    pattern: Option<String>,

    /// Print less: once drops status lines, twice drops neighbor scores.
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    quiet: u8,

    /// Stop at the first local minimum.
    #[arg(short = 's')]
    one_shot: bool,

    /// Seed the generator from a string of up to 32 bytes.
    #[arg(short = 'x', value_name = "SEED")]
    seed: Option<String>,
}

fn main() {
    run_driver("bitmix-climb", || {
        let args = Args::parse();
        let start: Option<Point> = args
            .pattern
            .as_deref()
            .map(|p| p.parse().context("invalid pattern"))
            .transpose()?;

        if args.invert {
            let Some(point) = start else {
                bail!("-I requires -p");
            };
            print!("{}", invert::inverse_source(&point));
            return Ok(());
        }

        let scorer = BiasPointScorer::default();
        if args.evaluate {
            let Some(point) = start else {
                bail!("-E requires -p");
            };
            println!("{point} = {}", scorer.exact(&point));
            return Ok(());
        }

        let mut rng = match args.seed.as_deref() {
            Some(seed) => rng_from_seed_str(seed)?,
            None => driver_rng()?,
        };
        let start = match start {
            Some(point) => point,
            None => generate_strict(&scorer, &mut rng),
        };
        let mut climber = Climber::new(start)
            .with_one_shot(args.one_shot)
            .with_quiet(args.quiet);
        let mut out = stdout().lock();
        climber.run(&scorer, &mut rng, &mut out)?;
        Ok(())
    })
}
