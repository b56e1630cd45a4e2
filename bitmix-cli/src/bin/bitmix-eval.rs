//! Seed-sensitivity sweep for externally compiled permutation hashes.
//!
//! Loads a `(index, mask, seed) -> word` mixer and estimates its bias at
//! every power-of-two index width, reporting the total and average along
//! with raw throughput.

use std::time::Instant;

use anyhow::bail;
use clap::Parser;

use bitmix_cli::run_driver;
use bitmix_vm::prelude::*;

#[derive(Debug, Parser)]
#[command(
    name = "bitmix-eval",
    version,
    about = "Evaluate a seeded permutation hash at every power of two"
)]
struct Args {
    /// Shared object exporting hash(index, mask, seed).
    #[arg(short = 'l', value_name = "LIB")]
    library: String,

    /// Test all powers of two up to 2^N.
    #[arg(short = 'n', value_name = "N", default_value_t = 32)]
    nbits: u32,

    /// Sampled quality: 2^Q samples per width.
    #[arg(short = 'q', value_name = "Q", default_value_t = 16)]
    quality: u32,

    /// Perturb the full seed instead of only the masked bits.
    #[arg(short = 'f')]
    full_range: bool,

    /// Print the bias of every width tested.
    #[arg(short = 'v')]
    verbose: bool,
}

fn main() {
    run_driver("bitmix-eval", || {
        let args = Args::parse();
        if !(consts::QUALITY_MIN..=consts::QUALITY_MAX).contains(&args.quality) {
            bail!("invalid quality (12..30): {}", args.quality);
        }
        if args.nbits < 2 || args.nbits > 64 {
            bail!("invalid width bound: {}", args.nbits);
        }

        let lib = MixerLib::open(&args.library)?;
        let mixer = lib.seeded()?;
        let mut rng = sampled_rng()?;

        let mut total = 0.0;
        let mut nhash: u64 = 0;
        let started = Instant::now();
        for bits in 1..args.nbits {
            let params = SeededParams {
                bits,
                nbits: args.nbits,
                full_range: args.full_range,
                quality: args.quality,
            };
            let bias =
                estimate_bias_seeded(|x, m, s| mixer.call(x, m, s), &params, &mut rng);
            if args.verbose {
                println!("bias {bits:2}: {bias}");
            }
            total += bias;
            let rows = if args.full_range { args.nbits } else { bits };
            nhash += (1u64 << args.quality) * u64::from(bits + rows + 1);
        }
        let elapsed = started.elapsed();

        println!("total bias = {total}");
        println!("avr bias   = {}", total / f64::from(args.nbits));
        println!(
            "speed      = {:.3} nsec / hash",
            elapsed.as_nanos() as f64 / nhash as f64
        );
        Ok(())
    })
}
