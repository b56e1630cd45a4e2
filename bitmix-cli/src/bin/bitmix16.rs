//! 16-bit mixer and s-box prospector.
//!
//! Fully portable: candidates are interpreted and scored by exhaustive
//! 2^16 enumeration, so it runs where the JIT cannot. Bias is reported
//! unscaled at this width.

use std::io::{stdout, Write};

use anyhow::bail;
use clap::Parser;
use rand::Rng;

use bitmix_cli::run_driver;
use bitmix_vm::eval::exact_bias16;
use bitmix_vm::interpreter::{eval16, Sbox16};
use bitmix_vm::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "bitmix16", version, about = "Search for low-bias 16-bit mixers")]
struct Args {
    /// Mode: uniformly random programs (the default).
    #[arg(short = 'H')]
    hash: bool,

    /// Mode: prefer alternating mixing directions.
    #[arg(short = 'I')]
    smart: bool,

    /// Mode: xorshift-multiply schema only.
    #[arg(short = 'X')]
    xormul: bool,

    /// Mode: full 2^16 s-box search.
    #[arg(short = 'S')]
    sbox: bool,

    /// Number of operations (xorshift-multiply rounds with -X).
    #[arg(short = 'n', value_name = "N")]
    ops: Option<usize>,

    /// Exclude multiplication.
    #[arg(short = 'm')]
    no_mul: bool,

    /// Exclude rotation.
    #[arg(short = 'r')]
    no_rot: bool,
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Hash,
    Smart,
    Xormul,
    Sbox,
}

fn main() {
    run_driver("bitmix16", || {
        let args = Args::parse();
        let mode = match (args.smart, args.xormul, args.sbox) {
            (false, false, false) => Mode::Hash,
            (true, false, false) => Mode::Smart,
            (false, true, false) => Mode::Xormul,
            (false, false, true) => Mode::Sbox,
            _ => bail!("-H, -I, -X and -S are mutually exclusive"),
        };
        if let Some(n) = args.ops {
            if n == 0 || n > 32 {
                bail!("invalid op count: {n}");
            }
        }

        let mut exclude = KindSet::empty();
        if args.no_mul {
            exclude |= KindSet::MUL;
        }
        if args.no_rot {
            exclude |= KindSet::ROT;
        }

        let mut rng = driver_rng()?;
        let mut out = stdout().lock();
        match mode {
            Mode::Sbox => run_sbox(&mut rng, &mut out),
            _ => run_programs(mode, args.ops, exclude, &mut rng, &mut out),
        }
    })
}

fn run_programs(
    mode: Mode,
    ops: Option<usize>,
    exclude: KindSet,
    rng: &mut impl Rng,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut best = 1.0;
    loop {
        let program = match mode {
            Mode::Hash => {
                Program::generate_uniform(Width::W16, ops.unwrap_or(7), exclude, rng)
            }
            Mode::Smart => {
                Program::generate_smart(Width::W16, ops.unwrap_or(7), exclude, rng)
            }
            Mode::Xormul => Program::generate_xormul(Width::W16, ops.unwrap_or(2), rng),
            Mode::Sbox => unreachable!(),
        };
        let bias = exact_bias16(|x| eval16(program.ops(), None, x));
        if bias < best {
            best = bias;
            writeln!(out, "// bias = {bias}")?;
            out.write_all(program.c_source().as_bytes())?;
            writeln!(out)?;
            out.flush()?;
        }
    }
}

fn run_sbox(rng: &mut impl Rng, out: &mut impl Write) -> anyhow::Result<()> {
    let mut sbox: Box<Sbox16> = {
        let mut table = vec![0u16; 1 << 16].into_boxed_slice();
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u16;
        }
        table.try_into().expect("table has 2^16 entries")
    };

    // The table is a one-op program; scoring it through the interpreter
    // keeps it on the same path as every other candidate.
    let program = Program::new(Width::W16, vec![Op::Sbox]).expect("sbox is a 16-bit op");

    let mut best = 1.0;
    loop {
        // Keep permuting the current table rather than starting over.
        for i in (1..sbox.len()).rev() {
            let j = rng.gen_range(0..=i);
            sbox.swap(i, j);
        }
        let bias = exact_bias16(|x| eval16(program.ops(), Some(&*sbox), x));
        if bias < best {
            best = bias;
            writeln!(out, "// bias = {bias}")?;
            for (i, v) in sbox.iter().enumerate() {
                let sep = if i % 16 == 15 { '\n' } else { ' ' };
                write!(out, "{v:04x}{sep}")?;
            }
            writeln!(out)?;
            out.flush()?;
            eprintln!("// bias = {bias}");
        }
    }
}
