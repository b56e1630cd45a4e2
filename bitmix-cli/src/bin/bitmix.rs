//! Random search, single evaluation, and template enumeration over
//! 32/64-bit mixers.

use std::io::stdout;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;

use bitmix_cli::{parse_range, run_driver};
use bitmix_vm::eval::{estimate_bias32, estimate_bias64, exact_bias32};
use bitmix_vm::prelude::*;

#[derive(Debug, Parser)]
#[command(name = "bitmix", version, about = "Search for low-bias integer mixers")]
struct Args {
    /// Search 32-bit mixers (the default).
    #[arg(short = '4', conflicts_with = "wide")]
    narrow: bool,

    /// Search 64-bit mixers.
    #[arg(short = '8')]
    wide: bool,

    /// Evaluate the pattern or library once and exit.
    #[arg(short = 'E', conflicts_with = "enumerate")]
    evaluate: bool,

    /// Enumerate and evaluate every program matching the pattern.
    #[arg(short = 'L')]
    enumerate: bool,

    /// Search mode (the default).
    #[arg(short = 'S')]
    search: bool,

    /// Score with the exact evaluator (32-bit only, slow).
    #[arg(short = 'e')]
    exact: bool,

    /// Load hash() from a shared object instead of a pattern.
    #[arg(short = 'l', value_name = "LIB")]
    library: Option<PathBuf>,

    /// Lock a template: kinds fixed, open constants re-randomized.
    #[arg(short = 'p', value_name = "TEMPLATE")]
    pattern: Option<String>,

    /// Sampled-bias quality: 2^Q samples per candidate.
    #[arg(short = 'q', value_name = "Q", default_value_t = consts::QUALITY)]
    quality: u32,

    /// Candidate op-count range.
    #[arg(short = 'r', value_name = "MIN:MAX")]
    range: Option<String>,

    /// Restrict generation to ops without word-sized constants.
    #[arg(short = 's')]
    small: bool,

    /// Initial best score; only candidates below it are reported.
    #[arg(short = 't', value_name = "X", default_value_t = consts::RANDOM_THRESHOLD)]
    threshold: f64,
}

fn main() {
    run_driver("bitmix", || {
        let args = Args::parse();
        if !(consts::QUALITY_MIN..=consts::QUALITY_MAX).contains(&args.quality) {
            bail!("invalid quality (12..30): {}", args.quality);
        }

        let template = args
            .pattern
            .as_deref()
            .map(|p| p.parse::<Template>().context("invalid pattern"))
            .transpose()?;

        // -4/-8 pin the width; otherwise a pattern decides, default 32.
        let width = match (&template, args.narrow, args.wide) {
            (_, _, true) => Width::W64,
            (_, true, _) => Width::W32,
            (Some(t), _, _) => t.width(),
            (None, _, _) => Width::W32,
        };
        if width == Width::W16 {
            bail!("16-bit mixers are searched with bitmix16");
        }
        if let Some(t) = &template {
            if t.width() != width {
                bail!("pattern width {} does not match the mode", t.width());
            }
        }
        if args.exact && width == Width::W64 {
            bail!("the exact evaluator is 32-bit only");
        }

        let mut rng = sampled_rng()?;
        let mut out = stdout().lock();

        // An external mixer short-circuits everything else: score, report, exit.
        if let Some(path) = &args.library {
            let lib = MixerLib::open(path)?;
            let score = match width {
                Width::W32 => {
                    let mixer = lib.mixer32()?;
                    if args.exact {
                        exact_bias32(|x| mixer.call(x))
                    } else {
                        estimate_bias32(|x| mixer.call(x), &mut rng, args.quality)
                    }
                }
                Width::W64 => {
                    let mixer = lib.mixer64()?;
                    estimate_bias64(|x| mixer.call(x), &mut rng, args.quality)
                }
                Width::W16 => unreachable!(),
            };
            println!("// score = {score}");
            return Ok(());
        }

        let mut search = RandomSearch::new(width, rng)?
            .with_quality(args.quality)
            .with_exact(args.exact)
            .with_threshold(args.threshold);
        if let Some(range) = &args.range {
            let (min, max) = parse_range(range)?;
            search = search.with_ops_range(min, max);
        }
        if args.small {
            search = search.with_exclude(KindSet::SMALL_CONSTANT.complement());
        }

        if args.evaluate {
            let template = template.ok_or_else(|| anyhow::anyhow!("-E requires -p"))?;
            let program = template.resolve().context("invalid pattern")?;
            search.evaluate(&program, &mut out)?;
        } else if args.enumerate {
            let template = template.ok_or_else(|| anyhow::anyhow!("-L requires -p"))?;
            search.enumerate(&template, &mut out)?;
        } else {
            if let Some(template) = template {
                search = search.with_template(template);
            }
            search.run(&mut out)?;
        }
        Ok(())
    })
}
