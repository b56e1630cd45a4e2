//! Random enumeration over the full program space.
//!
//! Each iteration draws a length, builds a uniformly random valid
//! program (or re-randomizes the open constants of a locked template),
//! materializes it, and keeps the sampled bias as its score. Also hosts
//! the one-shot evaluation and template-enumeration entry points of the
//! same binary.

use std::io::Write;

use bitmix_asm::{KindSet, Program, Template, Width};
use rand::Rng;
use rand_xoshiro::Xoroshiro128Plus;
use tracing::debug;

use crate::consts;
use crate::eval::{estimate_bias32, estimate_bias64, exact_bias32};
use crate::Error;

#[cfg(not(target_arch = "x86_64"))]
use crate::interpreter::{eval32, eval64};

/// The random search driver.
///
/// Owns the evaluator rng stream and, on x86-64, the executable page all
/// candidates are assembled into.
pub struct RandomSearch {
    width: Width,
    ops_range: (usize, usize),
    exclude: KindSet,
    template: Option<Template>,
    quality: u32,
    exact: bool,
    best: f64,
    rng: Xoroshiro128Plus,
    #[cfg(target_arch = "x86_64")]
    page: crate::jit::ExecPage,
}

impl RandomSearch {
    /// Build a driver for `width` mixers around the given rng stream.
    pub fn new(width: Width, rng: Xoroshiro128Plus) -> Result<RandomSearch, Error> {
        Ok(RandomSearch {
            width,
            ops_range: consts::RANDOM_OPS,
            exclude: KindSet::empty(),
            template: None,
            quality: consts::QUALITY,
            exact: false,
            best: consts::RANDOM_THRESHOLD,
            rng,
            #[cfg(target_arch = "x86_64")]
            page: crate::jit::ExecPage::new()?,
        })
    }

    /// Candidate op-count range (inclusive).
    pub fn with_ops_range(mut self, min: usize, max: usize) -> Self {
        self.ops_range = (min, max);
        self
    }

    /// Exclude kinds from generation.
    pub fn with_exclude(mut self, exclude: KindSet) -> Self {
        self.exclude = exclude;
        self
    }

    /// Prospect around a template instead of the full space.
    pub fn with_template(mut self, template: Template) -> Self {
        self.template = Some(template);
        self
    }

    /// Sampled-bias quality knob.
    pub fn with_quality(mut self, quality: u32) -> Self {
        self.quality = quality;
        self
    }

    /// Score candidates with the exact evaluator (32-bit only).
    pub fn with_exact(mut self, exact: bool) -> Self {
        self.exact = exact;
        self
    }

    /// Initial best score; only candidates below it are reported.
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.best = threshold;
        self
    }

    fn next_candidate(&mut self) -> Program {
        match &self.template {
            Some(t) => t.instantiate(&mut self.rng),
            None => {
                let (min, max) = self.ops_range;
                let n = self.rng.gen_range(min..=max);
                Program::generate_uniform(self.width, n, self.exclude, &mut self.rng)
            }
        }
    }

    /// Materialize and score one program.
    #[cfg(target_arch = "x86_64")]
    pub fn score(&mut self, program: &Program) -> Result<f64, Error> {
        self.page.load(program);
        self.page.lock()?;
        let score = match self.width {
            Width::W32 => {
                let f = self.page.fn32();
                if self.exact {
                    exact_bias32(|x| f.call(x))
                } else {
                    estimate_bias32(|x| f.call(x), &mut self.rng, self.quality)
                }
            }
            Width::W64 => {
                let f = self.page.fn64();
                estimate_bias64(|x| f.call(x), &mut self.rng, self.quality)
            }
            Width::W16 => unreachable!("the random driver is 32/64-bit"),
        };
        self.page.unlock()?;
        Ok(score)
    }

    /// Materialize and score one program (interpreter fallback).
    #[cfg(not(target_arch = "x86_64"))]
    pub fn score(&mut self, program: &Program) -> Result<f64, Error> {
        let score = match self.width {
            Width::W32 => {
                if self.exact {
                    exact_bias32(|x| eval32(program.ops(), x))
                } else {
                    estimate_bias32(
                        |x| eval32(program.ops(), x),
                        &mut self.rng,
                        self.quality,
                    )
                }
            }
            Width::W64 => estimate_bias64(
                |x| eval64(program.ops(), x),
                &mut self.rng,
                self.quality,
            ),
            Width::W16 => unreachable!("the random driver is 32/64-bit"),
        };
        Ok(score)
    }

    /// One search iteration. Returns whether the candidate improved on
    /// the best so far (and was therefore printed).
    pub fn step<W: Write>(&mut self, out: &mut W) -> Result<bool, Error> {
        let program = self.next_candidate();
        let score = self.score(&program)?;
        if score < self.best {
            self.best = score;
            print_report(out, &program, score)?;
            out.flush()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Search until interrupted.
    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), Error> {
        debug!(width = %self.width, "random search starting");
        loop {
            self.step(out)?;
        }
    }

    /// Evaluate one externally supplied program and report its score.
    pub fn evaluate<W: Write>(
        &mut self,
        program: &Program,
        out: &mut W,
    ) -> Result<f64, Error> {
        let score = self.score(program)?;
        print_report(out, program, score)?;
        out.flush()?;
        Ok(score)
    }

    /// Walk every program matching `template`, reporting each strict
    /// improvement; returns the best score found.
    pub fn enumerate<W: Write>(
        &mut self,
        template: &Template,
        out: &mut W,
    ) -> Result<f64, Error> {
        let mut best = self.best;
        for program in template.programs() {
            let score = self.score(&program)?;
            if score < best {
                best = score;
                print_report(out, &program, score)?;
                out.flush()?;
            }
        }
        Ok(best)
    }
}

fn print_report<W: Write>(out: &mut W, program: &Program, score: f64) -> Result<(), Error> {
    writeln!(out, "// score = {score}")?;
    out.write_all(program.c_source().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn reports_only_strict_improvements() {
        let rng = Xoroshiro128Plus::seed_from_u64(0xfeed);
        let mut search = RandomSearch::new(Width::W32, rng)
            .unwrap()
            .with_quality(12)
            .with_ops_range(3, 5);
        let mut out = Vec::new();
        let mut improvements = 0;
        for _ in 0..40 {
            if search.step(&mut out).unwrap() {
                improvements += 1;
            }
        }
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches("// score = ").count(), improvements);
        // Reported scores strictly decrease.
        let scores: Vec<f64> = text
            .lines()
            .filter_map(|l| l.strip_prefix("// score = "))
            .map(|s| s.parse().unwrap())
            .collect();
        assert!(scores.windows(2).all(|w| w[1] < w[0]), "{scores:?}");
    }

    #[test]
    fn template_search_keeps_locked_ops() {
        let rng = Xoroshiro128Plus::seed_from_u64(0xfade);
        let template: Template = "32xorr:16,32mul,32xorr:15".parse().unwrap();
        let mut search = RandomSearch::new(Width::W32, rng)
            .unwrap()
            .with_quality(12)
            .with_template(template);
        let mut out = Vec::new();
        for _ in 0..10 {
            search.step(&mut out).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        for body in text.split("// score").skip(1) {
            assert!(body.contains("x ^= x >> 16;"));
            assert!(body.contains("x ^= x >> 15;"));
        }
    }

    #[test]
    fn enumerate_visits_the_whole_domain() {
        let rng = Xoroshiro128Plus::seed_from_u64(7);
        let template: Template = "32xorr,32mul:045d9f3b,32xorr:16".parse().unwrap();
        let mut search = RandomSearch::new(Width::W32, rng).unwrap().with_quality(12);
        let mut out = Vec::new();
        let best = search.enumerate(&template, &mut out).unwrap();
        assert!(best < consts::RANDOM_THRESHOLD);
    }

    #[test]
    fn evaluate_reports_the_murmur_finalizer_as_strong() {
        let rng = Xoroshiro128Plus::seed_from_u64(3);
        let mut search = RandomSearch::new(Width::W32, rng).unwrap().with_quality(14);
        let p: Program = "32xorr:16,32mul:85ebca6b,32xorr:13,32mul:c2b2ae35,32xorr:16"
            .parse()
            .unwrap();
        let mut out = Vec::new();
        let score = search.evaluate(&p, &mut out).unwrap();
        assert!(score < 2.0, "score = {score}");
    }
}
