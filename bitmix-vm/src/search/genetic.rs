//! Genetic exploration of xorshift-multiply-xorshift mixers.
//!
//! A gene fixes the five attributes of the schema
//! `x ^= x>>s0; x *= c0; x ^= x>>s1; x *= c1; x ^= x>>s2`. The pool is
//! scored in parallel with the sampled estimator, promising genes are
//! re-scored exactly, the top quarter breeds the rest, and duplicates
//! are mutated apart. A pool that stops improving for long enough is
//! regenerated wholesale.

use std::fmt;
use std::io::Write;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use itertools::Itertools;
use rand::RngCore;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rayon::prelude::*;
use tracing::debug;

use crate::consts::{DONTCARE, POOL, QUALITY, RESET_MINS, THRESHOLD};
use crate::eval::{estimate_bias32, exact_bias32};
use crate::Error;

bitflags! {
    /// Scoring and reporting state of a gene.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GeneFlags: u8 {
        /// Sampled score is present.
        const SCORED = 1 << 0;
        /// Score came from the exact evaluator.
        const EXACT = 1 << 1;
        /// Already reported on stdout.
        const PRINTED = 1 << 2;
    }
}

/// One member of the pool: three shifts, two multipliers, and its cached
/// score.
#[derive(Debug, Clone, Copy)]
pub struct Gene {
    /// Right-shift amounts, kept in `1..=31`.
    pub s: [u32; 3],
    /// Odd-by-construction multipliers; mutation may break the parity,
    /// which the evaluator then punishes.
    pub c: [u32; 2],
    /// Cached bias, meaningful once `SCORED`.
    pub score: f64,
    /// Scoring and reporting state.
    pub flags: GeneFlags,
}

impl Gene {
    /// Fresh random gene: shifts in `10..=19`, odd 32-bit multipliers.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Gene {
        let s = rng.next_u64();
        let c = rng.next_u64();
        Gene {
            s: [
                10 + (s % 10) as u32,
                10 + ((s >> 24) % 10) as u32,
                10 + ((s >> 48) % 10) as u32,
            ],
            c: [c as u32 | 1, (c >> 32) as u32 | 1],
            score: 0.0,
            flags: GeneFlags::empty(),
        }
    }

    /// The mixer the gene parameterizes.
    #[inline]
    pub fn mix(&self, mut x: u32) -> u32 {
        x ^= x >> self.s[0];
        x = x.wrapping_mul(self.c[0]);
        x ^= x >> self.s[1];
        x = x.wrapping_mul(self.c[1]);
        x ^= x >> self.s[2];
        x
    }

    /// Perturb one attribute: a shift by up to three, or a multiplier by
    /// a uniform 16-bit signed offset.
    pub fn mutate<R: RngCore + ?Sized>(&mut self, rng: &mut R) {
        const SMALL: [i32; 6] = [-3, -2, -1, 1, 2, 3];
        let r = rng.next_u64();
        let field = (r % 5) as usize;
        let r = r >> 3;
        match field {
            0..=2 => {
                let d = SMALL[(r % 6) as usize];
                self.s[field] = self.s[field].saturating_add_signed(d).clamp(1, 31);
            }
            _ => {
                let d = (r & 0xffff) as i32 - 32768;
                self.c[field - 3] = self.c[field - 3].wrapping_add_signed(d);
            }
        }
        self.score = 0.0;
        self.flags = GeneFlags::empty();
    }

    /// Breed a child from `a`, replacing a prefix of the attribute list
    /// `(c0, s1, c1, s2)` with `b`'s.
    ///
    /// [`Crossover::Full`] picks the prefix from two rng bits;
    /// [`Crossover::Legacy`] keeps the old aliased fall-through, which
    /// reaches just the whole-prefix and half-prefix cases.
    pub fn cross<R: RngCore + ?Sized>(
        a: &Gene,
        b: &Gene,
        style: Crossover,
        rng: &mut R,
    ) -> Gene {
        let r = rng.next_u64();
        let case = match style {
            Crossover::Full => r & 3,
            Crossover::Legacy => r & 2,
        };
        let mut g = *a;
        if case == 0 {
            g.c[0] = b.c[0];
        }
        if case <= 1 {
            g.s[1] = b.s[1];
        }
        if case <= 2 {
            g.c[1] = b.c[1];
        }
        g.s[2] = b.s[2];
        g.score = 0.0;
        g.flags = GeneFlags::empty();
        g
    }

    /// Attribute-wise equality, ignoring score and flags.
    pub fn same(&self, other: &Gene) -> bool {
        self.s == other.s && self.c == other.c
    }
}

impl fmt::Display for Gene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:2} {:08x} {:2} {:08x} {:2}]",
            self.s[0], self.c[0], self.s[1], self.c[1], self.s[2]
        )
    }
}

/// Which crossover behavior to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Crossover {
    /// Four equiprobable prefixes.
    #[default]
    Full,
    /// The old fall-through: only the `(c0,s1,c1,s2)` and `(c1,s2)`
    /// prefixes are reachable. Kept for reproducing early results.
    Legacy,
}

/// Scoring capability injected into the pool loop.
pub trait Scorer: Sync {
    /// Sampled bias of the gene's mixer.
    fn sampled(&self, gene: &Gene, rng: &mut Xoshiro256StarStar) -> f64;
    /// Exact bias of the gene's mixer.
    fn exact(&self, gene: &Gene) -> f64;
}

/// Scores genes with the real evaluators.
#[derive(Debug, Clone, Copy)]
pub struct BiasScorer {
    /// Sampled quality knob.
    pub quality: u32,
}

impl Default for BiasScorer {
    fn default() -> Self {
        BiasScorer { quality: QUALITY }
    }
}

impl Scorer for BiasScorer {
    fn sampled(&self, gene: &Gene, rng: &mut Xoshiro256StarStar) -> f64 {
        estimate_bias32(|x| gene.mix(x), rng, self.quality)
    }

    fn exact(&self, gene: &Gene) -> f64 {
        exact_bias32(|x| gene.mix(x))
    }
}

/// The breeding pool.
pub struct Pool {
    genes: Vec<Gene>,
    rngs: Vec<Xoshiro256StarStar>,
    crossover: Crossover,
    reset_after: Duration,
    best: f64,
    best_at: Instant,
}

impl Pool {
    /// Seed a pool of [`POOL`] random genes. Every gene gets an
    /// independent rng stream split off `master` by jumping, so parallel
    /// scoring shares no state.
    pub fn new(mut master: Xoshiro256StarStar, crossover: Crossover) -> Pool {
        let mut rngs = Vec::with_capacity(POOL);
        for _ in 0..POOL {
            rngs.push(master.clone());
            master.jump();
        }
        let genes = {
            let rng0 = &mut rngs[0];
            (0..POOL).map(|_| Gene::generate(rng0)).collect()
        };
        Pool {
            genes,
            rngs,
            crossover,
            reset_after: Duration::from_secs(RESET_MINS * 60),
            best: 1000.0,
            best_at: Instant::now(),
        }
    }

    /// Override the stagnation reset interval.
    pub fn with_reset_after(mut self, reset_after: Duration) -> Pool {
        self.reset_after = reset_after;
        self
    }

    /// The pool, best first right after a step.
    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    /// Best score seen since the last reset.
    pub fn best(&self) -> f64 {
        self.best
    }

    /// Run one generation.
    pub fn step<S, W>(&mut self, scorer: &S, out: &mut W) -> Result<(), Error>
    where
        S: Scorer,
        W: Write,
    {
        // Sampled scoring is independent per gene: private rng, private
        // slot, no ordering.
        self.genes
            .par_iter_mut()
            .zip(self.rngs.par_iter_mut())
            .for_each(|(gene, rng)| {
                if !gene.flags.contains(GeneFlags::SCORED) {
                    gene.score = scorer.sampled(gene, rng);
                    gene.flags |= GeneFlags::SCORED;
                }
            });

        // Promising estimates are confirmed exactly, one at a time; the
        // exact evaluator parallelizes internally.
        for gene in &mut self.genes {
            if !gene.flags.contains(GeneFlags::EXACT) && gene.score < THRESHOLD {
                gene.score = scorer.exact(gene);
                gene.flags |= GeneFlags::EXACT | GeneFlags::SCORED;
            }
        }

        self.genes.sort_by(|a, b| a.score.total_cmp(&b.score));

        for gene in &mut self.genes {
            if !gene.flags.contains(GeneFlags::PRINTED) && gene.score < DONTCARE {
                writeln!(out, "{gene} = {}", gene.score)?;
                gene.flags |= GeneFlags::PRINTED;
            }
        }
        out.flush()?;

        let now = Instant::now();
        if self.genes[0].score < self.best {
            self.best = self.genes[0].score;
            self.best_at = now;
        } else if now.duration_since(self.best_at) > self.reset_after {
            debug!("pool stagnated, regenerating");
            self.best = 1000.0;
            self.best_at = now;
            let rng0 = &mut self.rngs[0];
            for gene in &mut self.genes {
                *gene = Gene::generate(rng0);
            }
            return Ok(());
        }

        // The top quarter survives; pairs of survivors breed the tail.
        let keep = POOL / 4;
        let mut child = keep;
        for (a, b) in (0..keep).tuple_combinations() {
            if child >= POOL {
                break;
            }
            let pa = self.genes[a];
            let pb = self.genes[b];
            self.genes[child] = Gene::cross(&pa, &pb, self.crossover, &mut self.rngs[0]);
            child += 1;
        }
        self.undup();
        Ok(())
    }

    /// Mutate any gene that duplicates an earlier one.
    pub fn undup(&mut self) {
        let rng0 = &mut self.rngs[0];
        for i in 0..self.genes.len() {
            for j in i + 1..self.genes.len() {
                if self.genes[i].same(&self.genes[j]) {
                    self.genes[j].mutate(rng0);
                }
            }
        }
    }

    /// Search until interrupted.
    pub fn run<S, W>(&mut self, scorer: &S, out: &mut W) -> Result<(), Error>
    where
        S: Scorer,
        W: Write,
    {
        loop {
            self.step(scorer, out)?;
        }
    }
}

/// Seed a pool from OS entropy with the default crossover.
pub fn pool_from_entropy() -> Result<Pool, Error> {
    let master = Xoshiro256StarStar::from_seed(crate::rng::seed_from_entropy()?);
    Ok(Pool::new(master, Crossover::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn seed() -> u64 {
        0x6765_6e65
    }

    /// Scorer with a planted perfect gene and bad scores for the rest.
    struct Canned {
        special: Gene,
    }

    impl Scorer for Canned {
        fn sampled(&self, gene: &Gene, _rng: &mut Xoshiro256StarStar) -> f64 {
            if gene.same(&self.special) {
                1.5
            } else {
                50.0
            }
        }

        fn exact(&self, gene: &Gene) -> f64 {
            if gene.same(&self.special) {
                0.25
            } else {
                45.0
            }
        }
    }

    #[test]
    fn printable_gene_is_reported_exactly_once() {
        let master = Xoshiro256StarStar::seed_from_u64(seed());
        let mut pool = Pool::new(master, Crossover::Full);
        let special = Gene {
            s: [16, 13, 16],
            c: [0x85eb_ca6b, 0xc2b2_ae35],
            score: 0.0,
            flags: GeneFlags::empty(),
        };
        pool.genes[7] = special;
        let scorer = Canned { special };

        let mut out = Vec::new();
        for _ in 0..6 {
            pool.step(&scorer, &mut out).unwrap();
        }
        let text = String::from_utf8(out).unwrap();
        let hits = text
            .lines()
            .filter(|l| l.starts_with("[16 85ebca6b 13 c2b2ae35 16] = 0.25"))
            .count();
        assert_eq!(hits, 1, "output was:\n{text}");
    }

    #[test]
    fn exact_rescoring_marks_genes_below_threshold() {
        let master = Xoshiro256StarStar::seed_from_u64(seed());
        let mut pool = Pool::new(master, Crossover::Full);
        let special = pool.genes[3];
        let scorer = Canned { special };
        pool.step(&scorer, &mut Vec::new()).unwrap();
        // After sorting the planted gene leads the pool with its exact
        // score and both flags.
        assert!(pool.genes[0].same(&special));
        assert_eq!(pool.genes[0].score, 0.25);
        assert!(pool.genes[0].flags.contains(GeneFlags::EXACT));
        // The surviving quarter keeps its scores; the bred tail starts
        // over unscored.
        for gene in pool.genes().iter().take(POOL / 4) {
            assert!(gene.flags.contains(GeneFlags::SCORED));
        }
    }

    #[test]
    fn undup_leaves_no_duplicates() {
        let master = Xoshiro256StarStar::seed_from_u64(1);
        let mut pool = Pool::new(master, Crossover::Full);
        let g = pool.genes[0];
        for slot in pool.genes.iter_mut() {
            *slot = g;
        }
        pool.undup();
        let mut seen = HashSet::new();
        for gene in pool.genes() {
            assert!(seen.insert((gene.s, gene.c)), "duplicate {gene}");
        }
    }

    #[test]
    fn crossover_prefixes() {
        let a = Gene {
            s: [1, 2, 3],
            c: [0xaaaa_aaab, 0xbbbb_bbbb],
            score: 0.0,
            flags: GeneFlags::empty(),
        };
        let b = Gene {
            s: [11, 12, 13],
            c: [0x1111_1111, 0x2222_2223],
            score: 0.0,
            flags: GeneFlags::empty(),
        };
        let mut rng = Xoshiro256StarStar::seed_from_u64(2);
        let mut full = HashSet::new();
        let mut legacy = HashSet::new();
        for _ in 0..512 {
            let g = Gene::cross(&a, &b, Crossover::Full, &mut rng);
            // s0 and c0..s2 layout: record which fields came from b.
            full.insert((g.c[0] == b.c[0], g.s[1] == b.s[1], g.c[1] == b.c[1]));
            let g = Gene::cross(&a, &b, Crossover::Legacy, &mut rng);
            legacy.insert((g.c[0] == b.c[0], g.s[1] == b.s[1], g.c[1] == b.c[1]));
            assert_eq!(g.s[2], b.s[2]);
            assert_eq!(g.s[0], a.s[0]);
        }
        // Full reaches all four nested prefixes, the fall-through only
        // the aliased two.
        assert_eq!(full.len(), 4, "{full:?}");
        assert_eq!(
            legacy,
            HashSet::from([(true, true, true), (false, false, true)])
        );
    }

    #[test]
    fn stagnation_reset_regenerates_the_pool() {
        let master = Xoshiro256StarStar::seed_from_u64(5);
        let mut pool =
            Pool::new(master, Crossover::Full).with_reset_after(Duration::from_secs(0));
        struct Flat;
        impl Scorer for Flat {
            fn sampled(&self, _: &Gene, _: &mut Xoshiro256StarStar) -> f64 {
                30.0
            }
            fn exact(&self, _: &Gene) -> f64 {
                29.0
            }
        }
        let mut out = Vec::new();
        pool.step(&Flat, &mut out).unwrap(); // establishes best
        let before: Vec<_> = pool.genes().iter().map(|g| (g.s, g.c)).collect();
        pool.step(&Flat, &mut out).unwrap(); // no improvement, resets
        let after: Vec<_> = pool.genes().iter().map(|g| (g.s, g.c)).collect();
        assert_ne!(before, after);
        assert!(pool.genes().iter().all(|g| g.flags.is_empty()));
    }
}
