//! Steepest hill-climb over the three-multiply schema.
//!
//! A point fixes `x ^= x>>s0; x *= c0; ... x ^= x>>s3` with three odd
//! 32-bit multipliers and four shifts. Every neighbor in the lattice
//! (shifts nudged by up to [`SHIFT_RANGE`], constants by even offsets up
//! to twice [`CONST_RANGE`]) is scored exactly; the best strictly
//! improving neighbor is adopted, otherwise the point is a local minimum
//! and the climb either stops or reseeds.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use rand::RngCore;
use rand_xoshiro::Xoshiro256StarStar;
use tracing::debug;

use crate::consts::{CLIMB_THRESHOLD, CONST_RANGE, HASHN, QUALITY, SHIFT_RANGE};
use crate::eval::{estimate_bias32, exact_bias32};
use crate::Error;

/// One lattice point of the three-multiply schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    /// Odd multipliers.
    pub c: [u32; HASHN],
    /// Right-shift amounts in `1..=31`.
    pub s: [u8; HASHN + 1],
}

impl Point {
    /// Random start: odd multipliers from the high rng bits, all four
    /// shifts at 16.
    pub fn generate<R: RngCore + ?Sized>(rng: &mut R) -> Point {
        let mut c = [0u32; HASHN];
        for slot in &mut c {
            *slot = (rng.next_u64() >> 32) as u32 | 1;
        }
        Point {
            c,
            s: [16; HASHN + 1],
        }
    }

    /// The mixer the point parameterizes.
    #[inline]
    pub fn mix(&self, mut x: u32) -> u32 {
        for i in 0..HASHN {
            x ^= x >> self.s[i];
            x = x.wrapping_mul(self.c[i]);
        }
        x ^= x >> self.s[HASHN];
        x
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for i in 0..HASHN {
            write!(f, "{:2} {:08x} ", self.s[i], self.c[i])?;
        }
        write!(f, "{:2}]", self.s[HASHN])
    }
}

/// The bracket form did not parse.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
#[error("invalid pattern `{0}`")]
pub struct ParsePointError(pub String);

impl FromStr for Point {
    type Err = ParsePointError;

    /// Parse the bracket form, e.g. `[16 21f0aaad 15 d35a2d97 15 ...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParsePointError(s.to_string());
        let inner = s
            .trim()
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(err)?;
        let mut tokens = inner.split_whitespace();
        let mut point = Point {
            c: [0; HASHN],
            s: [0; HASHN + 1],
        };
        for i in 0..HASHN {
            let shift: u8 = tokens.next().ok_or_else(err)?.parse().map_err(|_| err())?;
            if !(1..=31).contains(&shift) {
                return Err(err());
            }
            point.s[i] = shift;
            point.c[i] = u32::from_str_radix(tokens.next().ok_or_else(err)?, 16)
                .map_err(|_| err())?;
        }
        let shift: u8 = tokens.next().ok_or_else(err)?.parse().map_err(|_| err())?;
        if !(1..=31).contains(&shift) || tokens.next().is_some() {
            return Err(err());
        }
        point.s[HASHN] = shift;
        Ok(point)
    }
}

/// Scoring capability injected into the climb loop.
pub trait PointScorer: Sync {
    /// Exact bias of the point's mixer.
    fn exact(&self, point: &Point) -> f64;
    /// Sampled bias, used only to filter random starts.
    fn sampled(&self, point: &Point, rng: &mut Xoshiro256StarStar) -> f64;
}

/// Scores points with the real evaluators.
#[derive(Debug, Clone, Copy)]
pub struct BiasPointScorer {
    /// Sampled quality knob for start filtering.
    pub quality: u32,
}

impl Default for BiasPointScorer {
    fn default() -> Self {
        BiasPointScorer { quality: QUALITY }
    }
}

impl PointScorer for BiasPointScorer {
    fn exact(&self, point: &Point) -> f64 {
        exact_bias32(|x| point.mix(x))
    }

    fn sampled(&self, point: &Point, rng: &mut Xoshiro256StarStar) -> f64 {
        estimate_bias32(|x| point.mix(x), rng, self.quality)
    }
}

/// Draw random points until one estimates at or below the start
/// threshold.
pub fn generate_strict<S: PointScorer>(
    scorer: &S,
    rng: &mut Xoshiro256StarStar,
) -> Point {
    loop {
        let point = Point::generate(rng);
        if scorer.sampled(&point, rng) <= CLIMB_THRESHOLD {
            return point;
        }
    }
}

/// What one climb iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Moved to the best strictly improving neighbor.
    Climbed,
    /// Local minimum in one-shot mode; the climb is over.
    Done,
    /// Local minimum; reseeded a fresh start.
    Reset,
}

/// The hill climber.
pub struct Climber {
    cur: Point,
    cur_score: Option<f64>,
    last: Option<Point>,
    one_shot: bool,
    quiet: u8,
    shift_range: u32,
    const_range: u32,
}

impl Climber {
    /// Start from a known point.
    pub fn new(start: Point) -> Climber {
        Climber {
            cur: start,
            cur_score: None,
            last: None,
            one_shot: false,
            quiet: 0,
            shift_range: SHIFT_RANGE,
            const_range: CONST_RANGE,
        }
    }

    /// Stop at the first local minimum instead of reseeding.
    pub fn with_one_shot(mut self, one_shot: bool) -> Climber {
        self.one_shot = one_shot;
        self
    }

    /// Raise to print less: 1 drops status lines, 2 also drops
    /// per-neighbor scores.
    pub fn with_quiet(mut self, quiet: u8) -> Climber {
        self.quiet = quiet;
        self
    }

    /// Override the neighborhood radii.
    pub fn with_ranges(mut self, shift_range: u32, const_range: u32) -> Climber {
        self.shift_range = shift_range;
        self.const_range = const_range;
        self
    }

    /// The current point.
    pub fn current(&self) -> &Point {
        &self.cur
    }

    /// The current point's exact score, once known.
    pub fn current_score(&self) -> Option<f64> {
        self.cur_score
    }

    fn neighbors(&self) -> Vec<Point> {
        let mut out = Vec::new();
        // Shifts drift by +-d; anything outside 1..=31 is no mixer.
        for i in 0..=HASHN {
            for d in 1..=self.shift_range {
                for sign in [-1i32, 1] {
                    let shift = i32::from(self.cur.s[i]) + sign * d as i32;
                    if !(1..=31).contains(&shift) {
                        continue;
                    }
                    let mut tmp = self.cur;
                    tmp.s[i] = shift as u8;
                    out.push(tmp);
                }
            }
        }
        // Constants step by even offsets, preserving oddness.
        for i in 0..HASHN {
            for d in 1..=self.const_range {
                for sign in [-1i32, 1] {
                    let mut tmp = self.cur;
                    tmp.c[i] = tmp.c[i].wrapping_add_signed(sign * 2 * d as i32);
                    out.push(tmp);
                }
            }
        }
        out
    }

    /// One climb iteration: score the whole neighborhood and move, stop,
    /// or reseed.
    pub fn step<S, W>(
        &mut self,
        scorer: &S,
        rng: &mut Xoshiro256StarStar,
        out: &mut W,
    ) -> Result<Outcome, Error>
    where
        S: PointScorer,
        W: Write,
    {
        if self.quiet < 2 {
            write!(out, "{}", self.cur)?;
        }
        let cur_score = match self.cur_score {
            Some(score) => score,
            None => scorer.exact(&self.cur),
        };
        self.cur_score = Some(cur_score);
        if self.quiet < 2 {
            writeln!(out, " = {cur_score}")?;
            out.flush()?;
        }

        let mut best = self.cur;
        let mut best_score = cur_score;
        let mut found = false;
        for tmp in self.neighbors() {
            // Never step straight back onto the previous point.
            if Some(tmp) == self.last {
                continue;
            }
            if self.quiet == 0 {
                write!(out, "  {tmp}")?;
            }
            let score = scorer.exact(&tmp);
            if self.quiet == 0 {
                writeln!(out, " = {score}")?;
            }
            if score < best_score {
                best_score = score;
                best = tmp;
                found = true;
            }
        }

        if found {
            if self.quiet < 1 {
                writeln!(out, "CLIMB")?;
            }
            out.flush()?;
            self.last = Some(self.cur);
            self.cur = best;
            self.cur_score = Some(best_score);
            Ok(Outcome::Climbed)
        } else if self.one_shot {
            if self.quiet < 1 {
                writeln!(out, "DONE")?;
            }
            writeln!(out, "{} = {cur_score}", self.cur)?;
            out.flush()?;
            Ok(Outcome::Done)
        } else {
            if self.quiet < 1 {
                writeln!(out, "RESET")?;
            }
            writeln!(out, "{} = {cur_score}", self.cur)?;
            out.flush()?;
            debug!("local minimum, reseeding");
            self.last = None;
            self.cur = generate_strict(scorer, rng);
            self.cur_score = None;
            Ok(Outcome::Reset)
        }
    }

    /// Climb until a one-shot `DONE`; with reseeding enabled this only
    /// returns on error.
    pub fn run<S, W>(
        &mut self,
        scorer: &S,
        rng: &mut Xoshiro256StarStar,
        out: &mut W,
    ) -> Result<(), Error>
    where
        S: PointScorer,
        W: Write,
    {
        loop {
            if self.step(scorer, rng, out)? == Outcome::Done {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_xoshiro::rand_core::SeedableRng;

    #[test]
    fn bracket_form_round_trips() {
        let text = "[16 21f0aaad 15 d35a2d97 15 d35a2d97 16]";
        let point: Point = text.parse().unwrap();
        assert_eq!(point.s, [16, 15, 15, 16]);
        assert_eq!(point.c, [0x21f0_aaad, 0xd35a_2d97, 0xd35a_2d97]);
        assert_eq!(point.to_string(), text);
    }

    #[test]
    fn bad_bracket_forms_are_rejected() {
        for bad in [
            "",
            "16 21f0aaad 15 d35a2d97 15 d35a2d97 16",
            "[16 21f0aaad 15 d35a2d97 15 d35a2d97]",
            "[16 21f0aaad 15 d35a2d97 15 d35a2d97 16 17]",
            "[0 21f0aaad 15 d35a2d97 15 d35a2d97 16]",
            "[16 21f0aaad 15 d35a2d97 15 zzz 16]",
        ] {
            assert!(bad.parse::<Point>().is_err(), "accepted {bad:?}");
        }
    }

    /// Convex synthetic score: distance of the fields from a target
    /// reachable by the neighborhood steps.
    struct Synthetic {
        target: Point,
    }

    impl Synthetic {
        fn distance(&self, p: &Point) -> f64 {
            let mut d = 0.0;
            for i in 0..HASHN {
                d += f64::from(p.c[i].abs_diff(self.target.c[i]));
            }
            for i in 0..=HASHN {
                d += 10.0 * f64::from(p.s[i].abs_diff(self.target.s[i]));
            }
            d
        }
    }

    impl PointScorer for Synthetic {
        fn exact(&self, point: &Point) -> f64 {
            self.distance(point)
        }
        fn sampled(&self, point: &Point, _rng: &mut Xoshiro256StarStar) -> f64 {
            self.distance(point)
        }
    }

    #[test]
    fn one_shot_climb_is_monotone_and_halts() {
        let start: Point = "[16 00000065 16 00000065 16 00000065 16]".parse().unwrap();
        let mut target = start;
        target.c[0] = target.c[0] + 6; // reachable by +2 steps
        target.c[2] = target.c[2] - 4;
        target.s[1] = 14;
        target.s[3] = 18;
        let scorer = Synthetic { target };
        let mut climber = Climber::new(start).with_one_shot(true).with_quiet(2);
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let mut out = Vec::new();

        let mut scores = Vec::new();
        let mut iterations = 0;
        loop {
            let outcome = climber.step(&scorer, &mut rng, &mut out).unwrap();
            scores.push(climber.current_score().unwrap());
            iterations += 1;
            assert!(iterations <= 200, "climb failed to halt");
            if outcome == Outcome::Done {
                break;
            }
        }
        assert!(scores.windows(2).all(|w| w[1] <= w[0]), "{scores:?}");
        assert_eq!(*climber.current(), target);
        assert_eq!(climber.current_score(), Some(0.0));
    }

    #[test]
    fn done_is_reported_with_the_final_point() {
        let start: Point = "[16 00000065 16 00000065 16 00000065 16]".parse().unwrap();
        let scorer = Synthetic { target: start };
        let mut climber = Climber::new(start).with_one_shot(true);
        let mut rng = Xoshiro256StarStar::seed_from_u64(2);
        let mut out = Vec::new();
        assert_eq!(
            climber.step(&scorer, &mut rng, &mut out).unwrap(),
            Outcome::Done
        );
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("DONE"));
        assert!(text.ends_with(&format!("{start} = 0\n")));
    }

    #[test]
    fn climb_does_not_oscillate_back() {
        // A scorer that would reward stepping straight back: previous
        // position is excluded, so the climb settles instead.
        let start: Point = "[16 00000065 16 00000065 16 00000065 16]".parse().unwrap();
        let mut target = start;
        target.c[0] += 2;
        let scorer = Synthetic { target };
        let mut climber = Climber::new(start).with_one_shot(true).with_quiet(2);
        let mut rng = Xoshiro256StarStar::seed_from_u64(3);
        let mut out = Vec::new();
        assert_eq!(
            climber.step(&scorer, &mut rng, &mut out).unwrap(),
            Outcome::Climbed
        );
        assert_eq!(
            climber.step(&scorer, &mut rng, &mut out).unwrap(),
            Outcome::Done
        );
    }
}
