//! Bias evaluators.
//!
//! All routines share one statistic: a matrix `B` where `B[j][k]` counts,
//! over `N` sampled or enumerated inputs, how often flipping input bit `j`
//! flips output bit `k`. Perfect avalanche puts every cell at `N/2`; the
//! reported bias is the RMS of the normalized deviations,
//! `sqrt(mean((B[j][k] - N/2)^2 / (N/2)^2))`, scaled by 1000 on the 32/64
//! bit paths and unscaled on the 16-bit path.
//!
//! Accumulation and reduction keep one fixed order so that scores
//! reproduce to the last bit. Evaluators never fail; sampled bias is
//! deterministic in (mixer, rng state, quality) and exact bias in the
//! mixer alone.

use rand::RngCore;
use rayon::prelude::*;

use crate::consts::EXACT_SPLIT;

/// Flip-count matrix with one row per input bit and one column per
/// output bit.
#[derive(Debug, Clone)]
struct Bins {
    rows: usize,
    cols: usize,
    v: Vec<i64>,
}

impl Bins {
    fn new(rows: usize, cols: usize) -> Bins {
        Bins {
            rows,
            cols,
            v: vec![0; rows * cols],
        }
    }

    #[inline]
    fn add(&mut self, j: usize, k: usize, b: i64) {
        self.v[j * self.cols + k] += b;
    }

    fn merge(mut self, other: Bins) -> Bins {
        debug_assert_eq!(self.v.len(), other.v.len());
        for (a, b) in self.v.iter_mut().zip(&other.v) {
            *a += b;
        }
        self
    }

    /// Reduce to the reported bias. `half` is `N/2` verbatim.
    fn bias(&self, half: f64, scale: f64) -> f64 {
        let cells = (self.rows * self.cols) as f64;
        let mut mean = 0.0;
        for j in 0..self.rows {
            for k in 0..self.cols {
                let diff = (self.v[j * self.cols + k] as f64 - half) / half;
                mean += (diff * diff) / cells;
            }
        }
        mean.sqrt() * scale
    }
}

/// Sampled bias of a 32-bit mixer over `2^quality` inputs drawn from
/// `rng` (one 64-bit draw per input, truncated).
pub fn estimate_bias32<F, R>(f: F, rng: &mut R, quality: u32) -> f64
where
    F: Fn(u32) -> u32,
    R: RngCore + ?Sized,
{
    let n = 1i64 << quality;
    let mut bins = Bins::new(32, 32);
    for _ in 0..n {
        let x = rng.next_u64() as u32;
        let h0 = f(x);
        for j in 0..32 {
            let h1 = f(x ^ (1u32 << j));
            let set = h0 ^ h1;
            for k in 0..32 {
                bins.add(j, k, i64::from(set >> k & 1));
            }
        }
    }
    bins.bias((n / 2) as f64, 1000.0)
}

/// Sampled bias of a 64-bit mixer over `2^quality` inputs.
pub fn estimate_bias64<F, R>(f: F, rng: &mut R, quality: u32) -> f64
where
    F: Fn(u64) -> u64,
    R: RngCore + ?Sized,
{
    let n = 1i64 << quality;
    let mut bins = Bins::new(64, 64);
    for _ in 0..n {
        let x = rng.next_u64();
        let h0 = f(x);
        for j in 0..64 {
            let h1 = f(x ^ (1u64 << j));
            let set = h0 ^ h1;
            for k in 0..64 {
                bins.add(j, k, (set >> k & 1) as i64);
            }
        }
    }
    bins.bias((n / 2) as f64, 1000.0)
}

/// Exact bias of a 32-bit mixer: the full 2^32 enumeration, split across
/// [`EXACT_SPLIT`] ranges on the rayon pool. Each worker fills a private
/// matrix; the fold runs once at the end.
pub fn exact_bias32<F>(f: F) -> f64
where
    F: Fn(u32) -> u32 + Sync,
{
    let range = (1u64 << 32) / EXACT_SPLIT as u64;
    let bins = (0..EXACT_SPLIT as u64)
        .into_par_iter()
        .map(|i| {
            let mut bins = Bins::new(32, 32);
            for x in i * range..(i + 1) * range {
                let x = x as u32;
                let h0 = f(x);
                for j in 0..32 {
                    let h1 = f(x ^ (1u32 << j));
                    let set = h0 ^ h1;
                    for k in 0..32 {
                        bins.add(j, k, i64::from(set >> k & 1));
                    }
                }
            }
            bins
        })
        .reduce(|| Bins::new(32, 32), Bins::merge);
    bins.bias(2_147_483_648.0, 1000.0)
}

/// Exact bias of a 16-bit mixer over all 2^16 inputs, in parallel.
/// Reported unscaled.
pub fn exact_bias16<F>(f: F) -> f64
where
    F: Fn(u16) -> u16 + Sync,
{
    let chunk = (1u32 << 16) / EXACT_SPLIT as u32;
    let bins = (0..EXACT_SPLIT as u32)
        .into_par_iter()
        .map(|i| {
            let mut bins = Bins::new(16, 16);
            for x in i * chunk..(i + 1) * chunk {
                let x = x as u16;
                let h0 = f(x);
                for j in 0..16 {
                    let h1 = f(x ^ (1u16 << j));
                    let set = h0 ^ h1;
                    for k in 0..16 {
                        bins.add(j, k, i64::from(set >> k & 1));
                    }
                }
            }
            bins
        })
        .reduce(|| Bins::new(16, 16), Bins::merge);
    bins.bias(32_768.0, 1.0)
}

/// Knobs for the seed-sensitive estimator.
#[derive(Debug, Clone, Copy)]
pub struct SeededParams {
    /// Index width under test; the mask covers `bits` bits.
    pub bits: u32,
    /// Full seed width of the mixer.
    pub nbits: u32,
    /// Perturb all `nbits` seed bits instead of only the masked ones.
    pub full_range: bool,
    /// `2^quality` samples.
    pub quality: u32,
}

/// Sampled bias of a `(index, mask, seed) -> word` mixer.
///
/// The matrix rows are the perturbed seed bits followed by the perturbed
/// index bits; columns are the output bits covered by the mask.
pub fn estimate_bias_seeded<F, R>(f: F, p: &SeededParams, rng: &mut R) -> f64
where
    F: Fn(u64, u64, u64) -> u64,
    R: RngCore + ?Sized,
{
    let mask = if p.bits == 64 {
        u64::MAX
    } else {
        (1u64 << p.bits) - 1
    };
    let n = 1i64 << p.quality;
    let bits = p.bits as usize;
    let range = if p.full_range { p.nbits } else { p.bits } as usize;

    let mut bins = Bins::new(range + bits, bits);
    for _ in 0..n {
        let seed = rng.next_u64();
        let x = rng.next_u64() & mask;
        let h0 = f(x, mask, seed);
        for j in 0..range {
            let h1 = f(x, mask, seed ^ (1u64 << j));
            let set = h0 ^ h1;
            for k in 0..bits {
                bins.add(j, k, (set >> k & 1) as i64);
            }
        }
        for j in 0..bits {
            let h1 = f(x ^ (1u64 << j), mask, seed);
            let set = h0 ^ h1;
            for k in 0..bits {
                bins.add(range + j, k, (set >> k & 1) as i64);
            }
        }
    }
    bins.bias((n / 2) as f64, 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{eval16, eval32};
    use bitmix_asm::Program;
    use rand::SeedableRng;
    use rand_xoshiro::Xoroshiro128Plus;

    #[test]
    fn reduction_floor_matches_closed_form() {
        // A matrix that always flips the matching bit and is otherwise
        // perfect reduces to sqrt(1/W) * 1000 exactly.
        let n = 1i64 << 20;
        let mut bins = Bins::new(32, 32);
        for j in 0..32 {
            for k in 0..32 {
                bins.add(j, k, if j == k { n } else { n / 2 });
            }
        }
        let want = (1.0f64 / 32.0).sqrt() * 1000.0;
        assert!((bins.bias((n / 2) as f64, 1000.0) - want).abs() < 1e-9);
        assert!((want - 176.776_695_296_636_89).abs() < 1e-9);
    }

    #[test]
    fn exact16_identity_scores_one() {
        // Identity flips exactly the matching bit: diagonal N, zeros
        // elsewhere, every cell fully deviating.
        let bias = exact_bias16(|x| x);
        assert!((bias - 1.0).abs() < 1e-12, "bias = {bias}");
    }

    #[test]
    fn exact16_mixer_beats_weak_mixer() {
        let good: Program = "16xorr:8,16mul:2dc5,16xorr:7,16mul:9c71,16xorr:8"
            .parse()
            .unwrap();
        let weak: Program = "16xorl:1".parse().unwrap();
        let good_bias = exact_bias16(|x| eval16(good.ops(), None, x));
        let weak_bias = exact_bias16(|x| eval16(weak.ops(), None, x));
        assert!(good_bias < weak_bias, "{good_bias} !< {weak_bias}");
        assert!(good_bias < 0.2, "good mixer bias {good_bias}");
    }

    #[test]
    fn exact16_is_deterministic() {
        let p: Program = "16xorr:9,16mul:cd41,16xorr:7".parse().unwrap();
        let a = exact_bias16(|x| eval16(p.ops(), None, x));
        let b = exact_bias16(|x| eval16(p.ops(), None, x));
        assert_eq!(a.to_bits(), b.to_bits());
    }

    #[test]
    fn sampled_bias_is_deterministic_in_seed() {
        let p: Program = "32mul:00007fff,32add:ffffffff,32xorr:12,32addl:2,32xorr:4,32mul:00000809,32xorr:16"
            .parse()
            .unwrap();
        let f = |x: u32| eval32(p.ops(), x);

        let mut rng = Xoroshiro128Plus::seed_from_u64(0x2a2b_c037_b59f_f989);
        let a = estimate_bias32(f, &mut rng, 12);
        let mut rng = Xoroshiro128Plus::seed_from_u64(0x2a2b_c037_b59f_f989);
        let b = estimate_bias32(f, &mut rng, 12);
        assert_eq!(a.to_bits(), b.to_bits());

        let mut rng = Xoroshiro128Plus::seed_from_u64(1);
        let c = estimate_bias32(f, &mut rng, 12);
        assert_ne!(a.to_bits(), c.to_bits());
    }

    #[test]
    fn sampled_bias_ranks_known_mixers() {
        let murmur: Program = "32xorr:16,32mul:85ebca6b,32xorr:13,32mul:c2b2ae35,32xorr:16"
            .parse()
            .unwrap();
        let weak: Program = "32addl:1".parse().unwrap();
        let mut rng = Xoroshiro128Plus::seed_from_u64(99);
        let m = estimate_bias32(|x| eval32(murmur.ops(), x), &mut rng, 14);
        let w = estimate_bias32(|x| eval32(weak.ops(), x), &mut rng, 14);
        assert!(m < 2.0, "murmur3 finalizer estimated at {m}");
        assert!(w > 100.0, "weak mixer estimated at {w}");
    }

    #[test]
    fn seeded_estimator_rewards_seed_sensitivity() {
        // A mixer that ignores its seed shows full bias on the seed rows.
        let ignores_seed = |x: u64, mask: u64, _seed: u64| {
            let mut x = x;
            x ^= x >> 7;
            x = x.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            x & mask
        };
        let uses_seed = |x: u64, mask: u64, seed: u64| {
            let mut x = x ^ seed;
            x ^= x >> 7;
            x = x.wrapping_mul(0x9e37_79b9_7f4a_7c15);
            x ^= x >> 9;
            x & mask
        };
        let p = SeededParams {
            bits: 16,
            nbits: 64,
            full_range: false,
            quality: 12,
        };
        let mut rng = Xoroshiro128Plus::seed_from_u64(5);
        let bad = estimate_bias_seeded(ignores_seed, &p, &mut rng);
        let mut rng = Xoroshiro128Plus::seed_from_u64(5);
        let good = estimate_bias_seeded(uses_seed, &p, &mut rng);
        assert!(good < bad, "{good} !< {bad}");
    }
}
