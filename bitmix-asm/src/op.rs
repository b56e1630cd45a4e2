//! The closed set of reversible mixing operations.

use bitflags::bitflags;
use rand::Rng;
use strum::EnumIter;

use crate::conv::ParseError;

/// Word width of a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Width {
    /// 16-bit words, evaluated by exhaustive enumeration.
    W16,
    /// 32-bit words.
    W32,
    /// 64-bit words.
    W64,
}

impl Width {
    /// Number of bits in the word.
    pub const fn bits(self) -> u32 {
        match self {
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
        }
    }

    /// Number of byte lanes in the word.
    pub const fn lanes(self) -> u32 {
        self.bits() / 8
    }

    /// All-ones mask for the word.
    pub const fn mask(self) -> u64 {
        match self {
            Width::W16 => 0xffff,
            Width::W32 => 0xffff_ffff,
            Width::W64 => u64::MAX,
        }
    }

    pub(crate) fn from_prefix(s: &str) -> Option<(Width, &str)> {
        if let Some(rest) = s.strip_prefix("16") {
            Some((Width::W16, rest))
        } else if let Some(rest) = s.strip_prefix("32") {
            Some((Width::W32, rest))
        } else if let Some(rest) = s.strip_prefix("64") {
            Some((Width::W64, rest))
        } else {
            None
        }
    }
}

impl core::fmt::Display for Width {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.bits())
    }
}

/// Discriminant of an operation, without its constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum Kind {
    /// `x ^= c`
    Xor,
    /// `x *= c`, `c` odd
    Mul,
    /// `x += c`
    Add,
    /// `x = rotl(x, r)`
    Rot,
    /// `x = ~x`
    Not,
    /// `x = bswap(x)`
    Bswap,
    /// byte permutation of the word
    Shf,
    /// carry-less multiply by an odd constant
    Clmul,
    /// `x ^= x << s`
    Xorl,
    /// `x ^= x >> s`
    Xorr,
    /// `x += x << s`
    Addl,
    /// `x -= x << s`
    Subl,
    /// `x ^= rotl(x, a) ^ rotl(x, b)`
    Xrot2,
    /// `x = table[x]`, 16-bit only; never generated, only loaded
    Sbox,
}

impl Kind {
    /// Whether the operation combines the input with a shifted copy of
    /// itself rather than with an immediate.
    pub const fn self_mixing(self) -> bool {
        matches!(
            self,
            Kind::Xorl | Kind::Xorr | Kind::Addl | Kind::Subl | Kind::Xrot2
        )
    }

    /// Whether this kind exists at the given width.
    pub const fn allowed(self, width: Width) -> bool {
        match self {
            Kind::Sbox => matches!(width, Width::W16),
            Kind::Bswap | Kind::Shf | Kind::Clmul | Kind::Xrot2 => {
                !matches!(width, Width::W16)
            }
            _ => true,
        }
    }

    /// Number of constants the kind carries.
    pub const fn imm_count(self) -> usize {
        match self {
            Kind::Not | Kind::Bswap | Kind::Sbox => 0,
            Kind::Xrot2 => 2,
            _ => 1,
        }
    }

    /// Lower-case token used in the text form, e.g. `"xorr"` in `32xorr:16`.
    pub const fn token(self) -> &'static str {
        match self {
            Kind::Xor => "xor",
            Kind::Mul => "mul",
            Kind::Add => "add",
            Kind::Rot => "rot",
            Kind::Not => "not",
            Kind::Bswap => "bswap",
            Kind::Shf => "shf",
            Kind::Clmul => "clmul",
            Kind::Xorl => "xorl",
            Kind::Xorr => "xorr",
            Kind::Addl => "addl",
            Kind::Subl => "subl",
            Kind::Xrot2 => "xrot2",
            Kind::Sbox => "sbox",
        }
    }

    pub(crate) fn from_token(s: &str) -> Option<Kind> {
        Some(match s {
            "xor" => Kind::Xor,
            "mul" => Kind::Mul,
            "add" => Kind::Add,
            "rot" => Kind::Rot,
            "not" => Kind::Not,
            "bswap" => Kind::Bswap,
            "shf" => Kind::Shf,
            "clmul" => Kind::Clmul,
            "xorl" => Kind::Xorl,
            "xorr" => Kind::Xorr,
            "addl" => Kind::Addl,
            "subl" => Kind::Subl,
            "xrot2" => Kind::Xrot2,
            "sbox" => Kind::Sbox,
            _ => return None,
        })
    }
}

bitflags! {
    /// A set of operation kinds, used to exclude kinds from generation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KindSet: u16 {
        /// `Kind::Xor`
        const XOR = 1 << 0;
        /// `Kind::Mul`
        const MUL = 1 << 1;
        /// `Kind::Add`
        const ADD = 1 << 2;
        /// `Kind::Rot`
        const ROT = 1 << 3;
        /// `Kind::Not`
        const NOT = 1 << 4;
        /// `Kind::Bswap`
        const BSWAP = 1 << 5;
        /// `Kind::Shf`
        const SHF = 1 << 6;
        /// `Kind::Clmul`
        const CLMUL = 1 << 7;
        /// `Kind::Xorl`
        const XORL = 1 << 8;
        /// `Kind::Xorr`
        const XORR = 1 << 9;
        /// `Kind::Addl`
        const ADDL = 1 << 10;
        /// `Kind::Subl`
        const SUBL = 1 << 11;
        /// `Kind::Xrot2`
        const XROT2 = 1 << 12;
        /// `Kind::Sbox`
        const SBOX = 1 << 13;
    }
}

impl KindSet {
    /// Kinds whose immediates stay small: no word-sized constants.
    pub const SMALL_CONSTANT: KindSet = KindSet::ROT
        .union(KindSet::NOT)
        .union(KindSet::BSWAP)
        .union(KindSet::XORL)
        .union(KindSet::XORR)
        .union(KindSet::ADDL)
        .union(KindSet::SUBL)
        .union(KindSet::XROT2);

    /// The singleton set holding `kind`.
    pub const fn only(kind: Kind) -> KindSet {
        KindSet::from_bits_truncate(1 << kind as u16)
    }

    /// Whether `kind` is in the set.
    pub const fn has(self, kind: Kind) -> bool {
        self.bits() & (1 << kind as u16) != 0
    }
}

/// Which way an operation pushes bits, used by the smart generator to
/// alternate mixing directions across a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Low bits influence high bits.
    Left,
    /// No net direction.
    None,
    /// High bits influence low bits.
    Right,
}

/// One reversible mixing step with its constants.
///
/// Constants are stored width-agnostically; the owning [`crate::Program`]'s
/// width bounds them. Every permitted operation is a bijection on W-bit
/// words, which keeps whole programs bijective by composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `x ^= c`
    Xor(u64),
    /// `x *= c`, `c` odd
    Mul(u64),
    /// `x += c`
    Add(u64),
    /// `x = rotl(x, r)`, `1 <= r < W`
    Rot(u32),
    /// `x = ~x`
    Not,
    /// `x = bswap(x)`
    Bswap,
    /// Byte permutation: result lane `i` is input lane `(c >> 8i) & 0xff`.
    Shf(u64),
    /// Carry-less multiply by an odd constant.
    Clmul(u64),
    /// `x ^= x << s`, `1 <= s < W`
    Xorl(u32),
    /// `x ^= x >> s`, `1 <= s < W`
    Xorr(u32),
    /// `x += x << s`, `1 <= s < W`
    Addl(u32),
    /// `x -= x << s`, `1 <= s < W`
    Subl(u32),
    /// `x ^= rotl(x, a) ^ rotl(x, b)`, `a != b`, each in `1..W`
    Xrot2(u32, u32),
    /// `x = table[x]`, 16-bit only.
    Sbox,
}

impl Op {
    /// The operation's kind.
    pub const fn kind(&self) -> Kind {
        match self {
            Op::Xor(_) => Kind::Xor,
            Op::Mul(_) => Kind::Mul,
            Op::Add(_) => Kind::Add,
            Op::Rot(_) => Kind::Rot,
            Op::Not => Kind::Not,
            Op::Bswap => Kind::Bswap,
            Op::Shf(_) => Kind::Shf,
            Op::Clmul(_) => Kind::Clmul,
            Op::Xorl(_) => Kind::Xorl,
            Op::Xorr(_) => Kind::Xorr,
            Op::Addl(_) => Kind::Addl,
            Op::Subl(_) => Kind::Subl,
            Op::Xrot2(_, _) => Kind::Xrot2,
            Op::Sbox => Kind::Sbox,
        }
    }

    /// Mixing direction of the operation at the given width.
    ///
    /// Multiplies and left shifts push information left, right xorshifts
    /// push it right. A rotation's direction is the sign of `W/2 - r`.
    /// Xrot2 mixes both ways at once and reports no direction.
    pub fn direction(&self, width: Width) -> Direction {
        let half = width.bits() / 2;
        match *self {
            Op::Mul(_) | Op::Clmul(_) | Op::Xorl(_) | Op::Addl(_) | Op::Subl(_) => {
                Direction::Left
            }
            Op::Xorr(_) => Direction::Right,
            Op::Rot(r) if r < half => Direction::Left,
            Op::Rot(r) if r > half => Direction::Right,
            _ => Direction::None,
        }
    }

    /// Construct a fresh operation of `kind` with uniformly random valid
    /// constants for `width`.
    pub fn generate<R: Rng + ?Sized>(kind: Kind, width: Width, rng: &mut R) -> Op {
        debug_assert!(kind.allowed(width));
        let w = width.bits();
        let mask = width.mask();
        match kind {
            Kind::Xor => Op::Xor(rng.gen::<u64>() & mask),
            Kind::Mul => Op::Mul(rng.gen::<u64>() & mask | 1),
            Kind::Add => Op::Add(rng.gen::<u64>() & mask),
            Kind::Rot => Op::Rot(rng.gen_range(1..w)),
            Kind::Not => Op::Not,
            Kind::Bswap => Op::Bswap,
            Kind::Shf => Op::Shf(random_byte_perm(width, rng)),
            Kind::Clmul => Op::Clmul(rng.gen::<u64>() & mask | 1),
            Kind::Xorl => Op::Xorl(rng.gen_range(1..w)),
            Kind::Xorr => Op::Xorr(rng.gen_range(1..w)),
            Kind::Addl => Op::Addl(rng.gen_range(1..w)),
            Kind::Subl => Op::Subl(rng.gen_range(1..w)),
            Kind::Xrot2 => {
                let a = rng.gen_range(1..w);
                let mut b = rng.gen_range(1..w);
                while b == a {
                    b = rng.gen_range(1..w);
                }
                Op::Xrot2(a, b)
            }
            Kind::Sbox => Op::Sbox,
        }
    }

    /// Check the operation's constants against the kind rules at `width`.
    pub fn check(&self, width: Width) -> Result<(), ParseError> {
        let w = width.bits();
        let mask = width.mask();
        let shift_ok = |s: u32| (1..w).contains(&s);
        match *self {
            Op::Xor(c) | Op::Add(c) if c <= mask => Ok(()),
            Op::Xor(c) | Op::Add(c) => Err(ParseError::ConstantTooWide(c, width)),
            Op::Mul(c) | Op::Clmul(c) if c > mask => {
                Err(ParseError::ConstantTooWide(c, width))
            }
            Op::Mul(c) | Op::Clmul(c) if c & 1 == 0 => Err(ParseError::EvenMultiplier(c)),
            Op::Mul(_) | Op::Clmul(_) => Ok(()),
            Op::Rot(s) | Op::Xorl(s) | Op::Xorr(s) | Op::Addl(s) | Op::Subl(s) => {
                if shift_ok(s) {
                    Ok(())
                } else {
                    Err(ParseError::ShiftOutOfRange(s, width))
                }
            }
            Op::Xrot2(a, b) => {
                if !shift_ok(a) {
                    Err(ParseError::ShiftOutOfRange(a, width))
                } else if !shift_ok(b) {
                    Err(ParseError::ShiftOutOfRange(b, width))
                } else if a == b {
                    Err(ParseError::EqualRotations(a))
                } else {
                    Ok(())
                }
            }
            Op::Shf(c) => {
                if is_byte_perm(c, width) {
                    Ok(())
                } else {
                    Err(ParseError::NotAPermutation(c, width))
                }
            }
            Op::Not | Op::Bswap | Op::Sbox => Ok(()),
        }
    }
}

/// Whether `c` packs a permutation of the byte lane indices `0..W/8`.
pub(crate) fn is_byte_perm(c: u64, width: Width) -> bool {
    let lanes = width.lanes();
    if lanes < 8 && c >> (8 * lanes) != 0 {
        return false;
    }
    let mut seen = 0u8;
    for i in 0..lanes {
        let lane = (c >> (8 * i)) & 0xff;
        if lane >= u64::from(lanes) || seen & (1 << lane) != 0 {
            return false;
        }
        seen |= 1 << lane;
    }
    true
}

/// Inside-out Fisher-Yates over the byte lane indices, packed one index
/// per byte, little-endian.
fn random_byte_perm<R: Rng + ?Sized>(width: Width, rng: &mut R) -> u64 {
    let lanes = width.lanes() as usize;
    let mut perm = [0u8; 8];
    for i in 0..lanes {
        let j = rng.gen_range(0..=i);
        perm[i] = perm[j];
        perm[j] = i as u8;
    }
    u64::from_le_bytes(perm) & width.mask()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;
    use strum::IntoEnumIterator;

    #[test]
    fn generated_constants_are_valid() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0x1dea);
        for width in [Width::W16, Width::W32, Width::W64] {
            for kind in Kind::iter().filter(|k| k.allowed(width)) {
                for _ in 0..200 {
                    let op = Op::generate(kind, width, &mut rng);
                    assert_eq!(op.kind(), kind);
                    op.check(width).unwrap();
                }
            }
        }
    }

    #[test]
    fn shf_constants_are_permutations() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(7);
        for width in [Width::W32, Width::W64] {
            for _ in 0..500 {
                match Op::generate(Kind::Shf, width, &mut rng) {
                    Op::Shf(c) => assert!(is_byte_perm(c, width), "{c:#x}"),
                    other => panic!("unexpected op {other:?}"),
                }
            }
        }
    }

    #[test]
    fn mul_constants_are_odd() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(11);
        for width in [Width::W16, Width::W32, Width::W64] {
            for _ in 0..500 {
                match Op::generate(Kind::Mul, width, &mut rng) {
                    Op::Mul(c) => assert_eq!(c & 1, 1),
                    other => panic!("unexpected op {other:?}"),
                }
                if width != Width::W16 {
                    match Op::generate(Kind::Clmul, width, &mut rng) {
                        Op::Clmul(c) => assert_eq!(c & 1, 1),
                        other => panic!("unexpected op {other:?}"),
                    }
                }
            }
        }
    }

    #[test]
    fn byte_perm_rejects_duplicates() {
        assert!(is_byte_perm(0x0302_0100, Width::W32));
        assert!(!is_byte_perm(0x0302_0101, Width::W32));
        assert!(!is_byte_perm(0x0403_0201, Width::W32));
        assert!(is_byte_perm(0x0001_0203_0405_0607, Width::W64));
        assert!(!is_byte_perm(0x1_0302_0100, Width::W32));
    }

    #[test]
    fn rot_direction_follows_half_width() {
        assert_eq!(Op::Rot(5).direction(Width::W32), Direction::Left);
        assert_eq!(Op::Rot(16).direction(Width::W32), Direction::None);
        assert_eq!(Op::Rot(27).direction(Width::W32), Direction::Right);
        assert_eq!(Op::Rot(31).direction(Width::W64), Direction::Left);
    }

    #[test]
    fn kind_set_round_trip() {
        for kind in Kind::iter() {
            assert!(KindSet::only(kind).has(kind));
            assert!(!KindSet::SMALL_CONSTANT.has(Kind::Mul));
        }
        assert!(KindSet::SMALL_CONSTANT.has(Kind::Rot));
    }
}
