//! Ordered op sequences and their generators.

use core::fmt;
use core::fmt::Write as _;
use core::str::FromStr;

use rand::Rng;
use strum::IntoEnumIterator;

use crate::conv;
use crate::op::{Direction, Kind, KindSet, Op, Width};
use crate::ParseError;

/// Longest program any generator will produce.
pub const OPS_MAX: usize = 32;

/// Return whether ops of kinds `a` and `b` may be adjacent.
///
/// Adjacent duplicates in the constant-mixing family cancel or compose
/// into a single op, so they are rejected; the self-mixing family composes
/// freely with itself.
pub const fn valid_adjacent(a: Kind, b: Kind) -> bool {
    (a.self_mixing() && b.self_mixing()) || a as u16 != b as u16
}

/// A mixer: a single-width sequence of reversible ops.
///
/// Programs are plain values; drivers create them and the evaluator
/// consumes them. The empty program is the identity function and is only
/// ever built for evaluation, never by a generator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    width: Width,
    ops: Vec<Op>,
}

impl Program {
    /// Build a program after checking every op against the width rules.
    pub fn new(width: Width, ops: Vec<Op>) -> Result<Program, ParseError> {
        for op in &ops {
            if !op.kind().allowed(width) {
                return Err(ParseError::KindWidth(op.kind(), width));
            }
            op.check(width)?;
        }
        Ok(Program { width, ops })
    }

    /// The identity program.
    pub const fn empty(width: Width) -> Program {
        Program {
            width,
            ops: Vec::new(),
        }
    }

    /// Word width of the mixer.
    pub const fn width(&self) -> Width {
        self.width
    }

    /// The op sequence.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of ops.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the program is the identity.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether every adjacent pair satisfies [`valid_adjacent`].
    pub fn is_valid_sequence(&self) -> bool {
        self.ops
            .windows(2)
            .all(|w| valid_adjacent(w[0].kind(), w[1].kind()))
    }

    /// Kinds eligible for generation at `width`, minus `exclude`.
    fn generatable(width: Width, exclude: KindSet) -> Vec<Kind> {
        Kind::iter()
            .filter(|k| *k != Kind::Sbox && k.allowed(width) && !exclude.has(*k))
            .collect()
    }

    /// Uniformly random valid program of `len` ops.
    pub fn generate_uniform<R: Rng + ?Sized>(
        width: Width,
        len: usize,
        exclude: KindSet,
        rng: &mut R,
    ) -> Program {
        let kinds = Self::generatable(width, exclude);
        let mut ops: Vec<Op> = Vec::with_capacity(len);
        while ops.len() < len {
            let kind = kinds[rng.gen_range(0..kinds.len())];
            if let Some(prev) = ops.last() {
                if !valid_adjacent(prev.kind(), kind) {
                    continue;
                }
            }
            ops.push(Op::generate(kind, width, rng));
        }
        Program { width, ops }
    }

    /// Random valid program preferring strict alternation of mixing
    /// direction between consecutive ops.
    pub fn generate_smart<R: Rng + ?Sized>(
        width: Width,
        len: usize,
        exclude: KindSet,
        rng: &mut R,
    ) -> Program {
        let kinds = Self::generatable(width, exclude);
        let mut ops: Vec<Op> = Vec::with_capacity(len);
        let mut dir = Direction::None;
        while ops.len() < len {
            let kind = kinds[rng.gen_range(0..kinds.len())];
            if let Some(prev) = ops.last() {
                if !valid_adjacent(prev.kind(), kind) {
                    continue;
                }
            }
            let op = Op::generate(kind, width, rng);
            let newdir = op.direction(width);
            if dir != Direction::None && newdir == dir {
                continue;
            }
            if newdir != Direction::None {
                dir = newdir;
            }
            ops.push(op);
        }
        Program { width, ops }
    }

    /// Classic xorshift-multiply schema: `Xorr, (Mul, Xorr)` repeated
    /// `rounds` times, `2 * rounds + 1` ops in total.
    pub fn generate_xormul<R: Rng + ?Sized>(
        width: Width,
        rounds: usize,
        rng: &mut R,
    ) -> Program {
        let mut ops = Vec::with_capacity(2 * rounds + 1);
        ops.push(Op::generate(Kind::Xorr, width, rng));
        for _ in 0..rounds {
            ops.push(Op::generate(Kind::Mul, width, rng));
            ops.push(Op::generate(Kind::Xorr, width, rng));
        }
        Program { width, ops }
    }

    /// Emit the mixer as a C function body, one statement per op.
    pub fn c_source(&self) -> String {
        let ty = match self.width {
            Width::W16 => "uint16_t",
            Width::W32 => "uint32_t",
            Width::W64 => "uint64_t",
        };
        let mut out = String::new();
        let _ = writeln!(out, "{ty} hash({ty} x) {{");
        for op in &self.ops {
            let _ = writeln!(out, "    {}", c_statement(*op, self.width));
        }
        let _ = writeln!(out, "    return x;");
        out.push_str("}\n");
        out
    }
}

/// Render `c` the way the text and C forms print constants: unprefixed
/// zero-padded hex, one nibble per four bits of the width.
pub(crate) fn hex(c: u64, width: Width) -> String {
    format!("{:0>1$x}", c, width.bits() as usize / 4)
}

fn c_const(c: u64, width: Width) -> String {
    match width {
        Width::W16 => format!("0x{}U", hex(c, width)),
        Width::W32 => format!("0x{}", hex(c, width)),
        Width::W64 => format!("UINT64_C(0x{})", hex(c, width)),
    }
}

fn c_statement(op: Op, width: Width) -> String {
    let w = width.bits();
    // 16-bit operands promote to signed int in C; the casts keep the
    // printed functions correct on such targets.
    let cast = if width == Width::W16 { "(unsigned)" } else { "" };
    match op {
        Op::Xor(c) => format!("x ^= {};", c_const(c, width)),
        Op::Mul(c) => format!("x *= {};", c_const(c, width)),
        Op::Add(c) => format!("x += {};", c_const(c, width)),
        Op::Rot(r) => format!("x = ({cast}x << {r}) | (x >> {});", w - r),
        Op::Not => "x = ~x;".to_string(),
        Op::Bswap => format!("x = __builtin_bswap{w}(x);"),
        Op::Shf(c) => {
            let mut parts = Vec::new();
            for i in 0..width.lanes() {
                let lane = (c >> (8 * i)) & 0xff;
                parts.push(format!("((x >> {}) & 0xff) << {}", 8 * lane, 8 * i));
            }
            format!("x = {};", parts.join(" | "))
        }
        Op::Clmul(c) => format!("x = clmul{w}(x, {});", c_const(c, width)),
        Op::Xorl(s) => format!("x ^= {cast}x << {s};"),
        Op::Xorr(s) => format!("x ^= x >> {s};"),
        Op::Addl(s) => format!("x += {cast}x << {s};"),
        Op::Subl(s) => format!("x -= {cast}x << {s};"),
        Op::Xrot2(a, b) => format!(
            "x ^= (({cast}x << {a}) | (x >> {})) ^ (({cast}x << {b}) | (x >> {}));",
            w - a,
            w - b
        ),
        Op::Sbox => "x = sbox[x];".to_string(),
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_char(',')?;
            }
            conv::write_op(f, *op, self.width)?;
        }
        Ok(())
    }
}

impl FromStr for Program {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::Template::from_str(s)?.resolve()
    }
}
