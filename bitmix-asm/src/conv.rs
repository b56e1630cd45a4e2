//! Text form of ops: `<width><kind>[:<imm>[:<imm2>]]`.
//!
//! Value constants (xor, mul, add, shf, clmul) read and print as
//! unprefixed hex; shift and rotation amounts read and print as decimal.
//! `32xorr:16` shifts right by sixteen, `32mul:045d9f3b` multiplies by
//! `0x045d9f3b`.

use core::fmt;

use thiserror::Error;

use crate::op::{Kind, Op, Width};
use crate::program::hex;

/// Failure to understand a textual op, program, or template.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The template string held no ops at all.
    #[error("empty template")]
    Empty,
    /// Missing `16`/`32`/`64` width prefix.
    #[error("missing width prefix in `{0}`")]
    MissingWidth(String),
    /// Unrecognized kind token.
    #[error("unknown op `{0}`")]
    UnknownOp(String),
    /// Ops of different widths in one template.
    #[error("mixed widths: `{0}` in a {1}-bit template")]
    MixedWidth(String, Width),
    /// The kind does not exist at this width.
    #[error("`{}` does not exist at width {}", .0.token(), .1)]
    KindWidth(Kind, Width),
    /// A constant was supplied to a kind that takes none.
    #[error("`{}` takes no constant", .0.token())]
    UnexpectedConstant(Kind),
    /// A second constant was supplied where one is expected, or an
    /// `xrot2` came with only one.
    #[error("`{}` takes exactly {} constant(s)", .0.token(), .1)]
    ConstantArity(Kind, usize),
    /// A constant failed integer parsing.
    #[error("malformed integer `{0}`")]
    BadInteger(String),
    /// The constant does not fit in the word.
    #[error("constant {0:#x} does not fit in {1} bits")]
    ConstantTooWide(u64, Width),
    /// Multiplier constants must be odd to stay bijective.
    #[error("multiplier {0:#x} must be odd")]
    EvenMultiplier(u64),
    /// Shift or rotation amount outside `1..W`.
    #[error("shift {0} out of range for width {1}")]
    ShiftOutOfRange(u32, Width),
    /// The two `xrot2` rotations must differ.
    #[error("xrot2 rotations must differ (both are {0})")]
    EqualRotations(u32),
    /// The shf constant must permute the byte lanes.
    #[error("{0:#x} is not a permutation of the {1}-bit byte lanes")]
    NotAPermutation(u64, Width),
    /// A template with unlocked constants where a full program is needed.
    #[error("template leaves constants unresolved")]
    Unresolved,
}

/// Whether the kind's constants read and print as decimal shift amounts
/// rather than hex values.
pub(crate) const fn decimal_operand(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Rot | Kind::Xorl | Kind::Xorr | Kind::Addl | Kind::Subl | Kind::Xrot2
    )
}

/// One parsed op token, constants possibly left open for a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RawOp {
    pub kind: Kind,
    pub imm: Option<u64>,
    pub imm2: Option<u64>,
}

impl RawOp {
    /// Materialize into an op, validating constants; `None` if unlocked.
    pub fn to_op(self, width: Width) -> Result<Option<Op>, ParseError> {
        let op = match (self.kind, self.imm, self.imm2) {
            (Kind::Not, None, None) => Op::Not,
            (Kind::Bswap, None, None) => Op::Bswap,
            (Kind::Sbox, None, None) => Op::Sbox,
            (_, None, None) => return Ok(None),
            (Kind::Xor, Some(c), None) => Op::Xor(c),
            (Kind::Mul, Some(c), None) => Op::Mul(c),
            (Kind::Add, Some(c), None) => Op::Add(c),
            (Kind::Rot, Some(c), None) => Op::Rot(c as u32),
            (Kind::Shf, Some(c), None) => Op::Shf(c),
            (Kind::Clmul, Some(c), None) => Op::Clmul(c),
            (Kind::Xorl, Some(c), None) => Op::Xorl(c as u32),
            (Kind::Xorr, Some(c), None) => Op::Xorr(c as u32),
            (Kind::Addl, Some(c), None) => Op::Addl(c as u32),
            (Kind::Subl, Some(c), None) => Op::Subl(c as u32),
            (Kind::Xrot2, Some(a), Some(b)) => Op::Xrot2(a as u32, b as u32),
            (kind @ (Kind::Not | Kind::Bswap | Kind::Sbox), Some(_), _) => {
                return Err(ParseError::UnexpectedConstant(kind))
            }
            (kind, _, _) => {
                return Err(ParseError::ConstantArity(kind, kind.imm_count()))
            }
        };
        op.check(width)?;
        Ok(Some(op))
    }
}

/// Parse one `<width><kind>[:<imm>[:<imm2>]]` token.
pub(crate) fn parse_op(tok: &str) -> Result<(Width, RawOp), ParseError> {
    let (width, rest) = Width::from_prefix(tok)
        .ok_or_else(|| ParseError::MissingWidth(tok.to_string()))?;
    let mut parts = rest.split(':');
    let name = parts.next().unwrap_or("");
    let kind =
        Kind::from_token(name).ok_or_else(|| ParseError::UnknownOp(tok.to_string()))?;
    if !kind.allowed(width) {
        return Err(ParseError::KindWidth(kind, width));
    }

    let radix = if decimal_operand(kind) { 10 } else { 16 };
    let mut imm = None;
    let mut imm2 = None;
    for slot in [&mut imm, &mut imm2] {
        match parts.next() {
            None => break,
            Some(text) => {
                let value = u64::from_str_radix(text, radix)
                    .map_err(|_| ParseError::BadInteger(text.to_string()))?;
                *slot = Some(value);
            }
        }
    }
    if parts.next().is_some() {
        return Err(ParseError::ConstantArity(kind, kind.imm_count()));
    }
    // A lone constant on xrot2 is not a valid partial lock.
    if kind == Kind::Xrot2 && imm.is_some() && imm2.is_none() {
        return Err(ParseError::ConstantArity(kind, 2));
    }
    if kind != Kind::Xrot2 && imm2.is_some() {
        return Err(ParseError::ConstantArity(kind, kind.imm_count()));
    }
    Ok((width, RawOp { kind, imm, imm2 }))
}

/// Write one op in the text form.
pub(crate) fn write_op(f: &mut fmt::Formatter<'_>, op: Op, width: Width) -> fmt::Result {
    write!(f, "{width}{}", op.kind().token())?;
    match op {
        Op::Xor(c) | Op::Mul(c) | Op::Add(c) | Op::Shf(c) | Op::Clmul(c) => {
            write!(f, ":{}", hex(c, width))
        }
        Op::Rot(s) | Op::Xorl(s) | Op::Xorr(s) | Op::Addl(s) | Op::Subl(s) => {
            write!(f, ":{s}")
        }
        Op::Xrot2(a, b) => write!(f, ":{a}:{b}"),
        Op::Not | Op::Bswap | Op::Sbox => Ok(()),
    }
}
