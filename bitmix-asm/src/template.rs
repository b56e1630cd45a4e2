//! Templates: programs with some constants left open.
//!
//! A template fixes the op kinds of a candidate and optionally their
//! constants. The random driver re-randomizes the open constants each
//! iteration; the enumerate mode walks every valid assignment.

use core::fmt;
use core::str::FromStr;

use rand::Rng;

use crate::conv::{self, RawOp};
use crate::op::{Kind, Op, Width};
use crate::program::hex;
use crate::{ParseError, Program};

/// A single-width sequence of op kinds with optionally locked constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    width: Width,
    slots: Vec<RawOp>,
}

impl Template {
    /// Word width of the template.
    pub const fn width(&self) -> Width {
        self.width
    }

    /// Number of ops.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the template holds no ops.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether every slot's constants are pinned down.
    pub fn is_fully_locked(&self) -> bool {
        self.slots
            .iter()
            .all(|s| s.imm.is_some() || s.kind.imm_count() == 0)
    }

    /// Materialize, requiring every constant to be locked.
    pub fn resolve(&self) -> Result<Program, ParseError> {
        let mut ops = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            match slot.to_op(self.width)? {
                Some(op) => ops.push(op),
                None => return Err(ParseError::Unresolved),
            }
        }
        Ok(Program::new(self.width, ops).expect("locked slots were checked on parse"))
    }

    /// Materialize, drawing fresh random constants for open slots.
    pub fn instantiate<R: Rng + ?Sized>(&self, rng: &mut R) -> Program {
        let ops = self
            .slots
            .iter()
            .map(|slot| match slot.to_op(self.width) {
                Ok(Some(op)) => op,
                _ => Op::generate(slot.kind, self.width, rng),
            })
            .collect();
        Program::new(self.width, ops).expect("generated constants are valid")
    }

    /// Lazily enumerate every program matching the template, open slots
    /// walking their whole constant domain. Meant for shift-family
    /// templates; value-constant domains are walked too but are
    /// impractically large.
    pub fn programs(&self) -> TemplatePrograms<'_> {
        let sizes: Vec<u128> = self
            .slots
            .iter()
            .map(|s| domain_size(s, self.width))
            .collect();
        TemplatePrograms {
            template: self,
            counters: vec![0; self.slots.len()],
            sizes,
            done: self.slots.is_empty(),
        }
    }
}

impl FromStr for Template {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        let mut width = None;
        let mut slots = Vec::new();
        for tok in s.split(',') {
            let (w, raw) = conv::parse_op(tok)?;
            match width {
                None => width = Some(w),
                Some(expect) if expect != w => {
                    return Err(ParseError::MixedWidth(tok.to_string(), expect))
                }
                Some(_) => {}
            }
            // Locked constants fail fast, open ones are checked on draw.
            raw.to_op(w)?;
            slots.push(raw);
        }
        Ok(Template {
            width: width.expect("at least one token"),
            slots,
        })
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.slots.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}{}", self.width, slot.kind.token())?;
            if let Some(imm) = slot.imm {
                if conv::decimal_operand(slot.kind) {
                    write!(f, ":{imm}")?;
                } else {
                    write!(f, ":{}", hex(imm, self.width))?;
                }
            }
            if let Some(imm2) = slot.imm2 {
                write!(f, ":{imm2}")?;
            }
        }
        Ok(())
    }
}

/// Iterator over every program matching a template, rightmost open slot
/// varying fastest.
pub struct TemplatePrograms<'a> {
    template: &'a Template,
    counters: Vec<u128>,
    sizes: Vec<u128>,
    done: bool,
}

impl Iterator for TemplatePrograms<'_> {
    type Item = Program;

    fn next(&mut self) -> Option<Program> {
        if self.done {
            return None;
        }
        let width = self.template.width;
        let ops: Vec<Op> = self
            .template
            .slots
            .iter()
            .zip(&self.counters)
            .map(|(slot, &idx)| nth_op(slot, width, idx))
            .collect();

        // Odometer increment.
        let mut pos = self.counters.len();
        self.done = loop {
            if pos == 0 {
                break true;
            }
            pos -= 1;
            self.counters[pos] += 1;
            if self.counters[pos] < self.sizes[pos] {
                break false;
            }
            self.counters[pos] = 0;
        };

        Some(Program::new(width, ops).expect("enumerated constants are valid"))
    }
}

fn domain_size(slot: &RawOp, width: Width) -> u128 {
    if slot.imm.is_some() || slot.kind.imm_count() == 0 {
        return 1;
    }
    let w = u128::from(width.bits());
    match slot.kind {
        Kind::Rot | Kind::Xorl | Kind::Xorr | Kind::Addl | Kind::Subl => w - 1,
        Kind::Xrot2 => (w - 1) * (w - 2),
        Kind::Mul | Kind::Clmul => 1u128 << (width.bits() - 1),
        Kind::Xor | Kind::Add => u128::from(width.mask()) + 1,
        Kind::Shf => (1..=u128::from(width.lanes())).product(),
        Kind::Not | Kind::Bswap | Kind::Sbox => 1,
    }
}

fn nth_op(slot: &RawOp, width: Width, idx: u128) -> Op {
    if let Ok(Some(op)) = slot.to_op(width) {
        return op;
    }
    let w = width.bits();
    match slot.kind {
        Kind::Rot => Op::Rot(1 + idx as u32),
        Kind::Xorl => Op::Xorl(1 + idx as u32),
        Kind::Xorr => Op::Xorr(1 + idx as u32),
        Kind::Addl => Op::Addl(1 + idx as u32),
        Kind::Subl => Op::Subl(1 + idx as u32),
        Kind::Xrot2 => {
            let a = 1 + (idx / u128::from(w - 2)) as u32;
            let r = (idx % u128::from(w - 2)) as u32;
            let b = if r + 1 < a { r + 1 } else { r + 2 };
            Op::Xrot2(a, b)
        }
        Kind::Mul => Op::Mul(2 * idx as u64 + 1),
        Kind::Clmul => Op::Clmul(2 * idx as u64 + 1),
        Kind::Xor => Op::Xor(idx as u64),
        Kind::Add => Op::Add(idx as u64),
        Kind::Shf => Op::Shf(nth_byte_perm(width.lanes(), idx)),
        Kind::Not | Kind::Bswap | Kind::Sbox => {
            unreachable!("constant-free kinds have a unit domain")
        }
    }
}

/// Unrank a byte-lane permutation in factorial base.
fn nth_byte_perm(lanes: u32, mut idx: u128) -> u64 {
    let mut avail: Vec<u8> = (0..lanes as u8).collect();
    let mut packed = [0u8; 8];
    for (i, slot) in packed.iter_mut().take(lanes as usize).enumerate() {
        let rest = (lanes as usize - 1 - i) as u128;
        let f: u128 = (1..=rest).product();
        let d = (idx / f.max(1)) as usize;
        idx %= f.max(1);
        *slot = avail.remove(d);
    }
    u64::from_le_bytes(packed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::KindSet;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    #[test]
    fn round_trips_generated_programs() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0xbeef);
        for width in [Width::W16, Width::W32, Width::W64] {
            for len in 1..=8 {
                let p = Program::generate_uniform(width, len, KindSet::empty(), &mut rng);
                let text = p.to_string();
                let back: Program = text.parse().unwrap();
                assert_eq!(p, back, "round trip failed for {text}");
            }
        }
    }

    #[test]
    fn resolves_a_fully_locked_template() {
        let p: Program = "32xorr:16,32mul:045d9f3b,32xorr:16,32mul:045d9f3b,32xorr:16"
            .parse()
            .unwrap();
        assert_eq!(p.width(), Width::W32);
        assert_eq!(
            p.ops(),
            &[
                Op::Xorr(16),
                Op::Mul(0x045d_9f3b),
                Op::Xorr(16),
                Op::Mul(0x045d_9f3b),
                Op::Xorr(16),
            ]
        );
    }

    #[test]
    fn open_templates_do_not_resolve() {
        let t: Template = "32xorr,32mul:045d9f3b".parse().unwrap();
        assert!(!t.is_fully_locked());
        assert_eq!(t.resolve().unwrap_err(), ParseError::Unresolved);
    }

    #[test]
    fn instantiate_keeps_locked_slots() {
        let t: Template = "32xorr:9,32mul,32rot".parse().unwrap();
        let mut rng = Xoshiro256StarStar::seed_from_u64(3);
        for _ in 0..50 {
            let p = t.instantiate(&mut rng);
            assert_eq!(p.ops()[0], Op::Xorr(9));
            assert!(matches!(p.ops()[1], Op::Mul(c) if c & 1 == 1));
            assert!(matches!(p.ops()[2], Op::Rot(r) if (1..32).contains(&r)));
        }
    }

    #[test]
    fn mixed_widths_are_rejected() {
        assert!(matches!(
            "32xorr:16,64mul:0000000000000045".parse::<Template>(),
            Err(ParseError::MixedWidth(..))
        ));
    }

    #[test]
    fn enumerates_shift_domains() {
        let t: Template = "32xorr".parse().unwrap();
        let all: Vec<Program> = t.programs().collect();
        assert_eq!(all.len(), 31);
        assert_eq!(all[0].ops(), &[Op::Xorr(1)]);
        assert_eq!(all[30].ops(), &[Op::Xorr(31)]);

        let t: Template = "32xorr:7,32not".parse().unwrap();
        assert_eq!(t.programs().count(), 1);

        let t: Template = "32xorl,32xorr".parse().unwrap();
        assert_eq!(t.programs().count(), 31 * 31);
    }

    #[test]
    fn enumerates_xrot2_pairs() {
        let t: Template = "32xrot2".parse().unwrap();
        let all: Vec<Program> = t.programs().collect();
        assert_eq!(all.len(), 31 * 30);
        for p in &all {
            match p.ops()[0] {
                Op::Xrot2(a, b) => assert_ne!(a, b),
                ref other => panic!("unexpected op {other:?}"),
            }
        }
    }

    #[test]
    fn enumerates_byte_perms() {
        let t: Template = "32shf".parse().unwrap();
        let all: Vec<Program> = t.programs().collect();
        assert_eq!(all.len(), 24);
        let mut seen = std::collections::HashSet::new();
        for p in &all {
            match p.ops()[0] {
                Op::Shf(c) => assert!(seen.insert(c)),
                ref other => panic!("unexpected op {other:?}"),
            }
        }
        // Identity permutation ranks first.
        assert_eq!(all[0].ops(), &[Op::Shf(0x0302_0100)]);
    }

    #[test]
    fn template_display_keeps_open_slots_open() {
        let t: Template = "32xorr:9,32mul,32not".parse().unwrap();
        assert_eq!(t.to_string(), "32xorr:9,32mul,32not");
    }
}
