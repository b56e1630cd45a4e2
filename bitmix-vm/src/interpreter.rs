//! Direct interpretation of mixer programs.
//!
//! The portable counterpart of the JIT: a fold of the op sequence over the
//! input word. All arithmetic is modulo 2^W; on the 16-bit path the result
//! is masked on every step so wider native arithmetic cannot leak in.
//! This is the only materialization at 16 bits and the differential
//! oracle for the JIT at 32/64.

use bitmix_asm::Op;

/// A 16-bit substitution table, owned by the s-box driver.
pub type Sbox16 = [u16; 1 << 16];

/// Interpret a 32-bit op sequence.
pub fn eval32(ops: &[Op], mut x: u32) -> u32 {
    for op in ops {
        x = match *op {
            Op::Xor(c) => x ^ c as u32,
            Op::Mul(c) => x.wrapping_mul(c as u32),
            Op::Add(c) => x.wrapping_add(c as u32),
            Op::Rot(r) => x.rotate_left(r),
            Op::Not => !x,
            Op::Bswap => x.swap_bytes(),
            Op::Shf(c) => shuffle32(x, c),
            Op::Clmul(c) => clmul32(x, c as u32),
            Op::Xorl(s) => x ^ (x << s),
            Op::Xorr(s) => x ^ (x >> s),
            Op::Addl(s) => x.wrapping_add(x << s),
            Op::Subl(s) => x.wrapping_sub(x << s),
            Op::Xrot2(a, b) => x ^ x.rotate_left(a) ^ x.rotate_left(b),
            Op::Sbox => unreachable!("sbox mixers are 16-bit"),
        };
    }
    x
}

/// Interpret a 64-bit op sequence.
pub fn eval64(ops: &[Op], mut x: u64) -> u64 {
    for op in ops {
        x = match *op {
            Op::Xor(c) => x ^ c,
            Op::Mul(c) => x.wrapping_mul(c),
            Op::Add(c) => x.wrapping_add(c),
            Op::Rot(r) => x.rotate_left(r),
            Op::Not => !x,
            Op::Bswap => x.swap_bytes(),
            Op::Shf(c) => shuffle64(x, c),
            Op::Clmul(c) => clmul64(x, c),
            Op::Xorl(s) => x ^ (x << s),
            Op::Xorr(s) => x ^ (x >> s),
            Op::Addl(s) => x.wrapping_add(x << s),
            Op::Subl(s) => x.wrapping_sub(x << s),
            Op::Xrot2(a, b) => x ^ x.rotate_left(a) ^ x.rotate_left(b),
            Op::Sbox => unreachable!("sbox mixers are 16-bit"),
        };
    }
    x
}

/// Interpret a 16-bit op sequence; `sbox` backs any `Op::Sbox` step.
pub fn eval16(ops: &[Op], sbox: Option<&Sbox16>, mut x: u16) -> u16 {
    for op in ops {
        x = match *op {
            Op::Xor(c) => x ^ c as u16,
            Op::Mul(c) => x.wrapping_mul(c as u16),
            Op::Add(c) => x.wrapping_add(c as u16),
            Op::Rot(r) => x.rotate_left(r),
            Op::Not => !x,
            Op::Xorl(s) => x ^ (x << s),
            Op::Xorr(s) => x ^ (x >> s),
            Op::Addl(s) => x.wrapping_add(x << s),
            Op::Subl(s) => x.wrapping_sub(x << s),
            Op::Sbox => sbox.expect("sbox op without a table")[x as usize],
            Op::Bswap | Op::Shf(_) | Op::Clmul(_) | Op::Xrot2(..) => {
                unreachable!("kind does not exist at 16 bits")
            }
        };
    }
    x
}

fn shuffle32(x: u32, c: u64) -> u32 {
    let mut r = 0;
    for i in 0..4 {
        let lane = (c >> (8 * i)) & 0xff;
        r |= ((x >> (8 * lane)) & 0xff) << (8 * i);
    }
    r
}

fn shuffle64(x: u64, c: u64) -> u64 {
    let mut r = 0;
    for i in 0..8 {
        let lane = (c >> (8 * i)) & 0xff;
        r |= ((x >> (8 * lane)) & 0xff) << (8 * i);
    }
    r
}

/// Carry-less multiply truncated to 32 bits.
fn clmul32(x: u32, mut c: u32) -> u32 {
    let mut r = 0;
    while c != 0 {
        r ^= x << c.trailing_zeros();
        c &= c - 1;
    }
    r
}

/// Carry-less multiply truncated to 64 bits.
fn clmul64(x: u64, mut c: u64) -> u64 {
    let mut r = 0;
    while c != 0 {
        r ^= x << c.trailing_zeros();
        c &= c - 1;
    }
    r
}
