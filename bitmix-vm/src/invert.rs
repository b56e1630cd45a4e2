//! Inverse emission for the three-multiply schema.
//!
//! Every op in the schema is invertible in closed form: an odd
//! multiplier by its modular inverse, a right xorshift by the xor of all
//! its shifted powers below the word width. The inverse is emitted as C
//! text only; the search never needs it.

use crate::consts::HASHN;
use crate::search::climb::Point;

/// Modular multiplicative inverse of an odd 32-bit constant.
///
/// Newton's iteration doubles the correct low bits each round; an odd
/// word is its own inverse mod 8, so five rounds cover 32 bits.
pub fn modinv32(a: u32) -> u32 {
    let mut x = a;
    for _ in 0..5 {
        let axx = a.wrapping_mul(x).wrapping_mul(x);
        x = x.wrapping_add(x.wrapping_sub(axx));
    }
    x
}

/// Invert one right xorshift: `x ^= x>>s` reverses as the xor of every
/// power `x>>ks` still inside the word.
pub fn unxorshift32(mut x: u32, s: u32) -> u32 {
    let mut r = x;
    let mut shift = s;
    while shift < 32 {
        x >>= s;
        r ^= x;
        shift += s;
    }
    r
}

/// Apply the inverse of a whole point, undoing its ops back to front.
pub fn unmix(p: &Point, mut x: u32) -> u32 {
    x = unxorshift32(x, u32::from(p.s[HASHN]));
    for i in (0..HASHN).rev() {
        x = x.wrapping_mul(modinv32(p.c[i]));
        x = unxorshift32(x, u32::from(p.s[i]));
    }
    x
}

/// Emit the inverse of a point as a C function.
pub fn inverse_source(p: &Point) -> String {
    let mut out = String::from("uint32_t hash_r(uint32_t x) {\n");
    for i in 0..(2 * HASHN + 1) {
        if i % 2 == 0 {
            let s = u32::from(p.s[HASHN - i / 2]);
            let terms: Vec<String> = (1..)
                .map(|k| k * s)
                .take_while(|&shift| shift < 32)
                .map(|shift| format!("x >> {shift}"))
                .collect();
            out.push_str(&format!("    x ^= {};\n", terms.join(" ^ ")));
        } else {
            let c = p.c[HASHN - (i + 1) / 2];
            out.push_str(&format!("    x *= 0x{:08x};\n", modinv32(c)));
        }
    }
    out.push_str("    return x;\n}\n");
    out
}
