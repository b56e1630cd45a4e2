//! amd64 encodings for each op.
//!
//! The emitted function keeps the word in `eax`/`rax` and uses the
//! caller-saved `rdi`/`rsi`/`rcx` and `xmm0`/`xmm1` as scratch, so it is a
//! complete sysv64 function with one integer argument in and one out.

use bitmix_asm::{Op, Program, Width};

/// Emit the whole program: prologue, one sequence per op, `ret`.
pub(crate) fn emit(program: &Program) -> Vec<u8> {
    let mut code = Vec::with_capacity(64 + 32 * program.len());
    match program.width() {
        Width::W32 => {
            // mov eax, edi
            code.extend_from_slice(&[0x89, 0xf8]);
            for op in program.ops() {
                emit32(*op, &mut code);
            }
        }
        Width::W64 => {
            // mov rax, rdi
            code.extend_from_slice(&[0x48, 0x89, 0xf8]);
            for op in program.ops() {
                emit64(*op, &mut code);
            }
        }
        Width::W16 => unreachable!("16-bit mixers are interpreted"),
    }
    // ret
    code.push(0xc3);
    code
}

fn emit32(op: Op, code: &mut Vec<u8>) {
    match op {
        Op::Xor(c) => {
            // xor eax, imm32
            code.push(0x35);
            code.extend_from_slice(&(c as u32).to_le_bytes());
        }
        Op::Mul(c) => {
            // imul eax, eax, imm32
            code.extend_from_slice(&[0x69, 0xc0]);
            code.extend_from_slice(&(c as u32).to_le_bytes());
        }
        Op::Add(c) => {
            // add eax, imm32
            code.push(0x05);
            code.extend_from_slice(&(c as u32).to_le_bytes());
        }
        Op::Rot(r) => {
            // rol eax, imm8
            code.extend_from_slice(&[0xc1, 0xc0, r as u8]);
        }
        Op::Not => {
            // not eax
            code.extend_from_slice(&[0xf7, 0xd0]);
        }
        Op::Bswap => {
            // bswap eax
            code.extend_from_slice(&[0x0f, 0xc8]);
        }
        Op::Shf(c) => {
            // mov edi, eax; xor eax, eax
            code.extend_from_slice(&[0x89, 0xc7, 0x31, 0xc0]);
            for i in 0..4u8 {
                let lane = ((c >> (8 * i)) & 0xff) as u8;
                // mov ecx, edi
                code.extend_from_slice(&[0x89, 0xf9]);
                if lane > 0 {
                    // shr ecx, 8*lane
                    code.extend_from_slice(&[0xc1, 0xe9, 8 * lane]);
                }
                // movzx ecx, cl
                code.extend_from_slice(&[0x0f, 0xb6, 0xc9]);
                if i > 0 {
                    // shl ecx, 8*i
                    code.extend_from_slice(&[0xc1, 0xe1, 8 * i]);
                }
                // or eax, ecx
                code.extend_from_slice(&[0x09, 0xc8]);
            }
        }
        Op::Clmul(c) => {
            // movd xmm0, eax
            code.extend_from_slice(&[0x66, 0x0f, 0x6e, 0xc0]);
            // mov edi, imm32
            code.push(0xbf);
            code.extend_from_slice(&(c as u32).to_le_bytes());
            // movd xmm1, edi
            code.extend_from_slice(&[0x66, 0x0f, 0x6e, 0xcf]);
            // pclmulqdq xmm0, xmm1, 0
            code.extend_from_slice(&[0x66, 0x0f, 0x3a, 0x44, 0xc1, 0x00]);
            // movd eax, xmm0
            code.extend_from_slice(&[0x66, 0x0f, 0x7e, 0xc0]);
        }
        Op::Xorl(s) => {
            // mov edi, eax; shl edi, imm8; xor eax, edi
            code.extend_from_slice(&[0x89, 0xc7, 0xc1, 0xe7, s as u8, 0x31, 0xf8]);
        }
        Op::Xorr(s) => {
            // mov edi, eax; shr edi, imm8; xor eax, edi
            code.extend_from_slice(&[0x89, 0xc7, 0xc1, 0xef, s as u8, 0x31, 0xf8]);
        }
        Op::Addl(s) => {
            // mov edi, eax; shl edi, imm8; add eax, edi
            code.extend_from_slice(&[0x89, 0xc7, 0xc1, 0xe7, s as u8, 0x01, 0xf8]);
        }
        Op::Subl(s) => {
            // mov edi, eax; shl edi, imm8; sub eax, edi
            code.extend_from_slice(&[0x89, 0xc7, 0xc1, 0xe7, s as u8, 0x29, 0xf8]);
        }
        Op::Xrot2(a, b) => {
            // mov edi, eax; rol edi, a
            code.extend_from_slice(&[0x89, 0xc7, 0xc1, 0xc7, a as u8]);
            // mov esi, eax; rol esi, b
            code.extend_from_slice(&[0x89, 0xc6, 0xc1, 0xc6, b as u8]);
            // xor eax, edi; xor eax, esi
            code.extend_from_slice(&[0x31, 0xf8, 0x31, 0xf0]);
        }
        Op::Sbox => unreachable!("sbox mixers are 16-bit"),
    }
}

fn emit64(op: Op, code: &mut Vec<u8>) {
    // movabs rdi, imm64
    fn mov_rdi(c: u64, code: &mut Vec<u8>) {
        code.extend_from_slice(&[0x48, 0xbf]);
        code.extend_from_slice(&c.to_le_bytes());
    }
    match op {
        Op::Xor(c) => {
            mov_rdi(c, code);
            // xor rax, rdi
            code.extend_from_slice(&[0x48, 0x31, 0xf8]);
        }
        Op::Mul(c) => {
            mov_rdi(c, code);
            // imul rax, rdi
            code.extend_from_slice(&[0x48, 0x0f, 0xaf, 0xc7]);
        }
        Op::Add(c) => {
            mov_rdi(c, code);
            // add rax, rdi
            code.extend_from_slice(&[0x48, 0x01, 0xf8]);
        }
        Op::Rot(r) => {
            // rol rax, imm8
            code.extend_from_slice(&[0x48, 0xc1, 0xc0, r as u8]);
        }
        Op::Not => {
            // not rax
            code.extend_from_slice(&[0x48, 0xf7, 0xd0]);
        }
        Op::Bswap => {
            // bswap rax
            code.extend_from_slice(&[0x48, 0x0f, 0xc8]);
        }
        Op::Shf(c) => {
            // mov rdi, rax; xor eax, eax
            code.extend_from_slice(&[0x48, 0x89, 0xc7, 0x31, 0xc0]);
            for i in 0..8u8 {
                let lane = ((c >> (8 * i)) & 0xff) as u8;
                // mov rcx, rdi
                code.extend_from_slice(&[0x48, 0x89, 0xf9]);
                if lane > 0 {
                    // shr rcx, 8*lane
                    code.extend_from_slice(&[0x48, 0xc1, 0xe9, 8 * lane]);
                }
                // movzx ecx, cl
                code.extend_from_slice(&[0x0f, 0xb6, 0xc9]);
                if i > 0 {
                    // shl rcx, 8*i
                    code.extend_from_slice(&[0x48, 0xc1, 0xe1, 8 * i]);
                }
                // or rax, rcx
                code.extend_from_slice(&[0x48, 0x09, 0xc8]);
            }
        }
        Op::Clmul(c) => {
            // movq xmm0, rax
            code.extend_from_slice(&[0x66, 0x48, 0x0f, 0x6e, 0xc0]);
            mov_rdi(c, code);
            // movq xmm1, rdi
            code.extend_from_slice(&[0x66, 0x48, 0x0f, 0x6e, 0xcf]);
            // pclmulqdq xmm0, xmm1, 0
            code.extend_from_slice(&[0x66, 0x0f, 0x3a, 0x44, 0xc1, 0x00]);
            // movq rax, xmm0
            code.extend_from_slice(&[0x66, 0x48, 0x0f, 0x7e, 0xc0]);
        }
        Op::Xorl(s) => {
            // mov rdi, rax; shl rdi, imm8; xor rax, rdi
            code.extend_from_slice(&[
                0x48, 0x89, 0xc7, 0x48, 0xc1, 0xe7, s as u8, 0x48, 0x31, 0xf8,
            ]);
        }
        Op::Xorr(s) => {
            // mov rdi, rax; shr rdi, imm8; xor rax, rdi
            code.extend_from_slice(&[
                0x48, 0x89, 0xc7, 0x48, 0xc1, 0xef, s as u8, 0x48, 0x31, 0xf8,
            ]);
        }
        Op::Addl(s) => {
            // mov rdi, rax; shl rdi, imm8; add rax, rdi
            code.extend_from_slice(&[
                0x48, 0x89, 0xc7, 0x48, 0xc1, 0xe7, s as u8, 0x48, 0x01, 0xf8,
            ]);
        }
        Op::Subl(s) => {
            // mov rdi, rax; shl rdi, imm8; sub rax, rdi
            code.extend_from_slice(&[
                0x48, 0x89, 0xc7, 0x48, 0xc1, 0xe7, s as u8, 0x48, 0x29, 0xf8,
            ]);
        }
        Op::Xrot2(a, b) => {
            // mov rdi, rax; rol rdi, a
            code.extend_from_slice(&[0x48, 0x89, 0xc7, 0x48, 0xc1, 0xc7, a as u8]);
            // mov rsi, rax; rol rsi, b
            code.extend_from_slice(&[0x48, 0x89, 0xc6, 0x48, 0xc1, 0xc6, b as u8]);
            // xor rax, rdi; xor rax, rsi
            code.extend_from_slice(&[0x48, 0x31, 0xf8, 0x48, 0x31, 0xf0]);
        }
        Op::Sbox => unreachable!("sbox mixers are 16-bit"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_the_documented_xorshift_multiply_encoding() {
        let p: Program = "32xorr:16,32mul:045d9f3b".parse().unwrap();
        assert_eq!(
            emit(&p),
            vec![
                0x89, 0xf8, // mov eax, edi
                0x89, 0xc7, 0xc1, 0xef, 16, 0x31, 0xf8, // x ^= x >> 16
                0x69, 0xc0, 0x3b, 0x9f, 0x5d, 0x04, // imul eax, eax, 0x045d9f3b
                0xc3, // ret
            ]
        );
    }

    #[test]
    fn emits_64_bit_prologue_and_wide_immediates() {
        let p: Program = "64xor:0123456789abcdef".parse().unwrap();
        assert_eq!(
            emit(&p),
            vec![
                0x48, 0x89, 0xf8, // mov rax, rdi
                0x48, 0xbf, 0xef, 0xcd, 0xab, 0x89, 0x67, 0x45, 0x23,
                0x01, // movabs rdi, imm64
                0x48, 0x31, 0xf8, // xor rax, rdi
                0xc3, // ret
            ]
        );
    }
}
