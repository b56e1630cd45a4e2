//! Runtime assembly of mixer programs.
//!
//! A program is materialized by emitting amd64 code into one executable
//! page. The page is created once per driver and lives for the process;
//! its content is rewritten for each candidate and its protection is
//! toggled around every evaluation.
//!
//! The first `lock` probes whether the host allows a page that is
//! simultaneously writable and executable. If it does, the page stays
//! R+W+X and later transitions cost nothing; if the host enforces W^X,
//! every lock/unlock pair flips R+W to R+X and back. The probe result is
//! cached process-wide.

mod x86_64;

use std::io;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU8, Ordering};

use bitmix_asm::{Program, Width};
use tracing::debug;

use crate::consts::PAGE_LEN;
use crate::Error;

const POLICY_UNKNOWN: u8 = 0;
const POLICY_DISABLED: u8 = 1;
const POLICY_ENFORCED: u8 = 2;

// Write-once-at-first-use cache of the host's W^X stance.
static WX_POLICY: AtomicU8 = AtomicU8::new(POLICY_UNKNOWN);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Writable,
    Executable,
}

/// One executable page holding the code of the current candidate.
///
/// The page is owned by a single driver thread. Workers of the exact
/// evaluator may call the materialized function concurrently through
/// [`MixFn32`]/[`MixFn64`] handles, which borrow the page and therefore
/// keep it locked and un-rewritten for the duration of the calls.
#[derive(Debug)]
pub struct ExecPage {
    ptr: NonNull<u8>,
    state: State,
    rwx: bool,
    width: Option<Width>,
}

impl ExecPage {
    /// Map a fresh writable page.
    pub fn new() -> Result<ExecPage, Error> {
        // Safety: anonymous private mapping with no requested address.
        let p = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                PAGE_LEN,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(Error::ExecMap(io::Error::last_os_error()));
        }
        Ok(ExecPage {
            ptr: NonNull::new(p.cast()).expect("mmap returned null without MAP_FAILED"),
            state: State::Writable,
            rwx: false,
            width: None,
        })
    }

    /// Emit `program` into the page, replacing the previous candidate.
    ///
    /// The program must be 32- or 64-bit; 16-bit mixers are interpreted.
    /// The page must be unlocked unless the host allows R+W+X.
    pub fn load(&mut self, program: &Program) {
        assert!(
            program.width() != Width::W16,
            "16-bit mixers are interpreted, not jitted"
        );
        assert!(
            self.state == State::Writable,
            "page must be unlocked before rewriting"
        );
        let code = x86_64::emit(program);
        assert!(
            code.len() <= PAGE_LEN,
            "emitted {} bytes for a {} op program, page is {PAGE_LEN}",
            code.len(),
            program.len(),
        );
        // Safety: the page is writable, private, and at least code.len().
        unsafe {
            std::ptr::copy_nonoverlapping(code.as_ptr(), self.ptr.as_ptr(), code.len());
        }
        self.width = Some(program.width());
    }

    fn protect(&self, prot: libc::c_int) -> Result<(), Error> {
        // Safety: ptr/PAGE_LEN name the mapping created in `new`.
        let r = unsafe { libc::mprotect(self.ptr.as_ptr().cast(), PAGE_LEN, prot) };
        if r != 0 {
            return Err(Error::ExecProtect(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// Make the page executable.
    pub fn lock(&mut self) -> Result<(), Error> {
        const RWX: libc::c_int = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;
        const RX: libc::c_int = libc::PROT_READ | libc::PROT_EXEC;
        match WX_POLICY.load(Ordering::Relaxed) {
            POLICY_ENFORCED => self.protect(RX)?,
            POLICY_DISABLED => {
                if !self.rwx {
                    self.protect(RWX)?;
                    self.rwx = true;
                }
            }
            _ => match self.protect(RWX) {
                Ok(()) => {
                    debug!("host allows W+X pages, locking becomes free");
                    WX_POLICY.store(POLICY_DISABLED, Ordering::Relaxed);
                    self.rwx = true;
                }
                Err(_) => {
                    debug!("host enforces W^X, toggling R+W and R+X per candidate");
                    WX_POLICY.store(POLICY_ENFORCED, Ordering::Relaxed);
                    self.protect(RX)?;
                }
            },
        }
        self.state = State::Executable;
        Ok(())
    }

    /// Make the page writable again. A no-op mapping-wise when the host
    /// allowed R+W+X.
    pub fn unlock(&mut self) -> Result<(), Error> {
        if WX_POLICY.load(Ordering::Relaxed) == POLICY_ENFORCED {
            self.protect(libc::PROT_READ | libc::PROT_WRITE)?;
        }
        self.state = State::Writable;
        Ok(())
    }

    /// Callable handle for the loaded 32-bit mixer.
    ///
    /// # Panics
    ///
    /// If the page is not locked or the loaded program is not 32-bit.
    pub fn fn32(&self) -> MixFn32<'_> {
        assert_eq!(self.state, State::Executable, "page is not locked");
        assert_eq!(self.width, Some(Width::W32), "loaded program is not 32-bit");
        // Safety: the page holds a complete function with the sysv64
        // one-word-in, one-word-out ABI, and is executable.
        let f = unsafe {
            std::mem::transmute::<*mut u8, unsafe extern "sysv64" fn(u32) -> u32>(
                self.ptr.as_ptr(),
            )
        };
        MixFn32 {
            f,
            _page: PhantomData,
        }
    }

    /// Callable handle for the loaded 64-bit mixer.
    ///
    /// # Panics
    ///
    /// If the page is not locked or the loaded program is not 64-bit.
    pub fn fn64(&self) -> MixFn64<'_> {
        assert_eq!(self.state, State::Executable, "page is not locked");
        assert_eq!(self.width, Some(Width::W64), "loaded program is not 64-bit");
        // Safety: as in `fn32`.
        let f = unsafe {
            std::mem::transmute::<*mut u8, unsafe extern "sysv64" fn(u64) -> u64>(
                self.ptr.as_ptr(),
            )
        };
        MixFn64 {
            f,
            _page: PhantomData,
        }
    }
}

impl Drop for ExecPage {
    fn drop(&mut self) {
        // Safety: unmapping the mapping created in `new`.
        unsafe {
            libc::munmap(self.ptr.as_ptr().cast(), PAGE_LEN);
        }
    }
}

// Safety: the page is a plain memory region; the handles only read it.
unsafe impl Send for ExecPage {}
unsafe impl Sync for ExecPage {}

/// A jitted 32-bit mixer, valid while the page stays locked.
#[derive(Clone, Copy)]
pub struct MixFn32<'a> {
    f: unsafe extern "sysv64" fn(u32) -> u32,
    _page: PhantomData<&'a ExecPage>,
}

impl MixFn32<'_> {
    /// Run the mixer.
    #[inline]
    pub fn call(&self, x: u32) -> u32 {
        // Safety: the borrow keeps the page alive, locked, and unwritten.
        unsafe { (self.f)(x) }
    }
}

/// A jitted 64-bit mixer, valid while the page stays locked.
#[derive(Clone, Copy)]
pub struct MixFn64<'a> {
    f: unsafe extern "sysv64" fn(u64) -> u64,
    _page: PhantomData<&'a ExecPage>,
}

impl MixFn64<'_> {
    /// Run the mixer.
    #[inline]
    pub fn call(&self, x: u64) -> u64 {
        // Safety: as in `MixFn32::call`.
        unsafe { (self.f)(x) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::{eval32, eval64};
    use bitmix_asm::{Kind, KindSet, Op, Program};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256StarStar;
    use strum::IntoEnumIterator;

    fn jit32(p: &Program, xs: &[u32]) -> Vec<u32> {
        let mut page = ExecPage::new().unwrap();
        page.load(p);
        page.lock().unwrap();
        let f = page.fn32();
        let out = xs.iter().map(|&x| f.call(x)).collect();
        page.unlock().unwrap();
        out
    }

    fn jit64(p: &Program, xs: &[u64]) -> Vec<u64> {
        let mut page = ExecPage::new().unwrap();
        page.load(p);
        page.lock().unwrap();
        let f = page.fn64();
        let out = xs.iter().map(|&x| f.call(x)).collect();
        page.unlock().unwrap();
        out
    }

    #[test]
    fn identity_and_known_mixer() {
        let empty = Program::empty(Width::W32);
        assert_eq!(jit32(&empty, &[0, 1, 0xdead_beef]), vec![0, 1, 0xdead_beef]);

        let p: Program = "32xorr:16,32mul:85ebca6b,32xorr:13,32mul:c2b2ae35,32xorr:16"
            .parse()
            .unwrap();
        assert_eq!(jit32(&p, &[1]), vec![0x514e_28b7]);
    }

    #[test]
    fn matches_interpreter_on_every_kind_32() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0x0dd);
        let xs: Vec<u32> = (0..4096).map(|_| rng.gen()).collect();
        for kind in Kind::iter().filter(|k| k.allowed(Width::W32) && *k != Kind::Sbox) {
            for _ in 0..8 {
                let op = Op::generate(kind, Width::W32, &mut rng);
                let p = Program::new(Width::W32, vec![op]).unwrap();
                let want: Vec<u32> = xs.iter().map(|&x| eval32(p.ops(), x)).collect();
                assert_eq!(jit32(&p, &xs), want, "kind {kind:?} op {op:?}");
            }
        }
    }

    #[test]
    fn matches_interpreter_on_every_kind_64() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0x1dd);
        let xs: Vec<u64> = (0..4096).map(|_| rng.gen()).collect();
        for kind in Kind::iter().filter(|k| k.allowed(Width::W64) && *k != Kind::Sbox) {
            for _ in 0..8 {
                let op = Op::generate(kind, Width::W64, &mut rng);
                let p = Program::new(Width::W64, vec![op]).unwrap();
                let want: Vec<u64> = xs.iter().map(|&x| eval64(p.ops(), x)).collect();
                assert_eq!(jit64(&p, &xs), want, "kind {kind:?} op {op:?}");
            }
        }
    }

    #[test]
    fn matches_interpreter_on_random_programs() {
        let mut rng = Xoshiro256StarStar::seed_from_u64(0x2dd);
        let xs32: Vec<u32> = (0..1024).map(|_| rng.gen()).collect();
        let xs64: Vec<u64> = (0..1024).map(|_| rng.gen()).collect();
        for _ in 0..64 {
            let len = rng.gen_range(1..=12);
            let p = Program::generate_uniform(Width::W32, len, KindSet::empty(), &mut rng);
            let want: Vec<u32> = xs32.iter().map(|&x| eval32(p.ops(), x)).collect();
            assert_eq!(jit32(&p, &xs32), want, "program {p}");

            let p = Program::generate_uniform(Width::W64, len, KindSet::empty(), &mut rng);
            let want: Vec<u64> = xs64.iter().map(|&x| eval64(p.ops(), x)).collect();
            assert_eq!(jit64(&p, &xs64), want, "program {p}");
        }
    }

    #[test]
    fn page_is_reusable_across_candidates() {
        let mut page = ExecPage::new().unwrap();
        let a: Program = "32mul:045d9f3b".parse().unwrap();
        let b: Program = "32not".parse().unwrap();
        for _ in 0..4 {
            page.load(&a);
            page.lock().unwrap();
            assert_eq!(page.fn32().call(3), 3u32.wrapping_mul(0x045d_9f3b));
            page.unlock().unwrap();

            page.load(&b);
            page.lock().unwrap();
            assert_eq!(page.fn32().call(3), !3);
            page.unlock().unwrap();
        }
    }

    #[test]
    fn longest_program_fits_the_page() {
        // Adjacency-valid worst case: alternating wide shf/clmul ops.
        let mut ops = Vec::new();
        for i in 0..32 {
            if i % 2 == 0 {
                ops.push(Op::Shf(0x0001_0203_0405_0607));
            } else {
                ops.push(Op::Clmul(0x9e37_79b9_7f4a_7c15));
            }
        }
        let p = Program::new(Width::W64, ops).unwrap();
        let mut page = ExecPage::new().unwrap();
        page.load(&p); // must not assert
        page.lock().unwrap();
        let f = page.fn64();
        assert_eq!(f.call(0), 0);
        page.unlock().unwrap();
    }
}
