//! Externally compiled mixers.
//!
//! A shared object exporting a sysv64 `hash` symbol of matching arity is
//! treated as an opaque mixer. The raw function pointer is copied out of
//! the loaded symbol so evaluator workers can call it in parallel; the
//! handle borrows the library to keep it mapped.

use std::marker::PhantomData;
use std::path::Path;

use libloading::Library;

use crate::Error;

/// An open mixer library.
pub struct MixerLib {
    lib: Library,
}

/// A loaded 32-bit mixer.
#[derive(Clone, Copy)]
pub struct Mixer32<'l> {
    f: unsafe extern "sysv64" fn(u32) -> u32,
    _lib: PhantomData<&'l Library>,
}

/// A loaded 64-bit mixer.
#[derive(Clone, Copy)]
pub struct Mixer64<'l> {
    f: unsafe extern "sysv64" fn(u64) -> u64,
    _lib: PhantomData<&'l Library>,
}

/// A loaded `(index, mask, seed) -> word` mixer.
#[derive(Clone, Copy)]
pub struct SeededMixer<'l> {
    f: unsafe extern "sysv64" fn(u64, u64, u64) -> u64,
    _lib: PhantomData<&'l Library>,
}

impl MixerLib {
    /// Open a shared object.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MixerLib, Error> {
        // Safety: loading runs the library's initializers; the caller
        // hands over a mixer object on purpose.
        let lib = unsafe { Library::new(path.as_ref()) }?;
        Ok(MixerLib { lib })
    }

    /// Resolve `hash` as a 32-bit mixer.
    pub fn mixer32(&self) -> Result<Mixer32<'_>, Error> {
        // Safety: the symbol is declared with the sysv64 one-in-one-out
        // ABI this tool documents for loaded mixers.
        let sym = unsafe {
            self.lib
                .get::<unsafe extern "sysv64" fn(u32) -> u32>(b"hash\0")
        }?;
        Ok(Mixer32 {
            f: *sym,
            _lib: PhantomData,
        })
    }

    /// Resolve `hash` as a 64-bit mixer.
    pub fn mixer64(&self) -> Result<Mixer64<'_>, Error> {
        // Safety: as in `mixer32`.
        let sym = unsafe {
            self.lib
                .get::<unsafe extern "sysv64" fn(u64) -> u64>(b"hash\0")
        }?;
        Ok(Mixer64 {
            f: *sym,
            _lib: PhantomData,
        })
    }

    /// Resolve `hash` as a seed-sensitive mixer.
    pub fn seeded(&self) -> Result<SeededMixer<'_>, Error> {
        // Safety: as in `mixer32`.
        let sym = unsafe {
            self.lib
                .get::<unsafe extern "sysv64" fn(u64, u64, u64) -> u64>(b"hash\0")
        }?;
        Ok(SeededMixer {
            f: *sym,
            _lib: PhantomData,
        })
    }
}

impl Mixer32<'_> {
    /// Run the mixer.
    #[inline]
    pub fn call(&self, x: u32) -> u32 {
        // Safety: the borrow keeps the library mapped.
        unsafe { (self.f)(x) }
    }
}

impl Mixer64<'_> {
    /// Run the mixer.
    #[inline]
    pub fn call(&self, x: u64) -> u64 {
        // Safety: as in `Mixer32::call`.
        unsafe { (self.f)(x) }
    }
}

impl SeededMixer<'_> {
    /// Run the mixer.
    #[inline]
    pub fn call(&self, index: u64, mask: u64, seed: u64) -> u64 {
        // Safety: as in `Mixer32::call`.
        unsafe { (self.f)(index, mask, seed) }
    }
}
