//! Interned identifier type backed by a global string pool.
use std::{mem, sync};
use string_interner::{
    backend::BucketBackend, symbol::SymbolU32, StringInterner,
};

/// An interned name. Copyable and cheap to compare; resolves to a
/// `&'static str` in the global pool.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(SymbolU32);

type Pool = StringInterner<BucketBackend>;

fn singleton() -> &'static mut Pool {
    static mut SINGLETON: mem::MaybeUninit<Pool> = mem::MaybeUninit::uninit();
    static ONCE: sync::Once = sync::Once::new();

    // SAFETY:
    // - writing to the singleton is OK because we only do it one time
    // - the ONCE guarantees that SINGLETON is init'ed before assume_init_ref
    unsafe {
        ONCE.call_once(|| {
            SINGLETON.write(Pool::new());
        });
        SINGLETON.assume_init_mut()
    }
}

impl Id {
    /// Intern a string into the global pool.
    pub fn new(s: impl AsRef<str>) -> Self {
        s.as_ref().into()
    }

    /// Resolve this identifier to its string in the global pool.
    pub fn as_str(&self) -> &'static str {
        (*self).into()
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id(singleton().get_or_intern(s))
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id(singleton().get_or_intern(&s))
    }
}

impl From<&String> for Id {
    fn from(s: &String) -> Self {
        Id(singleton().get_or_intern(s))
    }
}

impl From<Id> for &'static str {
    fn from(sym: Id) -> Self {
        singleton().resolve(sym.0).unwrap()
    }
}

impl std::fmt::Debug for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self.as_str(), f)
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self.as_str(), f)
    }
}
