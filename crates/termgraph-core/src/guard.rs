//! Versioned guard: optimistic reads validated against a generation counter,
//! with a reader/writer lock to fall back on.
//!
//! The generation is odd while a writer holds the guard and moves forward
//! twice per write section, so a reader that saw an even generation `g` and
//! still sees `g` afterwards knows no write section overlapped its scan.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadToken(u64);

#[derive(Debug, Default)]
pub struct VersionedGuard {
    generation: AtomicU64,
    lock: RwLock<()>,
}

impl VersionedGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// `None` while a writer is inside a write section.
    pub fn try_optimistic_read(&self) -> Option<ReadToken> {
        let generation = self.generation.load(Ordering::SeqCst);
        (generation % 2 == 0).then_some(ReadToken(generation))
    }

    pub fn validate(&self, token: ReadToken) -> bool {
        self.generation.load(Ordering::SeqCst) == token.0
    }

    /// Full read lock: excludes writers for as long as it is held.
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read()
    }

    pub fn write(&self) -> WriteSection<'_> {
        let lock = self.lock.write();
        self.generation.fetch_add(1, Ordering::SeqCst);
        WriteSection {
            _lock: lock,
            generation: &self.generation,
        }
    }
}

pub struct WriteSection<'a> {
    _lock: RwLockWriteGuard<'a, ()>,
    generation: &'a AtomicU64,
}

impl Drop for WriteSection<'_> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}
