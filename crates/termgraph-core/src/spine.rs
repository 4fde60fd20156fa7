//! SpineStore: a concurrent, monotonically-growing sparse array.
//!
//! Indices are split into fixed-size segments ("spines"):
//!
//! - `spine  = index / spine_size`
//! - `offset = index % spine_size`
//!
//! The spine directory is a `DashMap`, so the first writer to touch a range
//! creates its spine through `entry().or_insert_with(..)` and every racing
//! writer converges on that same instance. Each slot carries its own lock,
//! which makes reads, writes and `accumulate_and_get` atomic per slot without
//! any store-wide lock.
//!
//! `for_each` is weakly consistent: it may or may not observe writes racing
//! with the scan, but it never sees a torn slot and always walks indices in
//! ascending order.

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::error::{CoreError, Result};

pub const DEFAULT_SPINE_SIZE: usize = 1024;

struct Spine<T> {
    slots: Box<[RwLock<Option<T>>]>,
}

impl<T> Spine<T> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| RwLock::new(None)).collect(),
        }
    }
}

pub struct SpineStore<T> {
    spine_size: usize,
    spines: DashMap<usize, Arc<Spine<T>>>,
    /// Highest spine number ever created; `-1` while empty. Only increases.
    highest_spine: AtomicI64,
    populated: AtomicUsize,
}

impl<T: Clone> SpineStore<T> {
    pub fn new() -> Self {
        Self::with_spine_size(DEFAULT_SPINE_SIZE)
    }

    /// Create a store with a custom segment size. A zero size is bumped to 1.
    pub fn with_spine_size(spine_size: usize) -> Self {
        Self {
            spine_size: spine_size.max(1),
            spines: DashMap::new(),
            highest_spine: AtomicI64::new(-1),
            populated: AtomicUsize::new(0),
        }
    }

    pub fn spine_size(&self) -> usize {
        self.spine_size
    }

    /// Highest spine number touched so far, if any.
    pub fn highest_spine(&self) -> Option<usize> {
        let highest = self.highest_spine.load(Ordering::Acquire);
        usize::try_from(highest).ok()
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.populated.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn locate(&self, index: i64) -> Result<(usize, usize)> {
        let idx = usize::try_from(index).map_err(|_| CoreError::InvalidIndex { index })?;
        Ok((idx / self.spine_size, idx % self.spine_size))
    }

    fn existing_spine(&self, spine: usize) -> Option<Arc<Spine<T>>> {
        self.spines.get(&spine).map(|s| Arc::clone(s.value()))
    }

    /// Every writer bumps `highest_spine` before writing, including writers
    /// that found the spine already created, so a finished write is never
    /// past the highest spine a later scan walks to.
    fn spine_for_write(&self, spine: usize) -> Arc<Spine<T>> {
        let found = match self.existing_spine(spine) {
            Some(existing) => existing,
            None => Arc::clone(
                self.spines
                    .entry(spine)
                    .or_insert_with(|| Arc::new(Spine::new(self.spine_size)))
                    .value(),
            ),
        };
        self.highest_spine.fetch_max(spine as i64, Ordering::AcqRel);
        found
    }

    pub fn put(&self, index: i64, value: T) -> Result<()> {
        let (spine, offset) = self.locate(index)?;
        let spine = self.spine_for_write(spine);
        let previous = spine.slots[offset].write().replace(value);
        if previous.is_none() {
            self.populated.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    pub fn get(&self, index: i64) -> Result<Option<T>> {
        let (spine, offset) = self.locate(index)?;
        Ok(self
            .existing_spine(spine)
            .and_then(|s| s.slots[offset].read().clone()))
    }

    pub fn contains_key(&self, index: i64) -> Result<bool> {
        let (spine, offset) = self.locate(index)?;
        Ok(self
            .existing_spine(spine)
            .is_some_and(|s| s.slots[offset].read().is_some()))
    }

    /// Atomically combine `value` into the slot and return the new contents.
    ///
    /// An empty slot simply takes `value`; otherwise the slot becomes
    /// `combiner(&current, value)`. The slot lock is held across the whole
    /// read-modify-write, so concurrent accumulations never lose an update.
    pub fn accumulate_and_get<F>(&self, index: i64, value: T, combiner: F) -> Result<T>
    where
        F: FnOnce(&T, T) -> T,
    {
        let (spine, offset) = self.locate(index)?;
        let spine = self.spine_for_write(spine);
        let mut slot = spine.slots[offset].write();
        let next = match slot.as_ref() {
            Some(current) => combiner(current, value),
            None => {
                self.populated.fetch_add(1, Ordering::AcqRel);
                value
            }
        };
        *slot = Some(next.clone());
        Ok(next)
    }

    /// Visit every populated slot in strictly ascending index order.
    pub fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(i64, T),
    {
        let Some(highest) = self.highest_spine() else {
            return;
        };
        for spine_no in 0..=highest {
            let Some(spine) = self.existing_spine(spine_no) else {
                continue;
            };
            let base = spine_no * self.spine_size;
            for (offset, slot) in spine.slots.iter().enumerate() {
                let value = slot.read().clone();
                if let Some(value) = value {
                    visitor((base + offset) as i64, value);
                }
            }
        }
    }

    /// Collect the populated indices (ascending).
    pub fn indices(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|index, _| out.push(index));
        out
    }
}

impl<T: Clone> Default for SpineStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
