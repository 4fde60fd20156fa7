//! Cooperative cancellation and progress accounting for long scans.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{CoreError, Result};

/// Shared cancel flag, checked between node iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(CoreError::Canceled)
        } else {
            Ok(())
        }
    }
}

/// Work units completed out of a total budget.
#[derive(Debug, Default)]
pub struct Progress {
    total: AtomicU64,
    completed: AtomicU64,
}

impl Progress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over with a new budget.
    pub fn reset(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
    }

    pub fn tick(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::Relaxed);
    }

    /// Mark the whole budget as done.
    pub fn finish(&self) {
        self.completed
            .store(self.total.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn fraction(&self) -> f64 {
        match self.total() {
            0 => 1.0,
            total => (self.completed() as f64 / total as f64).min(1.0),
        }
    }
}
