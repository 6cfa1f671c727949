//! Connection budgets shared between the work queue and running workers.
//!
//! Each file and each host has one budget; a task is admitted only while
//! both have a free slot, so one large file cannot occupy every worker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Atomic counter of connections in use against a fixed maximum.
#[derive(Debug)]
pub struct ConnectionBudget {
    max: usize,
    in_use: AtomicUsize,
}

impl ConnectionBudget {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            max: max.max(1),
            in_use: AtomicUsize::new(0),
        })
    }

    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.max.saturating_sub(self.in_use())
    }

    /// Reserves one slot if available. The slot is released when the guard drops.
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.reserve(1, |current| current < self.max)
    }

    /// Reserves every slot, only when none is in use.
    pub fn try_acquire_exclusive(self: &Arc<Self>) -> Option<SlotGuard> {
        self.reserve(self.max, |current| current == 0)
    }

    fn reserve(self: &Arc<Self>, n: usize, admit: impl Fn(usize) -> bool) -> Option<SlotGuard> {
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            if !admit(current) {
                return None;
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + n,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Some(SlotGuard {
                        budget: Arc::clone(self),
                        n,
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }
}

/// Reserved slots; released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    budget: Arc<ConnectionBudget>,
    n: usize,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.budget.in_use.fetch_sub(self.n, Ordering::AcqRel);
    }
}
