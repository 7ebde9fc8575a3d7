//! Worker slots shared by all tasks of one manager.
//!
//! A task holds one slot from dispatch until its terminal callback; tasks
//! admitted while every slot is busy wait in the manager's queue.

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub(crate) struct WorkerSlots {
    /// `None` = unbounded.
    max: Option<usize>,
    in_use: AtomicUsize,
}

impl WorkerSlots {
    pub(crate) fn new(max: Option<usize>) -> Self {
        Self {
            max: max.map(|m| m.max(1)),
            in_use: AtomicUsize::new(0),
        }
    }

    pub(crate) fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// Take a slot if one is free.
    pub(crate) fn try_acquire(&self) -> bool {
        let mut current = self.in_use.load(Ordering::Relaxed);
        loop {
            if let Some(max) = self.max {
                if current >= max {
                    return false;
                }
            }
            match self.in_use.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn release(&self) {
        let _ = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |n| n.checked_sub(1));
    }
}
