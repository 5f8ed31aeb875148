//! Step observers.
//!
//! The control unit keeps no execution history of its own. Front-ends that
//! want a trace register an observer; [`HistoryLog`] is a ready-made one
//! that keeps the most recent steps in a bounded ring.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::cpu::control::StepRecord;
use crate::cpu::execute::CpuError;

/// Trait for observing control-unit events.
pub trait StepObserver: std::fmt::Debug + Send + Sync {
    /// Called after every successful step.
    fn on_step(&self, _record: &StepRecord) {}
    /// Called when a step fails. `pc` is the address of the failing instruction.
    fn on_error(&self, _pc: u32, _error: &CpuError) {}
    /// Called after the machine is reset.
    fn on_reset(&self) {}
}

/// Keeps the last `capacity` step records.
#[derive(Debug)]
pub struct HistoryLog {
    capacity: usize,
    entries: Mutex<VecDeque<StepRecord>>,
}

impl HistoryLog {
    /// Create a log holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Maximum number of records kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy of the retained records, oldest first.
    pub fn entries(&self) -> Vec<StepRecord> {
        self.lock().iter().cloned().collect()
    }

    /// The most recent record.
    pub fn last(&self) -> Option<StepRecord> {
        self.lock().back().cloned()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<StepRecord>> {
        // A panic elsewhere cannot leave the deque half-updated
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl StepObserver for HistoryLog {
    fn on_step(&self, record: &StepRecord) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(record.clone());
    }

    fn on_reset(&self) {
        self.clear();
    }
}
