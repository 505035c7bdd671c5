//! One-shot initialization lifecycle shared by every telemetry coordinator

use std::sync::atomic::{AtomicU8, Ordering};

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

/// Lifecycle of a process-wide telemetry component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    Initializing,
    Ready,
}

/// Compare-and-set guarded lifecycle cell.
///
/// Exactly one caller can move the cell out of `Uninitialized` (or out of
/// `Ready` when forcing). Concurrent callers observe `Initializing` and back
/// off instead of running the setup twice.
#[derive(Debug)]
pub struct InitCell {
    state: AtomicU8,
}

impl InitCell {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNINITIALIZED),
        }
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => Lifecycle::Uninitialized,
            INITIALIZING => Lifecycle::Initializing,
            _ => Lifecycle::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle() == Lifecycle::Ready
    }

    /// Claims the cell for (re)initialization.
    ///
    /// Returns `None` when the cell is ready and `force` is false, or when
    /// another caller currently holds it.
    pub fn begin(&self, force: bool) -> Option<InitTicket<'_>> {
        if self.transition(UNINITIALIZED) {
            return Some(InitTicket::new(self, UNINITIALIZED));
        }

        if force && self.transition(READY) {
            return Some(InitTicket::new(self, READY));
        }

        None
    }

    fn transition(&self, from: u8) -> bool {
        self.state
            .compare_exchange(from, INITIALIZING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for InitCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive claim on an [`InitCell`].
///
/// Dropping the ticket without calling [`InitTicket::complete`] rolls the
/// cell back to the state it was claimed from.
#[derive(Debug)]
pub struct InitTicket<'a> {
    cell: &'a InitCell,
    previous: u8,
    completed: bool,
}

impl<'a> InitTicket<'a> {
    fn new(cell: &'a InitCell, previous: u8) -> Self {
        Self {
            cell,
            previous,
            completed: false,
        }
    }

    /// True when this claim re-runs an already completed initialization
    pub fn is_reinitialization(&self) -> bool {
        self.previous == READY
    }

    pub fn complete(mut self) {
        self.cell.state.store(READY, Ordering::Release);
        self.completed = true;
    }
}

impl Drop for InitTicket<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.cell.state.store(self.previous, Ordering::Release);
        }
    }
}
