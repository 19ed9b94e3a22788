//! Cooperative interrupts.
//!
//! The network reader bumps the counter the moment it decodes a RESET, long
//! before the worker gets to that RESET. Running jobs poll the flag at their
//! own safe points; the state machine ignores queued work until the matching
//! RESETs have drained the counter back to zero.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Shared count of RESETs that have been seen but not yet processed.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    pending: Arc<AtomicUsize>,
}

impl InterruptHandle {
    /// Create a handle with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal an interrupt. Returns the new pending count.
    pub fn interrupt(&self) -> usize {
        self.pending.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether any interrupt is pending.
    pub fn is_interrupted(&self) -> bool {
        self.pending() > 0
    }

    /// Number of pending interrupts.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Consume one pending interrupt. Returns how many remain.
    ///
    /// Never goes below zero, so a RESET that arrives without a prior
    /// `interrupt()` (a direct caller, a test) is harmless.
    pub fn acknowledge(&self) -> usize {
        match self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_and_acknowledge() {
        let handle = InterruptHandle::new();
        assert!(!handle.is_interrupted());

        assert_eq!(handle.interrupt(), 1);
        assert_eq!(handle.interrupt(), 2);
        assert!(handle.is_interrupted());

        assert_eq!(handle.acknowledge(), 1);
        assert!(handle.is_interrupted());
        assert_eq!(handle.acknowledge(), 0);
        assert!(!handle.is_interrupted());
    }

    #[test]
    fn test_acknowledge_never_underflows() {
        let handle = InterruptHandle::new();
        assert_eq!(handle.acknowledge(), 0);
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn test_shared_between_clones() {
        let reader = InterruptHandle::new();
        let worker = reader.clone();
        std::thread::spawn(move || {
            reader.interrupt();
        })
        .join()
        .unwrap();
        assert!(worker.is_interrupted());
    }
}
