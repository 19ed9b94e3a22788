//! Per-connection memory accounting.
//!
//! A [`MemoryTracker`] counts the bytes a connection pins (open transactions,
//! buffered records). Every reservation is a [`MemoryReservation`] guard, so
//! whatever scope took the memory gives it back when it ends, whether it
//! ended in success, failure or a RESET.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::bolt::{BoltError, BoltResult};

#[derive(Debug)]
struct TrackerState {
    used: AtomicUsize,
    peak: AtomicUsize,
    limit: Option<usize>,
}

/// Byte accounting for one connection.
#[derive(Debug, Clone)]
pub struct MemoryTracker {
    inner: Arc<TrackerState>,
}

impl MemoryTracker {
    /// Create a tracker. `None` means unlimited.
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            inner: Arc::new(TrackerState {
                used: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                limit,
            }),
        }
    }

    /// Tracker without a limit.
    pub fn unlimited() -> Self {
        Self::new(None)
    }

    /// Bytes currently reserved.
    pub fn used(&self) -> usize {
        self.inner.used.load(Ordering::Acquire)
    }

    /// Highest value `used` has reached.
    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::Acquire)
    }

    /// Configured limit.
    pub fn limit(&self) -> Option<usize> {
        self.inner.limit
    }

    /// Reserve `bytes`, failing with `ResourceExhausted` past the limit.
    pub fn try_reserve(&self, bytes: usize) -> BoltResult<MemoryReservation> {
        self.inner.acquire(bytes)?;
        Ok(MemoryReservation {
            tracker: Arc::clone(&self.inner),
            bytes,
        })
    }
}

impl TrackerState {
    fn acquire(&self, bytes: usize) -> BoltResult<()> {
        let limit = self.limit;
        let previous = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                let next = used.checked_add(bytes)?;
                match limit {
                    Some(max) if next > max => None,
                    _ => Some(next),
                }
            })
            .map_err(|used| {
                BoltError::resource_exhausted(format!(
                    "Connection memory limit exceeded: {} bytes in use, {} requested, limit {}",
                    used,
                    bytes,
                    limit.unwrap_or(usize::MAX)
                ))
            })?;
        self.peak.fetch_max(previous + bytes, Ordering::AcqRel);
        Ok(())
    }

    fn release(&self, bytes: usize) {
        let previous = self.used.fetch_sub(bytes, Ordering::AcqRel);
        debug_assert!(previous >= bytes, "memory tracker underflow");
    }
}

/// Reserved bytes, released on drop.
#[derive(Debug)]
pub struct MemoryReservation {
    tracker: Arc<TrackerState>,
    bytes: usize,
}

impl MemoryReservation {
    /// Bytes held by this reservation.
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Reserve `bytes` more under the same guard.
    pub fn grow(&mut self, bytes: usize) -> BoltResult<()> {
        self.tracker.acquire(bytes)?;
        self.bytes += bytes;
        Ok(())
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.tracker.release(self.bytes);
    }
}
