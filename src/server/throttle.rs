//! Inbound flow control
//!
//! The network side calls `begin_job` for every message it hands over and the
//! worker calls `end_job` when one finishes. Reading stops once pending jobs
//! exceed the high watermark and restarts when they fall to the low watermark.
//!
//! The counter and the suspended flag change under one lock, so the two call
//! sites can interleave without leaving a suspended gate with a low counter.

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::bolt::{BoltError, BoltResult};

#[derive(Debug, Default)]
struct ThrottleState {
    in_flight: usize,
    suspended: bool,
    closed: bool,
    suspensions: u64,
    resumptions: u64,
}

// ============================================================================
// InboundThrottle
// ============================================================================

/// Read gate driven by the number of pending jobs
#[derive(Debug)]
pub struct InboundThrottle {
    /// Suspend above this
    high: usize,
    /// Resume at or below this
    low: usize,
    state: Mutex<ThrottleState>,
    resumed: Notify,
}

impl InboundThrottle {
    /// Create a gate. Requires `high > low`.
    pub fn new(high: usize, low: usize) -> BoltResult<Self> {
        if high <= low {
            return Err(BoltError::configuration(format!(
                "high watermark ({}) must be greater than low watermark ({})",
                high, low
            )));
        }
        Ok(Self {
            high,
            low,
            state: Mutex::new(ThrottleState::default()),
            resumed: Notify::new(),
        })
    }

    /// Signal a new job. Returns `true` if this call suspended reading.
    pub fn begin_job(&self) -> bool {
        let mut state = self.state.lock();
        state.in_flight += 1;
        if !state.suspended && state.in_flight > self.high {
            state.suspended = true;
            state.suspensions += 1;
            tracing::warn!(
                in_flight = state.in_flight,
                high_watermark = self.high,
                "Inbound reading suspended: too many pending jobs"
            );
            return true;
        }
        false
    }

    /// Signal a finished job. Returns `true` if this call resumed reading.
    pub fn end_job(&self) -> bool {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.suspended && state.in_flight <= self.low {
            state.suspended = false;
            state.resumptions += 1;
            tracing::info!(
                in_flight = state.in_flight,
                low_watermark = self.low,
                "Inbound reading resumed"
            );
            drop(state);
            self.resumed.notify_waiters();
            return true;
        }
        false
    }

    /// Close the gate, waking every waiting reader.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.resumed.notify_waiters();
    }

    /// Wait until reading is allowed
    ///
    /// Returns at once if the gate is not suspended or has been closed.
    pub async fn wait_until_readable(&self) {
        loop {
            // notify_waiters only wakes existing Notified futures, so create it before the check
            let resumed = self.resumed.notified();
            {
                let state = self.state.lock();
                if !state.suspended || state.closed {
                    return;
                }
            }
            resumed.await;
        }
    }

    /// Pending jobs
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Whether reading is suspended
    pub fn is_suspended(&self) -> bool {
        self.state.lock().suspended
    }

    /// Total suspensions
    pub fn suspensions(&self) -> u64 {
        self.state.lock().suspensions
    }

    /// Total resumptions
    pub fn resumptions(&self) -> u64 {
        self.state.lock().resumptions
    }
}
