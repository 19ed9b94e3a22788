//! Admission control shared by every connection.
//!
//! The worker asks for a permit before dispatching each substantive message.
//! A refusal is transient: the client gets a retryable FAILURE and the
//! connection stays open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::bolt::BoltError;

use super::config::ServerConfig;

#[derive(Debug)]
struct AdmissionState {
    max_in_flight: usize,
    max_memory: Option<usize>,
    in_flight: AtomicUsize,
    memory: AtomicUsize,
}

/// Server-wide limits on concurrent jobs and the memory they pin.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    inner: Arc<AdmissionState>,
}

/// Which limit refused the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionResource {
    /// Too many jobs in flight
    Jobs,
    /// Memory budget spent
    Memory,
}

/// A refused admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRejection {
    /// Limit that was hit
    pub resource: AdmissionResource,
    /// Value the limit would have reached
    pub requested: usize,
    /// The limit
    pub limit: usize,
}

impl From<AdmissionRejection> for BoltError {
    fn from(rejection: AdmissionRejection) -> Self {
        let what = match rejection.resource {
            AdmissionResource::Jobs => "in-flight jobs",
            AdmissionResource::Memory => "bytes of request memory",
        };
        BoltError::resource_exhausted(format!(
            "Server is overloaded: {} {} requested, limit is {}",
            rejection.requested, what, rejection.limit
        ))
    }
}

/// Admitted work. Dropping it gives the capacity back.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: AdmissionController,
    bytes: usize,
}

impl AdmissionPermit {
    /// Memory accounted to this permit.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl AdmissionController {
    /// Create a controller.
    pub fn new(max_in_flight: usize, max_memory: Option<usize>) -> Self {
        Self {
            inner: Arc::new(AdmissionState {
                max_in_flight,
                max_memory,
                in_flight: AtomicUsize::new(0),
                memory: AtomicUsize::new(0),
            }),
        }
    }

    /// Create a controller from the server configuration.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.max_in_flight_jobs, config.max_memory_bytes)
    }

    /// Admit one job pinning `bytes` of memory.
    pub fn try_admit(&self, bytes: usize) -> Result<AdmissionPermit, AdmissionRejection> {
        let next = self.inner.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        if next > self.inner.max_in_flight {
            self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(AdmissionRejection {
                resource: AdmissionResource::Jobs,
                requested: next,
                limit: self.inner.max_in_flight,
            });
        }

        if let Some(max_memory) = self.inner.max_memory {
            let next_bytes = self
                .inner
                .memory
                .fetch_add(bytes, Ordering::AcqRel)
                .saturating_add(bytes);
            if next_bytes > max_memory {
                self.inner.memory.fetch_sub(bytes, Ordering::AcqRel);
                self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
                return Err(AdmissionRejection {
                    resource: AdmissionResource::Memory,
                    requested: next_bytes,
                    limit: max_memory,
                });
            }
        }

        Ok(AdmissionPermit {
            controller: self.clone(),
            bytes: if self.inner.max_memory.is_some() { bytes } else { 0 },
        })
    }

    /// Jobs currently admitted.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Bytes currently admitted.
    pub fn memory(&self) -> usize {
        self.inner.memory.load(Ordering::Acquire)
    }

    fn release(&self, bytes: usize) {
        let prev = self.inner.in_flight.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "admission in-flight underflow");
        if bytes > 0 {
            let prev_bytes = self.inner.memory.fetch_sub(bytes, Ordering::AcqRel);
            debug_assert!(prev_bytes >= bytes, "admission memory underflow");
        }
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release(self.bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_limit_enforced_and_released() {
        let admission = AdmissionController::new(1, None);

        let permit = admission.try_admit(10).unwrap();
        let rejection = admission.try_admit(10).unwrap_err();
        assert_eq!(rejection.resource, AdmissionResource::Jobs);
        assert_eq!(admission.in_flight(), 1);

        let err: BoltError = rejection.into();
        assert!(!err.is_fatal());
        assert!(err.is_retryable());

        drop(permit);
        assert_eq!(admission.in_flight(), 0);
        assert!(admission.try_admit(10).is_ok());
    }

    #[test]
    fn test_memory_budget() {
        let admission = AdmissionController::new(10, Some(100));

        let first = admission.try_admit(80).unwrap();
        assert_eq!(first.bytes(), 80);
        let rejection = admission.try_admit(30).unwrap_err();
        assert_eq!(rejection.resource, AdmissionResource::Memory);
        assert_eq!(rejection.requested, 110);
        // the refused job does not hold a slot
        assert_eq!(admission.in_flight(), 1);
        assert_eq!(admission.memory(), 80);

        drop(first);
        assert_eq!(admission.memory(), 0);
        assert!(admission.try_admit(100).is_ok());
    }

    #[test]
    fn test_without_memory_budget() {
        let admission = AdmissionController::new(2, None);
        let permit = admission.try_admit(usize::MAX).unwrap();
        assert_eq!(permit.bytes(), 0);
        assert_eq!(admission.memory(), 0);
    }

    #[test]
    fn test_from_config() {
        let config = ServerConfig::builder()
            .with_max_in_flight_jobs(1)
            .with_max_memory(64)
            .build()
            .unwrap();
        let admission = AdmissionController::from_config(&config);
        let _permit = admission.try_admit(64).unwrap();
        assert!(admission.try_admit(0).is_err());
    }
}
