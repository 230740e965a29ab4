use crate::error::DbError;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds how many callers may be inside the pool at once, checked out or queued.
///
/// The pool itself queues waiters without limit. When a bound is configured, the
/// caller past `max_connections + max_waiting` is turned away immediately instead
/// of joining the queue.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    slots: Option<Arc<Semaphore>>,
    capacity: usize,
}

/// Held for the duration of one pooled operation. Dropping it frees the slot.
#[derive(Debug)]
pub struct Admission {
    _permit: Option<OwnedSemaphorePermit>,
}

impl AdmissionGate {
    /// A gate that admits everyone.
    pub fn unbounded() -> Self {
        Self {
            slots: None,
            capacity: usize::MAX,
        }
    }

    pub fn bounded(max_connections: u32, max_waiting: usize) -> Self {
        let capacity = (max_connections as usize)
            .saturating_add(max_waiting)
            .min(Semaphore::MAX_PERMITS);
        Self {
            slots: Some(Arc::new(Semaphore::new(capacity))),
            capacity,
        }
    }

    pub fn new(max_connections: u32, max_waiting: Option<usize>) -> Self {
        match max_waiting {
            Some(waiting) => Self::bounded(max_connections, waiting),
            None => Self::unbounded(),
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.slots.is_some()
    }

    /// Claims a slot without waiting.
    pub fn enter(&self) -> Result<Admission, DbError> {
        let Some(slots) = &self.slots else {
            return Ok(Admission { _permit: None });
        };

        let permit = Arc::clone(slots)
            .try_acquire_owned()
            .map_err(|_| DbError::Saturated {
                admitted: self.capacity,
            })?;

        Ok(Admission {
            _permit: Some(permit),
        })
    }
}
