//! In-process registry of request ids with a run in progress.
//!
//! The attempt lease guards across processes; this registry additionally
//! rejects a duplicate arriving at the same process before the lease is
//! even read.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::domain::RequestId;

#[derive(Debug, Default)]
pub(super) struct InFlightRequests {
    active: Mutex<HashSet<RequestId>>,
}

impl InFlightRequests {
    /// Register `request_id`, returning `None` when it is already running.
    pub(super) fn try_claim(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<InFlightGuard<'_>>, String> {
        let mut active = self
            .active
            .lock()
            .map_err(|_| "in-flight registry poisoned".to_owned())?;
        if !active.insert(request_id.clone()) {
            return Ok(None);
        }
        Ok(Some(InFlightGuard {
            registry: self,
            request_id: request_id.clone(),
        }))
    }

    #[cfg(test)]
    pub(super) fn len(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Releases the request id on every exit path, including panics and
/// dropped futures.
#[derive(Debug)]
pub(super) struct InFlightGuard<'a> {
    registry: &'a InFlightRequests,
    request_id: RequestId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_guard_drops() {
        let registry = InFlightRequests::default();
        let id = RequestId::random();

        let guard = registry.try_claim(&id).expect("registry usable");
        assert!(guard.is_some());
        assert!(registry.try_claim(&id).expect("registry usable").is_none());

        drop(guard);
        assert_eq!(registry.len(), 0);
        assert!(registry.try_claim(&id).expect("registry usable").is_some());
    }

    #[test]
    fn distinct_ids_do_not_contend() {
        let registry = InFlightRequests::default();
        let first = registry.try_claim(&RequestId::random()).expect("usable");
        let second = registry.try_claim(&RequestId::random()).expect("usable");
        assert!(first.is_some() && second.is_some());
        assert_eq!(registry.len(), 2);
    }
}
