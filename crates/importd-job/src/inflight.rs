use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};

use importd_common::types::JobId;

/// Job ids with an invocation currently running. A claim is released on drop.
#[derive(Debug, Clone, Default)]
pub(crate) struct InFlightSet {
    ids: Arc<Mutex<HashSet<JobId>>>,
}

impl InFlightSet {
    pub(crate) fn try_claim(&self, job_id: &str) -> Option<InFlightClaim> {
        let inserted = match self.ids.lock() {
            Ok(mut guard) => guard.insert(job_id.to_string()),
            Err(poisoned) => poisoned.into_inner().insert(job_id.to_string()),
        };
        inserted.then(|| InFlightClaim {
            ids: Arc::clone(&self.ids),
            job_id: job_id.to_string(),
        })
    }

    pub(crate) fn contains(&self, job_id: &str) -> bool {
        match self.ids.lock() {
            Ok(guard) => guard.contains(job_id),
            Err(poisoned) => poisoned.into_inner().contains(job_id),
        }
    }
}

#[derive(Debug)]
pub(crate) struct InFlightClaim {
    ids: Arc<Mutex<HashSet<JobId>>>,
    job_id: JobId,
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        match self.ids.lock() {
            Ok(mut guard) => {
                guard.remove(&self.job_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.job_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive_until_dropped() {
        let set = InFlightSet::default();
        let claim = set.try_claim("job").unwrap();
        assert!(set.try_claim("job").is_none());
        assert!(set.try_claim("other").is_some());
        drop(claim);
        assert!(!set.contains("job"));
        assert!(set.try_claim("job").is_some());
    }
}
