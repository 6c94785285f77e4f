pub mod handlers;
pub mod middleware;
pub mod router;
pub mod types;

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use importd_job::ImportService;

#[derive(Clone)]
pub struct ImportSys {
    service: ImportService,
    nonce: Option<Arc<str>>,
    started_at: Instant,
    boot_time: DateTime<Utc>,
}

impl ImportSys {
    pub fn new(service: ImportService) -> Self {
        Self {
            service,
            nonce: None,
            started_at: Instant::now(),
            boot_time: Utc::now(),
        }
    }

    /// Requires every job route to carry this nonce. Empty values disable the check.
    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(Arc::from);
        self
    }

    pub fn service(&self) -> &ImportService {
        &self.service
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn boot_time(&self) -> DateTime<Utc> {
        self.boot_time
    }
}
