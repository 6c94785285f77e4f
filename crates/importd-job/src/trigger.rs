use std::time::Duration;

use async_trait::async_trait;
use importd_common::{
    error::{ImportError, Result},
    types::NONCE_HEADER,
};
use tracing::debug;
use url::Url;

use crate::worker::ImportWorker;

/// Whatever actually makes the worker run: an in-process call, an HTTP hop to a
/// worker endpoint, a cron hook. Callers treat it as fire-and-forget.
#[async_trait]
pub trait WorkerTrigger: Send + Sync {
    async fn invoke(&self, job_id: &str) -> Result<()>;
}

pub struct LocalWorkerTrigger {
    worker: ImportWorker,
}

impl LocalWorkerTrigger {
    pub fn new(worker: ImportWorker) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl WorkerTrigger for LocalWorkerTrigger {
    async fn invoke(&self, job_id: &str) -> Result<()> {
        let tick = self.worker.run_once(job_id).await?;
        debug!(job_id = %job_id, tick = ?tick, "local worker invocation finished");
        Ok(())
    }
}

/// Posts to `<base>/import/v1/jobs/<id>/run` on a remote worker.
///
/// Every request is bounded by `timeout`; the keepalive holds the job's claim
/// until the request returns.
pub struct HttpWorkerTrigger {
    base: Url,
    client: reqwest::Client,
    nonce: Option<String>,
}

impl HttpWorkerTrigger {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(endpoint).map_err(|err| {
            ImportError::InvalidArgument(format!("invalid worker endpoint {endpoint}: {err}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                ImportError::Transport(format!("failed to create worker client: {err}"))
            })?;
        Ok(Self {
            base,
            client,
            nonce: None,
        })
    }

    pub fn with_nonce(mut self, nonce: Option<String>) -> Self {
        self.nonce = nonce;
        self
    }

    fn run_url(&self, job_id: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ImportError::InvalidArgument(format!(
                    "worker endpoint cannot be a base url: {}",
                    self.base
                ))
            })?
            .pop_if_empty()
            .extend(["import", "v1", "jobs", job_id, "run"]);
        Ok(url)
    }
}

#[async_trait]
impl WorkerTrigger for HttpWorkerTrigger {
    async fn invoke(&self, job_id: &str) -> Result<()> {
        let url = self.run_url(job_id)?;
        let mut request = self.client.post(url.clone());
        if let Some(nonce) = &self.nonce {
            request = request.header(NONCE_HEADER, nonce);
        }
        let response = request.send().await.map_err(|err| {
            ImportError::Transport(format!("failed to invoke worker at {url}: {err}"))
        })?;

        if !response.status().is_success() {
            return Err(ImportError::Transport(format!(
                "worker endpoint {url} returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn run_url_appends_job_segments() {
        let trigger = HttpWorkerTrigger::new("http://worker.local:9100/", TIMEOUT).unwrap();
        assert_eq!(
            trigger.run_url("abc-123").unwrap().as_str(),
            "http://worker.local:9100/import/v1/jobs/abc-123/run"
        );

        let nested = HttpWorkerTrigger::new("http://worker.local/hooks", TIMEOUT).unwrap();
        assert_eq!(
            nested.run_url("abc").unwrap().as_str(),
            "http://worker.local/hooks/import/v1/jobs/abc/run"
        );
    }

    #[test]
    fn rejects_unparseable_endpoint() {
        assert!(HttpWorkerTrigger::new("not a url", TIMEOUT).is_err());
    }
}
