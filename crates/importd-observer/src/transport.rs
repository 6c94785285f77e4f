use std::time::Duration;

use async_trait::async_trait;
use importd_common::{
    error::{ImportError, Result},
    types::{ControlAction, NONCE_HEADER},
};
use importd_job::{ControlOutcome, ImportService, KickstartAck, ProgressResponse};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use url::Url;

/// The observer's view of the import service.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get_progress(&self, job_id: &str) -> Result<ProgressResponse>;
    async fn ping(&self, job_id: &str) -> Result<()>;
    async fn kickstart(&self, job_id: &str) -> Result<KickstartAck>;
    async fn control(&self, job_id: &str, action: ControlAction) -> Result<ControlOutcome>;
}

/// Calls the service directly, for embedding and tests.
pub struct LocalTransport {
    service: ImportService,
}

impl LocalTransport {
    pub fn new(service: ImportService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl FeedTransport for LocalTransport {
    async fn get_progress(&self, job_id: &str) -> Result<ProgressResponse> {
        self.service.get_progress(job_id).await
    }

    async fn ping(&self, job_id: &str) -> Result<()> {
        self.service.ping(job_id).await
    }

    async fn kickstart(&self, job_id: &str) -> Result<KickstartAck> {
        self.service.kickstart(job_id).await
    }

    async fn control(&self, job_id: &str, action: ControlAction) -> Result<ControlOutcome> {
        self.service.control(job_id, action).await
    }
}

#[derive(Debug, Serialize)]
struct ControlRequest {
    action: ControlAction,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Talks to `importd-api` over HTTP.
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
    nonce: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, nonce: Option<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|err| {
            ImportError::InvalidArgument(format!("invalid service url {base_url}: {err}"))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| {
                ImportError::Transport(format!("failed to create observer client: {err}"))
            })?;
        Ok(Self {
            base,
            client,
            nonce,
        })
    }

    fn job_url(&self, job_id: &str, operation: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ImportError::InvalidArgument(format!("service url cannot be a base: {}", self.base))
            })?
            .pop_if_empty()
            .extend(["import", "v1", "jobs", job_id, operation]);
        Ok(url)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.nonce {
            Some(nonce) => builder.header(NONCE_HEADER, nonce),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder) -> Result<T> {
        let response = builder
            .send()
            .await
            .map_err(|err| ImportError::Transport(format!("request failed: {err}")))?;
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| ImportError::Transport(format!("malformed response body: {err}")));
        }

        let body = response.json::<ErrorBody>().await.ok();
        Err(match body {
            Some(body) if body.code == "NoSuchJob" => ImportError::JobNotFound(body.message),
            Some(body) if body.code == "InvalidArgument" => {
                ImportError::InvalidArgument(body.message)
            }
            Some(body) => ImportError::Transport(format!("{status}: {}", body.message)),
            None => ImportError::Transport(format!("service returned status {status}")),
        })
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get_progress(&self, job_id: &str) -> Result<ProgressResponse> {
        let url = self.job_url(job_id, "progress")?;
        self.send(self.request(reqwest::Method::GET, url)).await
    }

    async fn ping(&self, job_id: &str) -> Result<()> {
        let url = self.job_url(job_id, "ping")?;
        let _: serde_json::Value = self.send(self.request(reqwest::Method::POST, url)).await?;
        Ok(())
    }

    async fn kickstart(&self, job_id: &str) -> Result<KickstartAck> {
        let url = self.job_url(job_id, "kickstart")?;
        self.send(self.request(reqwest::Method::POST, url)).await
    }

    async fn control(&self, job_id: &str, action: ControlAction) -> Result<ControlOutcome> {
        let url = self.job_url(job_id, "control")?;
        self.send(
            self.request(reqwest::Method::POST, url)
                .json(&ControlRequest { action }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn job_urls_are_nested_under_api_prefix() {
        let transport = HttpTransport::new("http://127.0.0.1:9300", None, TIMEOUT).unwrap();
        assert_eq!(
            transport.job_url("j-1", "progress").unwrap().as_str(),
            "http://127.0.0.1:9300/import/v1/jobs/j-1/progress"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        assert!(HttpTransport::new("mailto:ops@example.com", None, TIMEOUT)
            .unwrap()
            .job_url("j-1", "ping")
            .is_err());
    }

    #[tokio::test]
    async fn unresponsive_service_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });

        let transport =
            HttpTransport::new(&format!("http://{addr}"), None, Duration::from_millis(200))
                .unwrap();
        let result =
            tokio::time::timeout(Duration::from_secs(5), transport.get_progress("j-1")).await;
        assert!(matches!(result, Ok(Err(ImportError::Transport(_)))));

        let result = tokio::time::timeout(Duration::from_secs(5), transport.ping("j-1")).await;
        assert!(matches!(result, Ok(Err(ImportError::Transport(_)))));
        server.abort();
    }

    #[test]
    fn control_request_uses_lowercase_action() {
        let body = serde_json::to_value(ControlRequest {
            action: ControlAction::Resume,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "action": "resume" }));
    }
}
