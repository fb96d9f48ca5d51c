use std::collections::{HashMap, HashSet};
use std::time::Duration;

use reqwest::Client;
use serde::de::IgnoredAny;

use super::error::ComfyError;
use super::types::{HistoryEntry, JobHandle, OutputReference, SubmitResponse, SystemStats};
use crate::workflow::JobDescriptor;

/// Read access to the server's recorded job history.
#[allow(async_fn_in_trait)]
pub trait HistorySource {
    /// `Ok(None)` while the server has no entry for `job_id` yet.
    async fn history(&self, job_id: &str) -> Result<Option<HistoryEntry>, ComfyError>;
}

/// Downloads an output file through `/view`.
#[allow(async_fn_in_trait)]
pub trait ArtifactDownloader {
    async fn download(&self, reference: &OutputReference) -> Result<Vec<u8>, ComfyError>;
}

/// HTTP client for one generation server.
#[derive(Debug, Clone)]
pub struct ComfyClient {
    client: Client,
    base_url: String,
}

impl ComfyClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ComfyError> {
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Push-channel URL for `client_id`: the base URL with a `ws`/`wss` scheme.
    pub fn ws_url(&self, client_id: &str) -> String {
        let rest = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{rest}/ws?clientId={client_id}")
    }

    /// `POST /prompt`. The descriptor is only borrowed.
    pub async fn submit(
        &self,
        descriptor: &JobDescriptor,
        client_id: &str,
    ) -> Result<JobHandle, ComfyError> {
        let url = format!("{}/prompt", self.base_url);
        let body = serde_json::json!({
            "prompt": descriptor,
            "client_id": client_id,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ComfyError::from_request(&self.base_url, e))?;
        let submitted: SubmitResponse = Self::parse_response(response).await?;

        if submitted
            .node_errors
            .as_object()
            .is_some_and(|errors| !errors.is_empty())
        {
            tracing::warn!(prompt_id = %submitted.prompt_id, node_errors = %submitted.node_errors, "server reported node warnings");
        }

        Ok(JobHandle {
            id: submitted.prompt_id,
            client_id: client_id.to_string(),
            queue_number: submitted.number,
        })
    }

    /// `GET /history/{id}`; the server answers `{}` until the job has an entry.
    pub async fn history(&self, job_id: &str) -> Result<Option<HistoryEntry>, ComfyError> {
        let url = format!("{}/history/{}", self.base_url, job_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ComfyError::from_request(&self.base_url, e))?;
        let mut entries: HashMap<String, HistoryEntry> = Self::parse_response(response).await?;
        Ok(entries.remove(job_id))
    }

    /// `GET /view?filename&subfolder&type`.
    pub async fn view(&self, reference: &OutputReference) -> Result<Vec<u8>, ComfyError> {
        let url = format!("{}/view", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("filename", reference.filename.as_str()),
                ("subfolder", reference.subfolder.as_str()),
                ("type", reference.kind.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ComfyError::from_request(&self.base_url, e))?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// `GET /system_stats`; also serves as the readiness probe.
    pub async fn system_stats(&self) -> Result<SystemStats, ComfyError> {
        let url = format!("{}/system_stats", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ComfyError::from_request(&self.base_url, e))?;
        Self::parse_response(response).await
    }

    /// `GET /object_info`, reduced to the node types the server can run.
    pub async fn object_info(&self) -> Result<HashSet<String>, ComfyError> {
        let url = format!("{}/object_info", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ComfyError::from_request(&self.base_url, e))?;
        let nodes: HashMap<String, IgnoredAny> = Self::parse_response(response).await?;
        Ok(nodes.into_keys().collect())
    }

    /// `GET /models/{kind}`, e.g. `checkpoints`, `loras`, `vae`.
    pub async fn models(&self, kind: &str) -> Result<Vec<String>, ComfyError> {
        let url = format!("{}/models/{}", self.base_url, kind);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ComfyError::from_request(&self.base_url, e))?;
        Self::parse_response(response).await
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ComfyError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl HistorySource for ComfyClient {
    async fn history(&self, job_id: &str) -> Result<Option<HistoryEntry>, ComfyError> {
        ComfyClient::history(self, job_id).await
    }
}

impl ArtifactDownloader for ComfyClient {
    async fn download(&self, reference: &OutputReference) -> Result<Vec<u8>, ComfyError> {
        self.view(reference).await
    }
}
