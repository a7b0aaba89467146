// ScriptGenerator: turns a job payload into the build script by asking a
// remote rendering service.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use thiserror::Error;
use url::Url;
use worker_common::constants::MAX_LOGGED_BODY_CHARS;
use worker_common::{HttpClientFactory, WorkerSettings};
use worker_sdk::StringUtil;

use crate::context::{CancelScope, ContextError};
use crate::job::JobPayload;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to encode job payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("script request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("script service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("script generation cancelled")]
    Cancelled,

    #[error("script generation deadline exceeded")]
    DeadlineExceeded,

    #[error("failed to read script body: {0}")]
    Body(#[source] reqwest::Error),
}

impl From<ContextError> for GenerateError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => GenerateError::Cancelled,
            ContextError::DeadlineExceeded => GenerateError::DeadlineExceeded,
        }
    }
}

/// Produces the executable script for a job.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate(&self, scope: &CancelScope, payload: &JobPayload)
        -> Result<Bytes, GenerateError>;
}

/// Renders scripts by POSTing the payload as JSON to a web service and
/// returning the response body unchanged. Never retries.
#[derive(Debug, Clone)]
pub struct WebScriptGenerator {
    url: Url,
    client: Client,
}

impl WebScriptGenerator {
    pub fn new(base_url: &str, client: Client) -> Result<Self, url::ParseError> {
        Ok(Self {
            url: Url::parse(base_url)?,
            client,
        })
    }

    pub fn from_settings(settings: &WorkerSettings) -> anyhow::Result<Self> {
        let client = HttpClientFactory::from_settings(settings)?;
        Ok(Self::new(&settings.build_api_url, client)?)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post(&self, body: Vec<u8>) -> Result<Bytes, GenerateError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(GenerateError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status: status.as_u16(),
                body: StringUtil::truncate_for_log(&text, MAX_LOGGED_BODY_CHARS),
            });
        }

        response.bytes().await.map_err(GenerateError::Body)
    }
}

#[async_trait]
impl ScriptGenerator for WebScriptGenerator {
    async fn generate(
        &self,
        scope: &CancelScope,
        payload: &JobPayload,
    ) -> Result<Bytes, GenerateError> {
        if let Some(reason) = scope.error() {
            return Err(reason.into());
        }

        let body = serde_json::to_vec(payload).map_err(GenerateError::Encode)?;

        tokio::select! {
            biased;
            result = self.post(body) => result,
            reason = scope.cancelled() => Err(reason.into()),
        }
    }
}
