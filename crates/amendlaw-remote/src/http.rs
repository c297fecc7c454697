//! HTTP extraction pass: posts instruction spans to an extraction service and
//! reads back proposed intents.

use amendlaw_core::{Act, Amendment};
use amendlaw_extract::{ExtractError, ExtractionPass, ProposedIntent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One span as sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanPayload {
    pub index: usize,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

/// Body of `POST {base}/api/extract`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractRequest {
    pub amendment_id: String,
    pub act_id: String,
    pub act_version: u32,
    pub spans: Vec<SpanPayload>,
}

impl ExtractRequest {
    pub fn new(amendment: &Amendment, act: &Act) -> Self {
        Self {
            amendment_id: amendment.amendment_id.clone(),
            act_id: act.act_id().to_string(),
            act_version: act.version(),
            spans: amendment
                .spans()
                .iter()
                .map(|s| SpanPayload {
                    index: s.index,
                    text: s.text.clone(),
                    page: s.location.page,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    intents: Vec<ProposedIntent>,
}

/// Extraction pass backed by a remote service.
pub struct HttpExtractionPass {
    name: String,
    client: reqwest::Client,
    base_url: String,
}

impl HttpExtractionPass {
    /// `base_url` is like `http://localhost:4000`; a trailing slash is dropped.
    pub fn new(name: impl Into<String>, base_url: &str) -> Self {
        Self {
            name: name.into(),
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send the amendment's spans and return the service's proposals.
    pub async fn request(
        &self,
        amendment: &Amendment,
        act: &Act,
    ) -> Result<Vec<ProposedIntent>, RemoteError> {
        let url = format!("{}/api/extract", self.base_url);
        let body = ExtractRequest::new(amendment, act);

        info!(url = %url, pass = %self.name, spans = body.spans.len(), "requesting remote extraction");
        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let result: ExtractResponse = serde_json::from_slice(&bytes)?;
        info!(pass = %self.name, count = result.intents.len(), "remote extraction complete");
        Ok(result.intents)
    }
}

#[async_trait]
impl ExtractionPass for HttpExtractionPass {
    fn name(&self) -> &str {
        &self.name
    }

    async fn extract(
        &self,
        amendment: &Amendment,
        act: &Act,
    ) -> Result<Vec<ProposedIntent>, ExtractError> {
        self.request(amendment, act)
            .await
            .map_err(|e| ExtractError::Pass {
                pass: self.name.clone(),
                message: e.to_string(),
            })
    }
}
