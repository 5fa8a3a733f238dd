//! Downstream delivery of span batches

use crate::{PodtagError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// An outbound span batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub content_type: String,
    /// `Content-Encoding` of `body`, `None` when it is sent as is
    pub content_encoding: Option<String>,
    pub body: Bytes,
}

impl Payload {
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self {
            content_type: podtag_common::JSON_CONTENT_TYPE.to_string(),
            content_encoding: None,
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, payload: Payload) -> Result<()>;
}

/// Posts span batches to a collector over HTTP
pub struct HttpForwarder {
    client: Client,
    url: String,
}

impl HttpForwarder {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PodtagError::ForwardError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, payload: Payload) -> Result<()> {
        let size = payload.body.len();
        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, payload.content_type);
        if let Some(encoding) = payload.content_encoding {
            request = request.header(CONTENT_ENCODING, encoding);
        }

        let response = request
            .body(payload.body)
            .send()
            .await
            .map_err(|e| PodtagError::ForwardError(format!("POST {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PodtagError::ForwardError(format!(
                "POST {} returned {}",
                self.url, status
            )));
        }

        debug!(url = %self.url, bytes = size, %status, "Forwarded span batch");
        Ok(())
    }
}
