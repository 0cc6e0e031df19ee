//! Payload delivery

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::error::{Error, Result};

/// Destination for encoded payloads.
#[async_trait]
pub trait MeasurementSink: Send + Sync {
    /// Deliver one payload holding `count` measurements.
    async fn send(&self, payload: Vec<u8>, count: usize) -> Result<()>;
}

/// Posts payloads to the sidecar over HTTP.
pub struct HttpSink {
    url: Url,
    client: Client,
}

impl HttpSink {
    /// Fails when `endpoint` is not an absolute http(s) URL.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("Invalid sidecar URL {:?}: {}", endpoint, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "Unsupported sidecar URL scheme {:?} in {:?}",
                url.scheme(),
                endpoint
            )));
        }

        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { url, client })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl fmt::Debug for HttpSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSink")
            .field("url", &self.url.as_str())
            .finish()
    }
}

#[async_trait]
impl MeasurementSink for HttpSink {
    async fn send(&self, payload: Vec<u8>, count: usize) -> Result<()> {
        let bytes = payload.len();
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(payload)
            .send()
            .await
            .map_err(Error::SidecarConnection)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::SidecarStatus {
                status: status.as_u16(),
            });
        }

        debug!(url = %self.url, count, bytes, "Posted measurements to sidecar");
        Ok(())
    }
}
