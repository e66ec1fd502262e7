//! Static-site rebuild webhook.
//!
//! A bodyless `POST` to the build-hook URL. Callers treat every failure as
//! best effort: it is logged, never surfaced as a publish failure.

use crate::error::{transport, StoreError};

#[derive(Debug, Clone)]
pub struct RebuildTrigger {
    http: reqwest::Client,
    url: String,
}

impl RebuildTrigger {
    pub fn new(url: impl Into<String>) -> Result<Self, StoreError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(StoreError::Validation("rebuild hook url is empty".into()));
        }
        let http = reqwest::Client::builder()
            .build()
            .map_err(transport("client_init"))?;
        Ok(Self { http, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Ask the host to start a rebuild.
    pub async fn trigger(&self) -> Result<(), StoreError> {
        let endpoint = "POST build hook";
        let resp = self
            .http
            .post(&self.url)
            .send()
            .await
            .map_err(transport(endpoint))?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(StoreError::Api {
                endpoint: endpoint.into(),
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }
        tracing::info!(hook = %self.url, "rebuild triggered");
        Ok(())
    }
}
