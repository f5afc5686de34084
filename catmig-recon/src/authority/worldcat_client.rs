//! Authority catalog API client
//!
//! Fetches one MARCXML record per request from
//! `{base_url}/{identifier}?wskey={api_key}`.

use std::time::Duration;

use async_trait::async_trait;

use super::AuthorityTransport;
use crate::error::{ReconError, ReconResult};
use crate::identifier::Identifier;

const USER_AGENT: &str = concat!("catmig/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the authority catalog
pub struct WorldCatClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl WorldCatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> ReconResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn record_url(&self, identifier: &Identifier) -> String {
        format!("{}/{}?wskey={}", self.base_url, identifier, self.api_key)
    }
}

#[async_trait]
impl AuthorityTransport for WorldCatClient {
    async fn fetch(&self, identifier: &Identifier) -> ReconResult<String> {
        tracing::debug!(identifier = %identifier, base_url = %self.base_url, "Querying authority API");

        let response = self
            .http_client
            .get(self.record_url(identifier))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ReconError::Transport(format!(
                "API error {} for {}: {}",
                status.as_u16(),
                identifier,
                error_text.trim()
            )));
        }

        Ok(response.text().await?)
    }
}
