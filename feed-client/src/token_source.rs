// feed-client/src/token_source.rs
use async_trait::async_trait;
use url::Url;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Supplies a token for each connection attempt
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<String, ClientError>;
}

/// Fetches tokens from the server's token endpoint
pub struct HttpTokenSource {
    http: reqwest::Client,
    url: Url,
}

impl HttpTokenSource {
    pub fn new(url: Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            url,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self::new(config.token_url()?))
    }
}

#[async_trait]
impl TokenSource for HttpTokenSource {
    async fn fetch(&self) -> Result<String, ClientError> {
        let response = self.http.get(self.url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Token endpoint {} answered {}", self.url, status);
            return Err(ClientError::TokenStatus(status.as_u16()));
        }

        let token = response.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(ClientError::InvalidToken("empty token".to_string()));
        }

        tracing::debug!("Fetched token {}", common::token_fingerprint(&token));
        Ok(token)
    }
}
