// feed-client/src/config.rs
use ::config::{Config as ConfigFile, Environment, File};
use common::config_dir;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ClientError;

/// How the token travels on the WebSocket handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenTransport {
    /// `Authorization: Bearer <token>`
    Header,
    /// `?access_token=<token>`
    Query,
}

/// Client settings, read from `config/client.toml` and `FEED__*` variables
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server_url: String,
    pub hub_path: String,
    pub token_path: String,
    pub token_transport: TokenTransport,
    /// Wait before each reconnect attempt; its length bounds the attempts.
    pub reconnect_delays_ms: Vec<u64>,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".to_string(),
            hub_path: "/huh".to_string(),
            token_path: "/auth".to_string(),
            token_transport: TokenTransport::Header,
            reconnect_delays_ms: vec![0, 2_000, 10_000, 30_000],
            log_level: "info".to_string(),
        }
    }
}

impl ClientConfig {
    /// Client settings pointing at `server_url`, defaults elsewhere.
    pub fn for_server(server_url: &str) -> Self {
        Self {
            server_url: server_url.to_string(),
            ..Self::default()
        }
    }

    pub fn load() -> Result<Self, ClientError> {
        let defaults = Self::default();
        let delays: Vec<i64> = defaults
            .reconnect_delays_ms
            .iter()
            .map(|ms| *ms as i64)
            .collect();

        let config = ConfigFile::builder()
            .set_default("server_url", defaults.server_url)?
            .set_default("hub_path", defaults.hub_path)?
            .set_default("token_path", defaults.token_path)?
            .set_default("token_transport", "header")?
            .set_default("reconnect_delays_ms", delays)?
            .set_default("log_level", defaults.log_level)?
            .add_source(File::from(config_dir().join("client.toml")).required(false))
            .add_source(
                Environment::with_prefix("FEED")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("reconnect_delays_ms"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Absolute URL of the token endpoint
    pub fn token_url(&self) -> Result<Url, ClientError> {
        Ok(Url::parse(&self.server_url)?.join(&self.token_path)?)
    }

    /// WebSocket URL of the hub endpoint; `http` maps to `ws`, `https` to `wss`.
    pub fn hub_url(&self) -> Result<Url, ClientError> {
        let mut url = Url::parse(&self.server_url)?.join(&self.hub_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::UnsupportedScheme(other.to_string())),
        };
        if url.set_scheme(scheme).is_err() {
            return Err(ClientError::UnsupportedScheme(url.scheme().to_string()));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_url_maps_scheme() {
        let config = ClientConfig::for_server("http://localhost:8080");
        assert_eq!(config.hub_url().unwrap().as_str(), "ws://localhost:8080/huh");

        let config = ClientConfig::for_server("https://feed.example.com");
        assert_eq!(config.hub_url().unwrap().as_str(), "wss://feed.example.com/huh");
    }

    #[test]
    fn test_token_url() {
        let config = ClientConfig::for_server("http://localhost:8080");
        assert_eq!(config.token_url().unwrap().as_str(), "http://localhost:8080/auth");
    }

    #[test]
    fn test_unsupported_scheme() {
        let config = ClientConfig::for_server("ftp://localhost");
        assert!(matches!(config.hub_url(), Err(ClientError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_transport_names() {
        let transport: TokenTransport = serde_json::from_str("\"query\"").unwrap();
        assert_eq!(transport, TokenTransport::Query);
        assert_eq!(serde_json::to_string(&TokenTransport::Header).unwrap(), "\"header\"");
    }

    #[test]
    fn test_default_reconnect_schedule() {
        assert_eq!(ClientConfig::default().reconnect_delays_ms, vec![0, 2_000, 10_000, 30_000]);
    }
}
