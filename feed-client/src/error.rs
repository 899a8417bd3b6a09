// feed-client/src/error.rs
use thiserror::Error;

use crate::connection::ConnectionState;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported server URL scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("token request failed: {0}")]
    TokenRequest(#[from] reqwest::Error),

    #[error("token endpoint answered {0}")]
    TokenStatus(u16),

    #[error("token is not usable in a request: {0}")]
    InvalidToken(String),

    #[error("hub rejected the handshake with status {0}")]
    HandshakeRejected(u16),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot {action} while {state:?}")]
    InvalidState {
        action: &'static str,
        state: ConnectionState,
    },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("invocation failed: {0}")]
    Invocation(String),

    #[error("failed to install tracing subscriber: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),
}
