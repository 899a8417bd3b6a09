// feed-client/src/lib.rs
//! Client for the tick feed hub: fetches a token, connects, and reconnects
//! with a fresh token after an unexpected loss.

pub mod config;
pub mod connection;
pub mod error;
pub mod token_source;

pub use crate::config::{ClientConfig, TokenTransport};
pub use connection::{ConnectionState, HubConnection, HubEvent};
pub use error::ClientError;
pub use token_source::{HttpTokenSource, TokenSource};
