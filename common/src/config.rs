// common/src/config.rs
use config::{Config as ConfigFile, ConfigBuilder, Environment, File};
use config::builder::DefaultState;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Minimum accepted length of the HMAC signing secret, in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Central configuration for the feed server
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub server_addr: String,
    pub log_level: String,
    pub jwt: JwtConfig,
    pub validation: ValidationConfig,
    pub feed: FeedConfig,
    pub hub: HubConfig,
    pub replay_sweep_interval_secs: u64,
}

/// Token signing parameters. None of these have defaults: a deployment
/// that does not provide them must not start.
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub expiry_seconds: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiry_seconds", &self.expiry_seconds)
            .finish()
    }
}

/// Which claims the authenticator checks.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationConfig {
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_lifetime: bool,
    pub clock_skew_seconds: u64,
    pub validate_replay: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            validate_issuer: true,
            validate_audience: true,
            validate_lifetime: true,
            clock_skew_seconds: 0,
            validate_replay: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedConfig {
    pub interval_ms: u64,
    pub payload_length: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            payload_length: 100,
        }
    }
}

impl FeedConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Keep-alive settings for hub connections
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HubConfig {
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 5,
            client_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Build a configuration with default ambient settings around the given
    /// signing parameters.
    pub fn with_jwt(jwt: JwtConfig) -> Self {
        Self {
            server_addr: "127.0.0.1:8080".to_string(),
            log_level: "info".to_string(),
            jwt,
            validation: ValidationConfig::default(),
            feed: FeedConfig::default(),
            hub: HubConfig::default(),
            replay_sweep_interval_secs: 30,
        }
    }

    /// Load configuration from files and environment, then validate it.
    pub fn load() -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        tracing::info!("Loading configuration from {}", config_dir.display());
        tracing::info!("Using run mode: {}", run_mode);

        let builder = layered_sources(ConfigFile::builder(), &config_dir, &run_mode, "APP");
        Self::from_builder(builder)
    }

    /// Apply defaults for the optional settings, deserialize and validate.
    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let defaults = ValidationConfig::default();
        let feed = FeedConfig::default();
        let hub = HubConfig::default();

        let config: Config = builder
            .set_default("server_addr", "127.0.0.1:8080")?
            .set_default("log_level", "info")?
            .set_default("validation.validate_issuer", defaults.validate_issuer)?
            .set_default("validation.validate_audience", defaults.validate_audience)?
            .set_default("validation.validate_lifetime", defaults.validate_lifetime)?
            .set_default("validation.clock_skew_seconds", defaults.clock_skew_seconds as i64)?
            .set_default("validation.validate_replay", defaults.validate_replay)?
            .set_default("feed.interval_ms", feed.interval_ms as i64)?
            .set_default("feed.payload_length", feed.payload_length as i64)?
            .set_default("hub.heartbeat_interval_secs", hub.heartbeat_interval_secs as i64)?
            .set_default("hub.client_timeout_secs", hub.client_timeout_secs as i64)?
            .set_default("replay_sweep_interval_secs", 30i64)?
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_SECRET_LENGTH {
            return Err(ConfigError::Invalid {
                field: "jwt.secret",
                reason: format!("must be at least {} bytes", MIN_SECRET_LENGTH),
            });
        }
        if self.jwt.issuer.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "jwt.issuer",
                reason: "must not be empty".to_string(),
            });
        }
        if self.jwt.audience.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "jwt.audience",
                reason: "must not be empty".to_string(),
            });
        }
        if self.jwt.expiry_seconds <= 0 {
            return Err(ConfigError::Invalid {
                field: "jwt.expiry_seconds",
                reason: "must be positive".to_string(),
            });
        }
        if self.feed.interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "feed.interval_ms",
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

/// Locate the config directory, honouring CONFIG_DIR
pub fn config_dir() -> PathBuf {
    env::var("CONFIG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            // Check if we're in the project root or a subcrate
            let mut path = PathBuf::from("./config");
            if !path.exists() {
                path = PathBuf::from("../config");
            }
            path
        })
}

/// Stack the default, run-mode and local files plus prefixed environment
/// variables on top of `builder`.
pub fn layered_sources(
    builder: ConfigBuilder<DefaultState>,
    config_dir: &std::path::Path,
    run_mode: &str,
    env_prefix: &str,
) -> ConfigBuilder<DefaultState> {
    builder
        .add_source(File::from(config_dir.join("default.toml")).required(false))
        .add_source(File::from(config_dir.join(format!("{}.toml", run_mode))).required(false))
        .add_source(File::from(config_dir.join("local.toml")).required(false))
        .add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(toml: &str) -> Result<Config, ConfigError> {
        Config::from_builder(ConfigFile::builder().add_source(File::from_str(toml, FileFormat::Toml)))
    }

    const VALID: &str = r#"
        [jwt]
        secret = "0123456789abcdef0123456789abcdef0123456789abcdef"
        issuer = "feed-hub"
        audience = "any"
        expiry_seconds = 300
    "#;

    #[test]
    fn test_load_applies_defaults() {
        let config = from_toml(VALID).unwrap();
        assert_eq!(config.server_addr, "127.0.0.1:8080");
        assert_eq!(config.feed.interval_ms, 50);
        assert_eq!(config.feed.payload_length, 100);
        assert_eq!(config.validation, ValidationConfig::default());
        assert_eq!(config.jwt.expiry_seconds, 300);
    }

    #[test]
    fn test_missing_secret_fails() {
        let toml = r#"
            [jwt]
            issuer = "feed-hub"
            audience = "any"
            expiry_seconds = 300
        "#;
        assert!(matches!(from_toml(toml), Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_missing_jwt_section_fails() {
        assert!(from_toml("server_addr = \"0.0.0.0:9000\"").is_err());
    }

    #[test]
    fn test_short_secret_rejected() {
        let toml = VALID.replace("0123456789abcdef0123456789abcdef0123456789abcdef", "short");
        match from_toml(&toml) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "jwt.secret"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_positive_ttl_rejected() {
        let toml = VALID.replace("expiry_seconds = 300", "expiry_seconds = 0");
        match from_toml(&toml) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "jwt.expiry_seconds"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = from_toml(VALID).unwrap();
        let debug = format!("{:?}", config.jwt);
        assert!(!debug.contains("0123456789abcdef"));
        assert!(debug.contains("REDACTED"));
    }
}
