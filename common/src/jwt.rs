// common/src/jwt.rs
//! Token issuing and validation for hub connections.
//!
//! Tokens are HS512-signed JWTs carrying a random subject and a random token
//! id (`jti`). Which claims are checked on the way in is driven by
//! [`ValidationConfig`]; replay tracking of `jti` lives with the server.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{JwtConfig, ValidationConfig};
use crate::error::AuthError;
use crate::utils::unix_now;

/// Claims carried by every issued token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub jti: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Mints short-lived tokens bound to a random subject
pub struct TokenIssuer {
    key: EncodingKey,
    issuer: String,
    audience: String,
    ttl_seconds: i64,
}

impl TokenIssuer {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            key: EncodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            ttl_seconds: config.expiry_seconds,
        }
    }

    /// Issue a token for a fresh random subject.
    pub fn issue(&self) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_for(&Uuid::new_v4().to_string())
    }

    pub fn issue_for(&self, subject: &str) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(subject, unix_now())
    }

    /// Issue a token as if the current time were `now`.
    pub fn issue_at(&self, subject: &str, now: i64) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            sub: subject.to_string(),
            jti: Uuid::new_v4().to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            nbf: now,
            exp: now + self.ttl_seconds,
        };

        encode(&Header::new(Algorithm::HS512), &claims, &self.key)
    }

    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }
}

/// Checks signature and the configured claims of presented tokens
pub struct TokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(jwt: &JwtConfig, options: &ValidationConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = options.clock_skew_seconds;
        validation.validate_exp = options.validate_lifetime;
        validation.validate_nbf = options.validate_lifetime;

        let mut required = vec!["sub"];
        if options.validate_lifetime {
            required.extend(["exp", "nbf"]);
        }
        if options.validate_issuer {
            validation.set_issuer(std::slice::from_ref(&jwt.issuer));
            required.push("iss");
        }
        if options.validate_audience {
            validation.set_audience(audience_variants(&jwt.audience).as_slice());
            required.push("aud");
        }
        validation.set_required_spec_claims(required.as_slice());

        Self {
            key: DecodingKey::from_secret(jwt.secret.as_bytes()),
            validation,
        }
    }

    /// Verify `token` and return its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims)
    }
}

/// Both spellings of an audience, with and without a trailing slash, so the
/// comparison ignores the slash.
fn audience_variants(audience: &str) -> Vec<String> {
    let bare = audience.trim_end_matches('/');
    vec![bare.to_string(), format!("{}/", bare)]
}
