// feed-server/src/auth.rs
use actix_web::http::header;
use actix_web::HttpRequest;
use common::jwt::TokenValidator;
use common::{unix_now, AuthError, Config};
use std::sync::Arc;

use crate::replay::ReplayGuard;

/// Query parameter carrying the token when headers cannot be set, as on a
/// browser WebSocket upgrade.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Identity attached to a request once its token has been accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub subject: String,
    pub token_id: String,
    pub expires_at: i64,
}

/// A refused request. The presented token is kept so the failure can be
/// logged against it.
#[derive(Debug, Clone)]
pub struct AuthRejection {
    pub error: AuthError,
    pub token: Option<String>,
}

/// Validates bearer tokens and, when enabled, refuses reused token ids
pub struct Authenticator {
    validator: TokenValidator,
    replay_guard: Option<Arc<ReplayGuard>>,
}

impl Authenticator {
    pub fn new(validator: TokenValidator, replay_guard: Option<Arc<ReplayGuard>>) -> Self {
        Self {
            validator,
            replay_guard,
        }
    }

    /// Build from configuration, attaching `replay_guard` only when replay
    /// validation is switched on.
    pub fn from_config(config: &Config, replay_guard: Arc<ReplayGuard>) -> Self {
        let validator = TokenValidator::new(&config.jwt, &config.validation);
        let guard = config.validation.validate_replay.then_some(replay_guard);
        Self::new(validator, guard)
    }

    /// Authenticate an inbound request.
    pub fn authenticate_request(&self, req: &HttpRequest) -> Result<AuthenticatedUser, AuthRejection> {
        let token = extract_token(req).ok_or(AuthRejection {
            error: AuthError::MissingToken,
            token: None,
        })?;

        self.authenticate(&token).map_err(|error| AuthRejection {
            error,
            token: Some(token),
        })
    }

    /// Validate a raw token string.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let claims = self.validator.validate(token)?;

        if let Some(guard) = &self.replay_guard {
            if claims.jti.is_empty() {
                return Err(AuthError::MissingClaim("jti".to_string()));
            }
            if !guard.try_register(&claims.jti, claims.exp, unix_now()) {
                return Err(AuthError::Replayed);
            }
        }

        Ok(AuthenticatedUser {
            subject: claims.sub,
            token_id: claims.jti,
            expires_at: claims.exp,
        })
    }
}

/// Bearer token from the Authorization header, falling back to the
/// `access_token` query parameter.
pub fn extract_token(req: &HttpRequest) -> Option<String> {
    let from_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty());

    if let Some(token) = from_header {
        return Some(token.to_string());
    }

    query_param(req.query_string(), ACCESS_TOKEN_PARAM)
}

fn query_param(query: &str, name: &str) -> Option<String> {
    actix_web::web::Query::<Vec<(String, String)>>::from_query(query)
        .ok()?
        .into_inner()
        .into_iter()
        .find(|(key, value)| key == name && !value.is_empty())
        .map(|(_, value)| value)
}
