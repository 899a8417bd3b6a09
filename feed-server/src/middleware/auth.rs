// feed-server/src/middleware/auth.rs
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, StatusCode},
    web, Error, HttpMessage, HttpResponse, ResponseError,
};
use common::{token_fingerprint, AuthError};
use futures_util::future::{ready, LocalBoxFuture, Ready};
use std::fmt;

use crate::auth::{AuthRejection, Authenticator};

/// 401 returned for any refused token. The reason is logged, not sent.
#[derive(Debug)]
pub struct Unauthorized(pub AuthError);

impl fmt::Display for Unauthorized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unauthorized: {}", self.0)
    }
}

impl ResponseError for Unauthorized {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        let challenge = match self.0 {
            AuthError::MissingToken => "Bearer",
            _ => "Bearer error=\"invalid_token\"",
        };
        HttpResponse::Unauthorized()
            .append_header((header::WWW_AUTHENTICATE, challenge))
            .finish()
    }
}

/// Requires a valid bearer token on every request of the wrapped service.
/// The `Authenticator` is read from application data; the accepted identity
/// is stored in request extensions for `web::ReqData<AuthenticatedUser>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuth;

impl<S, B> Transform<S, ServiceRequest> for RequireAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequireAuthMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequireAuthMiddleware { service }))
    }
}

pub struct RequireAuthMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RequireAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<ServiceResponse<B>, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let outcome = match req.app_data::<web::Data<Authenticator>>() {
            Some(authenticator) => authenticator.authenticate_request(req.request()),
            None => {
                tracing::error!("RequireAuth used without an Authenticator in app data");
                Err(AuthRejection {
                    error: AuthError::MissingToken,
                    token: None,
                })
            }
        };

        match outcome {
            Ok(user) => {
                tracing::debug!("Authenticated {} for {}", user.subject, req.path());
                req.extensions_mut().insert(user);

                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(rejection) => {
                log_rejection(req.path(), &rejection);
                Box::pin(async move { Err(Unauthorized(rejection.error).into()) })
            }
        }
    }
}

fn log_rejection(path: &str, rejection: &AuthRejection) {
    match &rejection.token {
        Some(token) => tracing::warn!(
            "Rejected token {} on {}: {}",
            token_fingerprint(token),
            path,
            rejection.error
        ),
        None => tracing::warn!("Rejected request on {}: {}", path, rejection.error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::replay::ReplayGuard;
    use actix_web::{test, App};
    use common::jwt::TokenIssuer;
    use common::{Config, JwtConfig};
    use std::sync::Arc;

    fn config() -> Config {
        Config::with_jwt(JwtConfig {
            secret: "middleware-secret-0123456789-0123456789".to_string(),
            issuer: "feed-hub".to_string(),
            audience: "any".to_string(),
            expiry_seconds: 60,
        })
    }

    async fn whoami(user: web::ReqData<AuthenticatedUser>) -> String {
        user.subject.clone()
    }

    #[actix_web::test]
    async fn test_valid_token_reaches_handler() {
        let config = config();
        let authenticator = Authenticator::from_config(&config, Arc::new(ReplayGuard::new()));
        let token = TokenIssuer::new(&config.jwt).issue_for("carol").unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(authenticator))
                .service(web::resource("/me").wrap(RequireAuth).to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me")
            .insert_header((header::AUTHORIZATION, format!("Bearer {}", token)))
            .to_request();
        let body = test::call_and_read_body(&app, req).await;
        assert_eq!(body, "carol");
    }

    #[actix_web::test]
    async fn test_missing_token_is_unauthorized() {
        let config = config();
        let authenticator = Authenticator::from_config(&config, Arc::new(ReplayGuard::new()));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(authenticator))
                .service(web::resource("/me").wrap(RequireAuth).to(whoami)),
        )
        .await;

        let req = test::TestRequest::get().uri("/me").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer"
        );
    }

    #[actix_web::test]
    async fn test_invalid_token_challenge() {
        let config = config();
        let authenticator = Authenticator::from_config(&config, Arc::new(ReplayGuard::new()));

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(authenticator))
                .service(web::resource("/me").wrap(RequireAuth).to(whoami)),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/me?access_token=not-a-token")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            resp.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            "Bearer error=\"invalid_token\""
        );
    }
}
