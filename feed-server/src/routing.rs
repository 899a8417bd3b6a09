// feed-server/src/routing.rs
use actix::Addr;
use actix_web::{http::header::ContentType, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use common::jwt::TokenIssuer;
use common::Config;

use crate::actors::{hub_registry::HubRegistry, hub_session::HubSession};
use crate::auth::AuthenticatedUser;
use crate::middleware::RequireAuth;

/// Path of the hub endpoint
pub const HUB_PATH: &str = "/huh";
/// Path of the token endpoint
pub const TOKEN_PATH: &str = "/auth";

/// Configure routes for the feed server
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource(TOKEN_PATH).route(web::get().to(token_route)))
        .service(
            web::resource("/")
                .wrap(RequireAuth)
                .route(web::get().to(index_route)),
        )
        .service(
            web::resource(HUB_PATH)
                .wrap(RequireAuth)
                .route(web::get().to(hub_route)),
        );
}

/// Mint a token for a fresh anonymous identity
async fn token_route(issuer: web::Data<TokenIssuer>) -> HttpResponse {
    match issuer.issue() {
        Ok(token) => {
            tracing::debug!("Issued token valid for {}s", issuer.ttl_seconds());
            HttpResponse::Ok()
                .content_type(ContentType::plaintext())
                .body(token)
        }
        Err(e) => {
            tracing::error!("Failed to sign token: {}", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn index_route(user: web::ReqData<AuthenticatedUser>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(format!("Huh? {}?", user.subject))
}

/// WebSocket upgrade for an authenticated hub client
async fn hub_route(
    req: HttpRequest,
    stream: web::Payload,
    user: web::ReqData<AuthenticatedUser>,
    registry: web::Data<Addr<HubRegistry>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let session = HubSession::new(
        user.into_inner(),
        registry.get_ref().clone(),
        &config.feed,
        config.hub.clone(),
    );

    ws::start(session, &req, stream)
}
