// feed-server/src/lib.rs
//! Authenticated WebSocket hub streaming synthetic price ticks.

pub mod actors;
pub mod auth;
pub mod error;
pub mod feed;
pub mod middleware;
pub mod replay;
pub mod routing;

use actix::Actor;
use actix_web::{dev::Server, web, App, HttpServer};
use common::jwt::TokenIssuer;
use common::Config;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actors::{hub_registry::HubRegistry, replay_sweeper::ReplaySweeper};
use auth::Authenticator;
use error::ServerError;
use replay::ReplayGuard;
use routing::routes;

/// Build the HTTP server on an already bound listener. The configuration is
/// validated first.
///
/// Must be called from within an actix system; the hub registry and replay
/// sweeper actors are started on the current arbiter.
pub fn run(listener: TcpListener, config: Config) -> Result<Server, ServerError> {
    config.validate()?;
    let local_addr = listener.local_addr()?;

    let registry = HubRegistry::new().start();
    let replay_guard = Arc::new(ReplayGuard::new());

    if config.validation.validate_replay {
        ReplaySweeper::new(
            replay_guard.clone(),
            Duration::from_secs(config.replay_sweep_interval_secs),
        )
        .start();
    } else {
        tracing::warn!("Token replay validation is disabled");
    }

    let issuer = web::Data::new(TokenIssuer::new(&config.jwt));
    let authenticator = web::Data::new(Authenticator::from_config(&config, replay_guard));
    let registry_data = web::Data::new(registry);
    let config_data = web::Data::new(config);

    tracing::info!("Starting feed server on {}", local_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(issuer.clone())
            .app_data(authenticator.clone())
            .app_data(registry_data.clone())
            .app_data(config_data.clone())
            .configure(routes)
    })
    .listen(listener)?
    .run();

    Ok(server)
}
