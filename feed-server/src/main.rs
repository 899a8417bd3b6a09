// feed-server/src/main.rs
use common::{setup_tracing, Config};
use feed_server::error::ServerError;
use std::net::TcpListener;

#[actix_web::main]
async fn main() -> Result<(), ServerError> {
    // Load configuration
    let config = Config::load()?;

    // Setup tracing
    setup_tracing(&config.log_level)?;

    tracing::info!(
        "Tokens expire after {}s; issuer {}, audience {}",
        config.jwt.expiry_seconds,
        config.jwt.issuer,
        config.jwt.audience
    );

    let listener = TcpListener::bind(&config.server_addr)?;
    feed_server::run(listener, config)?.await?;

    tracing::info!("Feed server stopped");
    Ok(())
}
