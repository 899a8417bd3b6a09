// feed-client/src/main.rs
use common::{setup_tracing, FEED_METHOD};
use feed_client::{ClientConfig, ClientError, HttpTokenSource, HubConnection, HubEvent};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = ClientConfig::load()?;
    setup_tracing(&config.log_level)?;

    let token_source = Arc::new(HttpTokenSource::from_config(&config)?);
    let connection = HubConnection::new(config, token_source);
    let mut events = connection.subscribe();

    connection.start().await?;
    connection.invoke(FEED_METHOD, vec![]).await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, closing connection");
                break;
            }
            event = events.recv() => match event {
                Ok(HubEvent::Data(tick)) => {
                    tracing::info!("{} {:>10.2} {}", tick.timestamp, tick.price, tick.data);
                }
                Ok(HubEvent::Receive { user, message }) => {
                    tracing::info!("{}: {}", user, message);
                }
                Ok(HubEvent::Reconnected) => {
                    // Feeds belong to a connection; ask again on the new one.
                    if let Err(e) = connection.invoke(FEED_METHOD, vec![]).await {
                        tracing::warn!("Failed to restart feed: {}", e);
                    }
                }
                Ok(HubEvent::Closed { error }) => {
                    tracing::info!("Connection closed: {:?}", error);
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    connection.stop().await;
    Ok(())
}
