//! Ping handler

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::debug;

/// Handle adresar.ping messages
pub async fn handle(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received ping");
        if let Some(reply) = msg.reply {
            let _ = client.publish(reply, "pong".into()).await;
        }
    }

    Ok(())
}
