//! Subscribe to a channel and print everything it receives.
//!
//! ```sh
//! CENTRIFUGE_URL=ws://localhost:8000/connection/websocket \
//! CENTRIFUGE_TOKEN=... CENTRIFUGE_PROJECT=... CENTRIFUGE_USER=42 \
//! RUST_LOG=centrifuge_client=debug cargo run --example subscribe --features tracing -- news:sport
//! ```

use std::env;
use std::time::Duration;

use centrifuge_client::Config;
use centrifuge_client::config::ReconnectPolicy;
use centrifuge_client::session::events;
use centrifuge_client::ws::Client;
use serde_json::{Value, json};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let channel = env::args().nth(1).unwrap_or_else(|| "news:sport".to_owned());

    let config = Config::builder()
        .url(env::var("CENTRIFUGE_URL")?)
        .token(env::var("CENTRIFUGE_TOKEN")?)
        .project(env::var("CENTRIFUGE_PROJECT")?)
        .user(env::var("CENTRIFUGE_USER")?)
        .reconnect(ReconnectPolicy::linear(
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_secs(10),
        ))
        .build()?;

    let client = Client::new(config);
    client
        .on(events::DISCONNECT, |_: &Value| warn!("disconnected"))
        .await?;
    client.connect().await?;
    client.wait_connected().await?;
    info!(client_id = ?client.client_id().await?, "connected");

    let subscription = client
        .subscribe_with(&channel, |message: &Value| info!(%message, "message"))
        .await?;
    subscription
        .on(events::JOIN, |info: &Value| info!(%info, "join"))
        .await?;

    match subscription.history().await? {
        Ok(history) => info!(%history, "history"),
        Err(e) => warn!(error = %e, "history unavailable"),
    }

    match subscription.publish(json!({"text": "hello"})).await? {
        Ok(_) => info!("published"),
        Err(e) => warn!(error = %e, "publish rejected"),
    }

    tokio::signal::ctrl_c().await?;
    client.disconnect().await?;

    Ok(())
}
