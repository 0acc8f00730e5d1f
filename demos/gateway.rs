//! Connects to a gateway, prints inbound frames and survives reconnects.
//!
//! The endpoint is read from `GATEWAY_URL`. Closes with an application code in
//! the 4000 range other than 4000 itself are treated as fatal.
//!
//! Run with tracing enabled:
//! ```sh
//! GATEWAY_URL=wss://echo.websocket.org RUST_LOG=info,gateway_ws=debug cargo run --example gateway --features tracing
//! ```

use std::time::Duration;

use gateway_ws::ws::config::{Config, ReconnectPolicy};
use gateway_ws::ws::{GatewaySession, MemoryBudget};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let endpoint = std::env::var("GATEWAY_URL")
        .unwrap_or_else(|_| "wss://echo.websocket.org".to_owned());

    let mut config = Config::default();
    config.memory_budget = MemoryBudget::Percentage(5);
    config.reconnect_policy =
        ReconnectPolicy::new(|close| close.code == 4000 || !(4000..5000).contains(&close.code));

    let session = GatewaySession::new(&endpoint, config)?;

    session.on_message(|frame| info!(len = frame.len(), frame, "Received"));
    session.on_connect(|| info!("Connected"));
    session.on_disconnect(|close| warn!(%close, "Disconnected"));
    session.on_reconnect_failed(|close, error| warn!(%close, %error, "Reconnect failed"));

    session.connect_with_retry().await?;

    for sequence in 0..5_u32 {
        let frame = format!(r#"{{"op":1,"d":{sequence}}}"#);
        match session.send(frame).await {
            Ok(()) => info!(sequence, "Heartbeat sent"),
            Err(e) => warn!(sequence, error = %e, "Heartbeat failed"),
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    session.disconnect().await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    Ok(())
}
