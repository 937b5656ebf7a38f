//! Location Stream Tail Binary
//!
//! Subscribes to the location stream gateway and logs every point with its
//! movement classification.
//!
//! # Usage
//!
//! ```bash
//! STREAM_USERS=adar cargo run --bin location-stream-tail
//! ```
//!
//! # Environment Variables
//!
//! - `STREAM_GATEWAY_URL`: Gateway stream URL (default: http://localhost:8080/api/stream)
//! - `STREAM_ALL`, `STREAM_USERS`, `STREAM_DEVICES`: Who to follow (one is required)
//! - `STREAM_HEARTBEAT_SECS`: Heartbeat interval (default: 15)
//! - `STREAM_LIMIT`: Points per upstream cycle (default: 100)
//! - `STREAM_MAX_RECONNECT_ATTEMPTS`: Reconnect budget, 0 = unlimited (default: 10)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use location_stream_client::infrastructure::telemetry;
use location_stream_client::{
    ClassifiedPoint, Motion, MovementFeed, MovementTracker, StreamClient, TailConfig,
};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    telemetry::init();

    let config = TailConfig::from_env().context("invalid tail configuration")?;
    tracing::info!(
        gateway = %config.client.gateway_url,
        include_all = config.filter.include_all,
        users = config.filter.users.len(),
        devices = config.filter.devices.len(),
        "Starting location stream tail"
    );

    let client = StreamClient::new(config.client).context("failed to build stream client")?;
    let tracker = Arc::new(MovementTracker::default());
    let (points_tx, mut points_rx) = mpsc::unbounded_channel();

    let handle = client
        .open_with_handler(config.filter, MovementFeed::new(Arc::clone(&tracker), points_tx))
        .context("failed to open subscription")?;

    loop {
        tokio::select! {
            classified = points_rx.recv() => {
                let Some(classified) = classified else {
                    break;
                };
                log_point(&classified);
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for Ctrl+C")?;
                tracing::info!("Received Ctrl+C, closing subscription");
                break;
            }
        }
    }

    handle.close();
    tracing::info!(devices = tracker.device_count(), "Location stream tail stopped");
    Ok(())
}

fn log_point(classified: &ClassifiedPoint) {
    let point = &classified.point;
    let tag = classified.classification.tag;
    match &classified.classification.state.motion {
        Motion::Dwelling(dwell) => tracing::info!(
            id = classified.id.as_ref().map(|id| id.as_str()),
            device = %point.device_id,
            tag = %tag,
            dwell_secs = dwell.dwell_duration(Utc::now()).num_seconds(),
            "Dwelling"
        ),
        Motion::Moving if tag.is_accepted() => tracing::info!(
            id = classified.id.as_ref().map(|id| id.as_str()),
            device = %point.device_id,
            tag = %tag,
            lat = point.lat,
            lon = point.lon,
            speed_kmh = point.speed_kmh,
            "Moving"
        ),
        Motion::Moving => tracing::debug!(device = %point.device_id, "Unchanged"),
    }
}

/// Load the nearest `.env`, searching the working directory and its ancestors.
fn load_dotenv() {
    let Ok(cwd) = std::env::current_dir() else {
        return;
    };
    if let Some(path) = cwd
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|p| p.is_file())
    {
        let _ = dotenvy::from_path(path);
    }
}
