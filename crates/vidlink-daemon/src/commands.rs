//! CLI command implementations.

use std::sync::Arc;

use serde_json::json;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use vidlink_client::DownloadRequest;
use vidlink_core::BridgeEvent;
use vidlink_runtime::Bridge;

/// Run every driver and log bridge events until Ctrl-C.
pub async fn run(bridge: Arc<Bridge>) -> anyhow::Result<()> {
    let mut events = bridge.event_stream();
    let handle = bridge.start();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = events.next() => match event {
                Some(Ok(event)) => log_event(&event),
                Some(Err(e)) => warn!("Event stream lagged: {}", e),
                None => break,
            },
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn log_event(event: &BridgeEvent) {
    match event {
        BridgeEvent::ConnectionChanged { status, port } => match port {
            Some(port) => info!("Connection: {} (port {})", status, port),
            None => info!("Connection: {}", status),
        },
        BridgeEvent::Notification { message, .. } => info!("{}", message),
        BridgeEvent::ScanProgress { scanned, total } => {
            info!("Scanning ports: {}/{}", scanned, total)
        }
        BridgeEvent::QueueChanged(snapshot) => info!(
            "Queue: {} queued, {} active",
            snapshot.queued.len(),
            snapshot.active.len()
        ),
    }
}

/// One discovery pass. Returns whether the backend was found.
pub async fn discover(bridge: &Bridge, force: bool) -> bool {
    match bridge.rediscover(force).await {
        Some(port) => {
            println!("Backend found on port {}", port);
            true
        }
        None => {
            let config = bridge.config();
            println!(
                "Backend not found on ports {}-{}",
                config.base_port,
                config.max_port()
            );
            false
        }
    }
}

pub async fn status(bridge: &Bridge) -> anyhow::Result<()> {
    let cached = bridge.cached_port();
    bridge.rediscover(false).await;
    if let Err(e) = bridge.refresh_queue().await {
        warn!("Queue refresh skipped: {}", e);
    }

    let queue = bridge.queue();
    let report = json!({
        "status": bridge.status(),
        "port": bridge.connected_port(),
        "cachedPort": cached,
        "lastSynced": bridge.last_synced(),
        "queued": queue.queued,
        "active": queue.active,
        "serverConfig": bridge.server_config(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Submit one download. Returns whether the backend accepted it.
pub async fn submit(
    bridge: &Bridge,
    url: &str,
    quality: Option<&str>,
    format: Option<&str>,
) -> anyhow::Result<bool> {
    if bridge.rediscover(false).await.is_none() {
        anyhow::bail!("backend is not reachable");
    }

    let mut request = DownloadRequest::new(url);
    if let Some(quality) = quality {
        request = request.with_quality(quality);
    }
    if let Some(format) = format {
        request = request.with_format(format);
    }

    let outcome = bridge.submit(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome.to_reply())?);
    Ok(outcome.is_accepted())
}
