/**
 * Relief Sync Agent - Main Entry Point
 *
 * Headless agent running the synchronization engine against a server. It
 * keeps the local cache warm, follows the push channel and logs every change
 * to the visible queue. Useful on a field laptop and for exercising a server
 * by hand.
 *
 * Usage: relief-sync-agent [config.toml]
 */
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};
use tokio_stream::StreamExt;

use relief_sync::client::{Config, EngineNotice, EventChannel, HttpApiClient, NetworkMonitor, SyncEngine};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "relief_sync=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path)?,
        None => Config::new(),
    };
    tracing::info!(server = %config.server_url(), "starting relief sync agent");

    let api = Arc::new(HttpApiClient::new(config.clone())?);
    let monitor = NetworkMonitor::default();
    let engine = SyncEngine::init(config.app(), api, monitor.clone()).await;

    let probe = match probe_address(config.server_url()).await {
        Some(addr) => Some(monitor.spawn_probe(addr, config.app().probe_interval)),
        None => {
            tracing::warn!("cannot resolve server address, reachability probe disabled");
            None
        }
    };

    let channel = EventChannel::new(
        config.events_url(),
        config.get_token().map(str::to_string),
        config.app().reconnect.clone(),
    )?;
    engine.start(&channel);

    engine.load_queue().await;
    engine.refresh_assigned().await;

    let mut visible = WatchStream::new(engine.subscribe_visible());
    let mut notices = BroadcastStream::new(engine.notices());

    loop {
        tokio::select! {
            Some(queue) = visible.next() => {
                tracing::info!(count = queue.len(), "visible queue");
                for record in &queue {
                    tracing::debug!(id = %record.id, status = %record.status, "  queued");
                }
            }
            Some(notice) = notices.next() => match notice {
                Ok(notice) => log_notice(&notice),
                Err(e) => tracing::debug!(error = %e, "notice receiver lagged"),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("shutting down");
    engine.shutdown();
    channel.close();
    if let Some(probe) = probe {
        probe.abort();
    }

    let status = engine.status().await;
    tracing::info!(
        pending = status.pending_mutations,
        store = ?status.store,
        "agent stopped"
    );
    Ok(())
}

/// First socket address of the server named by `server_url`
async fn probe_address(server_url: &str) -> Option<SocketAddr> {
    let url = reqwest::Url::parse(server_url).ok()?;
    let host = url.host_str()?.to_string();
    let port = url.port_or_known_default()?;
    tokio::net::lookup_host((host, port)).await.ok()?.next()
}

fn log_notice(notice: &EngineNotice) {
    match notice {
        EngineNotice::NewRequest { name } => {
            tracing::info!(name = name.as_deref().unwrap_or("unknown"), "new aid request")
        }
        EngineNotice::RequestDequeued { assigned_to } => {
            tracing::info!(%assigned_to, "request dequeued")
        }
        EngineNotice::HighPriorityAlert(message) => tracing::warn!(%message, "high priority alert"),
        EngineNotice::DrainFinished(outcome) => {
            tracing::info!(synced = outcome.synced, failed = outcome.failed, "pending changes synced")
        }
        other => tracing::debug!(notice = ?other, "engine notice"),
    }
}
