//! Signal handling for graceful shutdown and source list reload.

use std::sync::Arc;

use hawk_core::config::{ConfigStore, SourceList};
use hawk_core::sources::load_sources;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::Notify;

use crate::config::ConfigLoader;
use crate::state::AppState;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Failed to install signal handlers, falling back to Ctrl+C");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                }
                return;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Spawns a task that listens for SIGHUP, reloads the configuration and
/// re-reads the source list.
///
/// The admin secret is swapped in place; the new source list is published
/// to `sources`, where `SourceSync` picks it up and reconciles the registry.
/// A reload that fails keeps everything as it was.
///
/// Returns a Notify that can be used to signal when shutdown is complete.
pub fn spawn_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
    sources: ConfigStore<SourceList>,
) -> Arc<Notify> {
    let shutdown_notify = Arc::new(Notify::new());
    let shutdown_notify_clone = shutdown_notify.clone();

    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sighup) => sighup,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler, reload disabled");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    let loaded = match config_loader.reload() {
                        Ok(loaded) => loaded,
                        Err(e) => {
                            tracing::error!("Failed to reload configuration: {}", e);
                            continue;
                        }
                    };
                    *state.admin.write().await = loaded.admin;

                    match load_sources(&loaded.sources_file).await {
                        Ok(handles) => {
                            tracing::info!(sources = handles.len(), "Source list reloaded");
                            sources.update(SourceList { handles });
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to reload source list, keeping the current one");
                        }
                    }
                }
                _ = shutdown_notify_clone.notified() => {
                    tracing::debug!("Reload handler shutting down");
                    break;
                }
            }
        }
    });

    shutdown_notify
}
