/**
 * CLUSTERMAP KERNEL - Point d'entrée du service
 *
 * RÔLE : Bootstrap : config, transport (SSH ou fixtures), poller, API HTTP.
 *
 * ARCHITECTURE : un seul poller écrit le snapshot, l'API ne fait que lire.
 * Ctrl-C annule le token : le serveur s'arrête proprement puis le poller.
 */

use anyhow::Context;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use clustermap_kernel::config::load_config;
use clustermap_kernel::health::HealthTracker;
use clustermap_kernel::http::{build_router, AppState};
use clustermap_kernel::poller::{spawn_poller, Poller};
use clustermap_kernel::runner::Transport;
use clustermap_kernel::state::SnapshotStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clustermap_kernel=info")),
        )
        .init();

    let cfg = load_config().await;

    let transport = Transport::from_config(&cfg).context("transport configuration")?;
    info!(transport = %transport.describe(), poll_seconds = cfg.poll_seconds, "starting clustermap kernel");

    // snapshot unique, écrit par le poller seulement
    let store = SnapshotStore::shared();
    let health = HealthTracker::new(transport.describe());

    let shutdown = CancellationToken::new();
    let poller = Poller::new(
        transport,
        store.clone(),
        health.clone(),
        cfg.commands.clone(),
        Duration::from_secs(cfg.poll_seconds),
    );
    let poller_handle = spawn_poller(poller, shutdown.clone());

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for ctrl-c: {e}");
                return;
            }
            info!("shutdown requested");
            shutdown.cancel();
        }
    });

    let app = build_router(AppState::new(store, health, cfg.api_key.clone()));
    let listener = TcpListener::bind(&cfg.listen)
        .await
        .with_context(|| format!("binding {}", cfg.listen))?;
    info!("listening on http://{}", cfg.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.cancelled().await }
        })
        .await
        .context("http server")?;

    // le serveur peut s'arrêter seul (erreur) : le poller doit suivre
    shutdown.cancel();
    if let Err(e) = poller_handle.await {
        error!("poller task ended abnormally: {e}");
    }
    info!("bye");
    Ok(())
}
