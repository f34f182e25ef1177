mod bus;
mod config;
mod error;
mod message;
mod registry;
mod relay;
mod routes;
mod store;

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing_subscriber::EnvFilter;

use crate::bus::build_fanout_bus;
use crate::config::Config;
use crate::error::AppErr;
use crate::relay::{Relay, SharedRelay};
use crate::store::build_history_store;

#[tokio::main]
async fn main() -> Result<(), AppErr> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    tracing::info!(backend = ?config.backend, topic = %config.channel, cap = config.history_cap, "starting relay");

    let store = build_history_store(&config).await?;
    let bus   = build_fanout_bus(&config).await?;
    let relay: SharedRelay = Arc::new(Relay::new(store, bus, config.channel.clone()));

    // without the subscription this instance can't see anyone else's messages
    let sub = match relay.subscribe().await {
        Ok(sub) => sub,
        Err(error) => {
            tracing::error!(%error, topic = %config.channel, "failed to subscribe, aborting");
            return Err(error.into());
        }
    };

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let fanout = tokio::spawn({
        let relay = relay.clone();
        async move {
            relay.run_fanout(sub, async { let _ = stop_rx.await; }).await;
        }
    });

    let app = routes::app(relay.clone(), &config);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(addr = %config.bind, "listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(relay.clone()))
        .await?;

    /* 收尾：關 subscription、斷 redis */
    let _ = stop_tx.send(());
    if let Err(error) = fanout.await {
        tracing::warn!(%error, "fan-out task panicked");
    }
    relay.store().close().await;
    relay.bus().close().await;
    tracing::info!("bye");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM, after every client has been hung up on.
async fn shutdown_signal(relay: SharedRelay) {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(%error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => { sig.recv().await; }
            Err(error) => {
                tracing::error!(%error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
    relay.close_connections().await;
}
