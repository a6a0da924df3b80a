use std::{net::SocketAddr, sync::Arc};

use tokio::signal;
use tracing::{error, info, warn};

use stateset_rma as rma;
use rma::config::StoreBackend;
use rma::services::{Clock, SystemClock};
use rma::store::{MemoryStore, RecordStore, SqlStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = rma::config::load_config()?;
    rma::config::init_tracing(cfg.log_level(), cfg.log_json);
    rma::handlers::health::init_start_time();

    // Init record store
    let store: Arc<dyn RecordStore> = match cfg.store_backend() {
        StoreBackend::Sql => {
            let db_pool = rma::db::establish_connection_from_app_config(&cfg).await?;
            rma::db::ensure_schema(&db_pool).await.map_err(|e| {
                error!("Failed preparing record store schema: {}", e);
                e
            })?;
            Arc::new(SqlStore::new(Arc::new(db_pool)))
        }
        StoreBackend::InMemory => {
            warn!("Using the in-memory record store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    if cfg.operators.is_empty() {
        warn!("No operators configured; every API call except health will be refused");
    }

    // Init events
    let (event_sender, event_rx) = rma::events::channel(cfg.event_channel_capacity);
    tokio::spawn(rma::events::process_events(event_rx));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let port = cfg.port;
    let host = cfg.host.clone();
    let app_state = rma::AppState::new(cfg, store, event_sender, clock);
    info!(operators = app_state.operators.len(), "Operator directory loaded");
    let app = rma::build_router(app_state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("stateset-rma listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
    info!("Shutdown signal received");
}
