use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{info, warn};

use zooticket_api::{self as api, config, db, handlers::AppServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.server.log_json);
    info!(
        environment = %cfg.server.environment,
        timezone = %cfg.timezone,
        "starting zooticket-api"
    );

    let db_pool = db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to database")?;
    if cfg.database.auto_migrate {
        db::run_migrations(&db_pool)
            .await
            .context("database migration failed")?;
    }
    let db_arc = Arc::new(db_pool);

    let services =
        AppServices::from_config(db_arc.clone(), &cfg).context("failed to build services")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = if cfg.delivery.enabled {
        Some(
            services
                .delivery
                .clone()
                .spawn(cfg.delivery.sweep_interval(), shutdown_rx),
        )
    } else {
        warn!("delivery worker disabled; paid orders will not be emailed");
        None
    };

    let app_state = api::AppState::new(db_arc, cfg.clone(), services);
    let app = api::app_router(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    info!("zooticket-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Let an in-flight sweep finish before exiting.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper {
        if let Err(e) = handle.await {
            warn!(error = %e, "delivery worker ended abnormally");
        }
    }
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
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
                warn!(error = %e, "failed to install SIGTERM handler");
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
    info!("shutdown signal received");
}
