//! Kedastral forecaster service
//!
//! Collects metrics from Prometheus, predicts future load, derives a desired
//! replica plan and serves forecast snapshots over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kedastral_core::adapters::PrometheusAdapter;
use kedastral_core::models::{ArimaModel, BaselineModel, Model};
use kedastral_core::observability::ForecasterMetrics;
use kedastral_core::storage::{MemoryStore, Store};
use kedastral_core::Forecaster;
use kedastral_forecaster::{api, config::Config};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let cfg = Config::parse();
    cfg.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        workload = %cfg.workload,
        metric = %cfg.metric,
        model = %cfg.model,
        "starting kedastral forecaster"
    );

    let adapter = Arc::new(PrometheusAdapter::new(
        &cfg.prom_url,
        &cfg.prom_query,
        cfg.step_secs,
    ));

    let model: Arc<dyn Model> = match cfg.model.as_str() {
        "arima" => {
            info!(p = cfg.arima_p, d = cfg.arima_d, q = cfg.arima_q, "initializing ARIMA model");
            Arc::new(ArimaModel::new(
                &cfg.metric,
                cfg.step_secs,
                cfg.horizon_secs,
                cfg.arima_p,
                cfg.arima_d,
                cfg.arima_q,
            )?)
        }
        "baseline" => {
            info!("initializing baseline model");
            Arc::new(BaselineModel::new(&cfg.metric, cfg.step_secs, cfg.horizon_secs))
        }
        other => bail!("invalid model type {other:?}"),
    };

    let store: Arc<dyn Store> = if cfg.store_ttl_secs > 0 {
        info!(ttl_secs = cfg.store_ttl_secs, "initializing in-memory storage with TTL");
        Arc::new(MemoryStore::with_ttl(Duration::from_secs(cfg.store_ttl_secs)))
    } else {
        info!("initializing in-memory storage");
        Arc::new(MemoryStore::new())
    };

    let metrics = ForecasterMetrics::new(&cfg.workload);

    let forecaster = Forecaster::new(
        &cfg.workload,
        adapter,
        model,
        Arc::clone(&store),
        cfg.policy(),
        cfg.horizon(),
        cfg.step(),
        cfg.window(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let loop_handle = tokio::spawn(forecaster.run(cfg.interval(), shutdown_tx.subscribe()));

    let state = Arc::new(api::AppState::new(
        Arc::clone(&store),
        cfg.stale_after(),
        metrics,
    ));
    let listener = tokio::net::TcpListener::bind(&cfg.listen).await?;
    let server_handle = tokio::spawn(api::serve(listener, state, shutdown_tx.subscribe()));

    shutdown_signal().await;
    info!("received shutdown signal");

    let _ = shutdown_tx.send(());

    let drain = async {
        if let Err(e) = loop_handle.await {
            error!(error = %e, "forecast loop task failed");
        }
        match server_handle.await {
            Ok(Err(e)) => error!(error = %e, "API server failed"),
            Err(e) => error!(error = %e, "API server task failed"),
            Ok(Ok(())) => {}
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        error!("shutdown grace period elapsed, exiting with tasks still running");
    }

    store.close().await;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
