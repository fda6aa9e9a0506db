//! Kedastral KEDA external scaler
//!
//! Serves the external-scaler gRPC protocol, answering host-autoscaler polls
//! with the lead-time-indexed desired replica count from the forecaster's
//! latest snapshot.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kedastral_core::client::ForecasterClient;
use kedastral_core::proto::ExternalScalerServer;
use kedastral_scaler::{config::Config, metrics::ScalerMetrics, router, scaler::KedastralScaler};

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
        listen = %cfg.listen,
        forecaster_url = %cfg.forecaster_url,
        lead_time_secs = cfg.lead_time_secs,
        "starting kedastral scaler"
    );

    let metrics = ScalerMetrics::new();
    let client = ForecasterClient::new(&cfg.forecaster_url);
    let scaler = KedastralScaler::new(
        client,
        cfg.lead_time(),
        cfg.stale_after(),
        cfg.default_min,
        metrics,
    );

    let (shutdown_tx, _) = broadcast::channel(1);

    let grpc_addr: SocketAddr = cfg.listen.parse().context("invalid gRPC listen address")?;
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_service_status("", tonic_health::ServingStatus::Serving)
        .await;

    let mut grpc_shutdown = shutdown_tx.subscribe();
    let grpc_handle = tokio::spawn(async move {
        info!(addr = %grpc_addr, "grpc server listening");
        tonic::transport::Server::builder()
            .add_service(health_service)
            .add_service(ExternalScalerServer::new(scaler))
            .serve_with_shutdown(grpc_addr, async move {
                let _ = grpc_shutdown.recv().await;
            })
            .await
    });

    let http_listener = tokio::net::TcpListener::bind(&cfg.http_listen)
        .await
        .context("bind HTTP listener")?;
    let http_handle = tokio::spawn(router::serve(http_listener, shutdown_tx.subscribe()));

    shutdown_signal().await;
    info!("received shutdown signal");

    let _ = shutdown_tx.send(());

    let drain = async {
        match grpc_handle.await {
            Ok(Err(e)) => error!(error = %e, "grpc server failed"),
            Err(e) => error!(error = %e, "grpc server task failed"),
            Ok(Ok(())) => {}
        }
        match http_handle.await {
            Ok(Err(e)) => error!(error = %e, "http server failed"),
            Err(e) => error!(error = %e, "http server task failed"),
            Ok(Ok(())) => {}
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        error!("shutdown grace period elapsed, exiting with tasks still running");
    }

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
