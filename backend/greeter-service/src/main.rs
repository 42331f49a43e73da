/// Greeter Service Main Entry Point
///
/// Starts gRPC server with:
/// - Bearer token guard chain in front of the Greeter service
/// - gRPC health service (not behind the guards)
/// - Optional TLS (mandatory in production/staging)
use anyhow::{Context, Result};
use crypto_core::SecretStrength;
use greeter_service::{
    config::{Settings, DEFAULT_LOG_FILTER},
    grpc::{
        greeter::v1::greeter_server::GreeterServer,
        server::default_guards,
    },
    GreeterDispatcher, GreeterService, WorkerPool,
};
use tokio::signal;
use tonic::transport::Server;
use tracing::{error, info, warn};

/// Days of remaining certificate validity below which startup warns
const CERT_EXPIRY_WARN_DAYS: u64 = 30;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()))
        .with_target(false)
        .json()
        .init();

    info!("Starting Greeter Service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!(
        worker_pool_size = settings.dispatch.worker_pool_size,
        stream_pacing_ms = settings.dispatch.stream_pacing.as_millis() as u64,
        issuer_enforced = settings.jwt.issuer.is_enforced(),
        audience_enforced = settings.jwt.audience.is_enforced(),
        "Configuration loaded successfully"
    );

    if settings.jwt.secret.strength() == SecretStrength::Weak {
        warn!("JWT_SECRET is weak; use at least 32 random bytes");
    }

    let addr = settings.server.addr()?;

    let tls_config = settings.server_tls()?;
    if let Some(cfg) = &tls_config {
        if let Err(err) = grpc_tls::validate_cert_expiration(&cfg.cert_pem, CERT_EXPIRY_WARN_DAYS) {
            warn!(error = %err, "Server certificate validity could not be confirmed");
        }
    }

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<GreeterServer<GreeterService>>()
        .await;

    let greeter = GreeterService::new(
        GreeterDispatcher::new(settings.dispatch.stream_pacing),
        WorkerPool::new(settings.dispatch.worker_pool_size),
    )
    .into_server(default_guards(
        settings.jwt.secret.clone(),
        settings.jwt.constraints(),
    ));

    let mut server_builder = Server::builder();
    if let Some(cfg) = tls_config {
        let server_tls = cfg
            .build_server_tls()
            .context("Failed to build server TLS config")?;
        server_builder = server_builder
            .tls_config(server_tls)
            .context("Failed to configure gRPC TLS")?;
    }

    info!("Starting gRPC server on {}", addr);

    server_builder
        .add_service(health_service)
        .add_service(greeter)
        .serve_with_shutdown(addr, shutdown_signal())
        .await
        .context("gRPC server error")?;

    info!("Greeter service shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
