//! `evogate serve`: run the gateway until Ctrl+C.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use evogate::config::validate::{self, DiagnosticLevel};
use evogate::config::Config;
use evogate::gateway::{self, AppState};
use evogate::metrics::{self, UsageMetrics};
use evogate::session::Session;
use evogate::utils::logging::init_logging;
use evogate::whatsapp::build_client;

pub(crate) async fn cmd_serve(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: failed to load .env: {}", e);
        }
    }

    let mut config = Config::load_from_path(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    init_logging(&config.logging).context("Failed to initialize logging")?;

    let diagnostics = validate::validate_semantics(&config);
    for diag in &diagnostics {
        match diag.level {
            DiagnosticLevel::Error => error!("{}", diag),
            DiagnosticLevel::Warn => warn!("{}", diag),
            DiagnosticLevel::Ok => {}
        }
    }
    let errors = validate::count_level(&diagnostics, DiagnosticLevel::Error);
    if errors > 0 {
        anyhow::bail!(
            "Refusing to start with {} configuration error(s); run `evogate config check`",
            errors
        );
    }

    let client = build_client(&config.whatsapp).context("Failed to create WhatsApp client")?;
    info!(
        backend = client.name(),
        instance = %config.instance.name,
        "Starting evogate {}",
        env!("CARGO_PKG_VERSION")
    );

    let session = Arc::new(Session::new(client).with_print_qr(config.whatsapp.print_qr));
    let usage = Arc::new(UsageMetrics::new());
    let state = AppState::new(&config, Arc::clone(&session), Arc::clone(&usage));
    let app = gateway::build_router(Arc::clone(&state), &config);

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port))
        .await
        .with_context(|| {
            format!(
                "Failed to bind {}:{}",
                config.server.host, config.server.port
            )
        })?;
    let local_addr = listener.local_addr().context("Failed to read bound address")?;

    session
        .start()
        .await
        .context("Failed to start the WhatsApp session")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let flush = metrics::start_periodic_usage_flush(
        Arc::clone(&usage),
        config.metrics.flush_interval_secs,
        shutdown_rx.clone(),
    );
    let sweeper = gateway::start_rate_limit_sweeper(
        Arc::clone(&state),
        config.rate_limit.sweep_interval_secs,
        shutdown_rx,
    );

    info!("evogate listening on http://{}", local_addr);

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = session.shutdown().await {
        warn!("WhatsApp client shutdown failed: {}", e);
    }
    let _ = flush.await;
    let _ = sweeper.await;

    served.context("HTTP server error")?;
    info!("evogate stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Shutdown signal received, stopping server...");
}
