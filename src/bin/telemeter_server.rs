//! `telemeter`: the v1 federation gateway binary. Parses CLI flags, builds
//! the shared [`telemeter::state::AppState`], and serves the external
//! (authorize/upload) and internal (federate/health/debug) listeners
//! side by side until a shutdown signal arrives.

use clap::Parser;

use telemeter::config::{GatewayConfig, LogFormat};
use telemeter::router::{telemeter_external_router, telemeter_internal_router};
use telemeter::state::AppState;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::parse();
    init_tracing(config.log_format);

    if config.tls_crt.is_some() || config.tls_key.is_some() {
        tracing::warn!(
            "tls-crt/tls-key configured, but this build terminates TLS at a reverse proxy rather \
             than in-process; the external listener binds plain HTTP regardless"
        );
    }

    let external_addr = config.listen;
    let internal_addr = config.listen_internal;

    let state = AppState::build(config).await?;
    tracing::info!(member = %state.store.self_name(), "telemeter gateway starting");

    let external = axum::Server::bind(&external_addr)
        .serve(telemeter_external_router(state.clone()).into_make_service());
    let internal = axum::Server::bind(&internal_addr)
        .serve(telemeter_internal_router(state.clone()).into_make_service());

    tracing::info!(%external_addr, %internal_addr, "listening");

    let external = external.with_graceful_shutdown(shutdown_signal());
    let internal = internal.with_graceful_shutdown(shutdown_signal());

    let (external_result, internal_result) = tokio::join!(external, internal);
    external_result?;
    internal_result?;

    tracing::info!("telemeter gateway shut down cleanly");
    Ok(())
}

/// Resolves on SIGINT (and, on Unix, SIGTERM) so both listeners and every
/// background task tied to this signal wind down together rather than
/// leaving one half of the process running after the other exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install the Ctrl+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install the SIGTERM signal handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining in-flight requests");
}
