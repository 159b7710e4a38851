//! `rhelemeter`: the v2 TLS-authenticated remote-write receiver binary.
//! No JWT exchange, no cluster plane — just the mTLS/pre-shared-key
//! authenticated passthrough path, served the same dual-listener way as
//! `telemeter`.

use clap::Parser;

use telemeter::config::{LogFormat, RhelemeterConfig};
use telemeter::router::{rhelemeter_external_router, rhelemeter_internal_router};
use telemeter::state::RhelemeterState;

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
    let config = RhelemeterConfig::parse();
    init_tracing(config.log_format);

    if config.tls_ca_crt.is_some() {
        tracing::info!(
            "tls-ca-crt configured for mTLS; this build expects certificate verification to \
             happen at a terminating reverse proxy, which must inject the common-name/secret \
             headers this process's client-info authentication reads"
        );
    } else if config.client_info_data_file.is_none() {
        tracing::warn!(
            "neither --tls-ca-crt nor --client-info-data-file configured; every request to \
             /metrics/v1/receive will be accepted with no client authentication"
        );
    }

    let external_addr = config.listen;
    let internal_addr = config.listen_internal;

    let state = RhelemeterState::build(config)?;
    tracing::info!("rhelemeter receiver starting");

    let external = axum::Server::bind(&external_addr)
        .serve(rhelemeter_external_router(state.clone()).into_make_service());
    let internal = axum::Server::bind(&internal_addr)
        .serve(rhelemeter_internal_router(state.clone()).into_make_service());

    tracing::info!(%external_addr, %internal_addr, "listening");

    let external = external.with_graceful_shutdown(shutdown_signal());
    let internal = internal.with_graceful_shutdown(shutdown_signal());

    let (external_result, internal_result) = tokio::join!(external, internal);
    external_result?;
    internal_result?;

    tracing::info!("rhelemeter receiver shut down cleanly");
    Ok(())
}

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
