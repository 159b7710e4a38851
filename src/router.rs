//! Assembles the axum [`Router`]s both binaries serve. Each binary binds
//! two listeners — an external one (auth/ingest) and an internal one
//! (federation/health/debug) — so operators can put only the external
//! listener behind a public load balancer.

use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers;
use crate::middleware::verify_jwt;
use crate::state::{AppState, RhelemeterState};

/// `/authorize` requests are a bearer token plus a short form body; there's
/// no reason to let one run past a few KiB.
const AUTHORIZE_BODY_LIMIT: usize = 4 * 1024;

/// A hard, last-resort ceiling on `/upload` request bodies, well above any
/// sane `--limit-bytes` configuration. `telemeter_validate::cap_bytes`
/// enforces the configured limit itself and is what's meant to reject an
/// over-limit upload (with the documented 500 + "incoming sample data is
/// too long"); this layer exists only to stop an unbounded body from being
/// buffered into memory at all, not to duplicate that check at the
/// configured limit, which would otherwise reject the request with an
/// empty 413 before the handler — and its error body — ever runs.
const UPLOAD_BODY_HARD_CEILING: usize = 64 * 1024 * 1024;

/// The `telemeter` external router: `/`, `/authorize`, and JWT-gated
/// `/upload`. `/upload`'s body is only capped here at
/// [`UPLOAD_BODY_HARD_CEILING`] — the configured `--limit-bytes` is
/// enforced inside the handler, where an over-limit body produces the
/// documented error response rather than an empty 413.
pub fn telemeter_external_router(state: Arc<AppState>) -> Router {
    let upload_route = Router::new()
        .route("/upload", post(handlers::upload::upload))
        .route_layer(from_fn_with_state(state.clone(), verify_jwt))
        .layer(RequestBodyLimitLayer::new(UPLOAD_BODY_HARD_CEILING));

    Router::new()
        .route("/", get(handlers::index::telemeter_index))
        .route("/healthz", get(handlers::health::healthz))
        .route("/healthz/ready", get(handlers::health::healthz_ready))
        .route(
            "/authorize",
            post(handlers::authorize::authorize).layer(RequestBodyLimitLayer::new(AUTHORIZE_BODY_LIMIT)),
        )
        .merge(upload_route)
        .with_state(state)
}

/// The `telemeter` internal router: federation scraping, health, and the
/// cluster membership debug endpoint. Meant to stay off any public
/// listener.
pub fn telemeter_internal_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/federate", get(handlers::federate::federate))
        .route("/healthz", get(handlers::health::healthz))
        .route("/healthz/ready", get(handlers::health::healthz_ready))
        .route("/debug/cluster", get(handlers::debug::cluster))
        .with_state(state)
}

/// The `rhelemeter` external router: `/`, health, and the receive
/// passthrough, capped at the configured receive size.
pub fn rhelemeter_external_router(state: Arc<RhelemeterState>) -> Router {
    let receive_limit = state.config.limit_receive_bytes;

    Router::new()
        .route("/", get(handlers::index::rhelemeter_index))
        .route("/healthz", get(handlers::health::healthz))
        .route("/healthz/ready", get(handlers::health::healthz_ready))
        .route(
            "/metrics/v1/receive",
            post(handlers::receive::receive).layer(RequestBodyLimitLayer::new(receive_limit)),
        )
        .with_state(state)
}

/// The `rhelemeter` internal router: just health, since there's no
/// federation store or cluster plane on this side.
pub fn rhelemeter_internal_router(state: Arc<RhelemeterState>) -> Router {
    Router::new()
        .route("/healthz", get(handlers::health::healthz))
        .route("/healthz/ready", get(handlers::health::healthz_ready))
        .with_state(state)
}
