//! `GET /healthz` and `GET /healthz/ready`: liveness and readiness probes.
//! Neither depends on the store, authorizer, or forward client — if the
//! process can answer HTTP at all, it answers both the same way. A gateway
//! node never has a meaningful "not ready yet" phase: the ring and store
//! are constructed before the listener binds, so by the time a probe can
//! reach this handler the process is already serving traffic.

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn healthz_ready() -> &'static str {
    "ok"
}
