//! `GET /federate`: renders every live batch this node's in-memory store
//! holds as Prometheus text exposition format, for scrape-based federation
//! into a downstream Prometheus. A disk-backed deployment has nothing to
//! serve here — [`telemeter_cluster::DiskStore::read_all`] is a
//! deliberate no-op — so this route returns an empty body rather than an
//! error in that configuration.

use std::sync::Arc;

use axum::extract::State;
use telemeter_cluster::Store;

use crate::state::AppState;

pub async fn federate(State(state): State<Arc<AppState>>) -> String {
    let batches = state.store.read_all().await;
    let families: Vec<_> = batches.into_iter().flat_map(|(_, families)| families).collect();
    metrics_model::write_text(&families)
}
