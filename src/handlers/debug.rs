//! `GET /debug/cluster`: the membership snapshot the gossip actor keeps
//! current in a `watch` channel, read without ever blocking on the actor
//! itself.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;

use telemeter_cluster::MembershipSnapshot;

use crate::state::AppState;

pub async fn cluster(State(state): State<Arc<AppState>>) -> Json<MembershipSnapshot> {
    Json(state.store.debug_snapshot())
}
