//! `GET /`: a minimal JSON path index, useful mostly for confirming which
//! binary and routes a given listener is actually serving.

use axum::response::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct PathIndex {
    #[serde(rename = "Paths")]
    pub paths: Vec<&'static str>,
}

pub async fn telemeter_index() -> Json<PathIndex> {
    Json(PathIndex {
        paths: vec![
            "/",
            "/healthz",
            "/healthz/ready",
            "/authorize",
            "/upload",
            "/federate",
            "/debug/cluster",
        ],
    })
}

pub async fn rhelemeter_index() -> Json<PathIndex> {
    Json(PathIndex {
        paths: vec!["/", "/healthz", "/healthz/ready", "/metrics/v1/receive"],
    })
}
