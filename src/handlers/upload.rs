//! `POST /upload`: the v1 ingestion path. Runs the full chain the module
//! doc for [`crate::handlers`] describes — auth, partition extraction,
//! rate limiting, decode, the transformer pipeline, local storage, and
//! (if configured) forwarding upstream as a remote-write request.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, StatusCode};

use metrics_model::{proto, MetricFamily};
use telemeter_forward::ForwardError;
use telemeter_jwt::Client;
use telemeter_transform::{
    filter, pack_families, run_upload_pipeline, Elide, LabelTransform, OverwriteTimestamps,
    RenameMetrics, RequiredLabels, Whitelist,
};

use crate::error::GatewayError;
use crate::state::AppState;

/// How far back a sample's timestamp may lag the ingest time before
/// [`run_upload_pipeline`] rejects it.
const MAX_SAMPLE_AGE_MS: i64 = 10 * 60 * 1000;
/// Above this much mean timestamp drift between a batch's samples and the
/// ingest time, the drift is logged — the batch is still accepted.
const DRIFT_WARN_MS: i64 = 10_000;
const FORWARD_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(client): Extension<Client>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), GatewayError> {
    let validated = telemeter_validate::validate_upload(
        Some(&client),
        &state.config.partition_label,
        state.config.limit_bytes,
    )?;

    state.rate_limiter.allow(&validated.partition_key)?;

    let decompressed = maybe_decompress(&headers, &body)?;
    let capped = telemeter_validate::cap_bytes(&decompressed, validated.limit_bytes)?;
    let mut families = decode_families(&headers, capped)?;

    if !state.whitelist.is_empty() {
        filter(&mut families, &Whitelist::new(state.whitelist.clone()))?;
    }

    let mut fixed_labels = state.config.fixed_labels();
    fixed_labels.push((state.config.partition_label.clone(), validated.partition_key.clone()));
    filter(&mut families, &LabelTransform::fixed(fixed_labels))?;

    if !state.config.elide_label.is_empty() {
        filter(&mut families, &Elide::new(state.config.elide_label.clone()))?;
    }

    let rename_table = state.config.rename_table();
    if !rename_table.is_empty() {
        filter(&mut families, &RenameMetrics::new(rename_table))?;
    }

    let now = now_ms();
    let mut required = state.config.required_labels();
    required.insert(state.config.partition_label.clone(), validated.partition_key.clone());
    let required_labels = RequiredLabels::new(required);
    let overwrite_timestamps = OverwriteTimestamps::new(now, &state.drift_counters);
    run_upload_pipeline(
        &mut families,
        now - MAX_SAMPLE_AGE_MS,
        &required_labels,
        &overwrite_timestamps,
    )?;

    let families = pack_families(families);

    state
        .store
        .write(&validated.partition_key, families.clone())
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

    forward(&state, &validated.partition_key, &families, now).await
}

async fn forward(
    state: &AppState,
    partition_key: &str,
    families: &[MetricFamily],
    now_ms: i64,
) -> Result<(), GatewayError> {
    let Some(client) = &state.forward else {
        tracing::debug!(partition = partition_key, "no forward client configured; batch stored locally only");
        return Ok(());
    };

    let (write_request, future_capped) = telemeter_remote_write::convert(families, now_ms)
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    if future_capped > 0 {
        tracing::warn!(future_capped, partition = partition_key, "capped future-dated samples to the ingest time");
    }

    let (before, within, after) = state.drift_counters.snapshot();
    if after > 0 {
        tracing::warn!(
            partition = partition_key,
            before_window = before,
            within_window = within,
            after_window = after,
            "some samples in this batch drifted more than {}ms from the ingest time",
            DRIFT_WARN_MS
        );
    }

    match tokio::time::timeout(FORWARD_TIMEOUT, client.forward(&write_request)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(forward_error_to_gateway_error(error)),
        Err(_) => Err(GatewayError::Forward {
            status: StatusCode::GATEWAY_TIMEOUT,
            body: "forward request timed out".to_string(),
        }),
    }
}

fn forward_error_to_gateway_error(error: ForwardError) -> GatewayError {
    let status = match &error {
        ForwardError::Upstream { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        ForwardError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    };
    GatewayError::Forward {
        status,
        body: error.to_string(),
    }
}

fn maybe_decompress(headers: &HeaderMap, body: &Bytes) -> Result<Vec<u8>, GatewayError> {
    let is_snappy = headers
        .get(axum::http::header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("snappy"))
        .unwrap_or(false);
    if !is_snappy {
        return Ok(body.to_vec());
    }
    snap::raw::Decoder::new()
        .decompress_vec(body)
        .map_err(|e| GatewayError::Decode(format!("failed to decompress snappy body: {e}")))
}

fn decode_families(headers: &HeaderMap, body: &[u8]) -> Result<Vec<Option<MetricFamily>>, GatewayError> {
    let is_protobuf = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("protobuf"))
        .unwrap_or(false);

    if is_protobuf {
        let decoded: Vec<proto::MetricFamily> =
            metrics_model::read_delimited(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(decoded.into_iter().map(|f| Some(MetricFamily::from_proto(f))).collect())
    } else {
        let text = std::str::from_utf8(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let parsed = metrics_model::parse_text(text).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(parsed.into_iter().map(Some).collect())
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}
