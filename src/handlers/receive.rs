//! `POST /metrics/v1/receive`: the v2 passthrough path. A client already
//! authenticated at the network edge (mTLS terminated by a proxy, or a
//! pre-shared secret the proxy injects as a header alongside the subject)
//! pushes an already-assembled remote-write `WriteRequest` straight
//! through to the forward target, after a label assertion pass.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use regex::Regex;

use metrics_model::remote_proto::WriteRequest;
use telemeter_transform::TransformError;

use crate::error::GatewayError;
use crate::state::RhelemeterState;

/// Matches the `CN=<value>` component of a proxy-injected subject header
/// such as `/O = example-org, /CN = node-1`, tolerating the whitespace
/// around `=` that mTLS-terminating proxies commonly emit.
fn common_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"CN\s*=\s*([A-Za-z0-9-]+)").expect("static regex is valid"))
}

/// Matches the `O=<value>` component of the same header; currently only
/// extracted for parity with the upstream proxy's subject format, not
/// enforced against anything.
fn organization_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"O\s*=\s*([A-Za-z0-9-]+)").expect("static regex is valid"))
}

/// Extracts the `CN` (and, if present, `O`) components from a raw
/// proxy-injected subject header value, e.g. `/O = test, /CN = test`.
fn parse_common_name(raw: &str) -> Option<String> {
    common_name_pattern()
        .captures(raw)
        .map(|c| c[1].to_string())
}

pub async fn receive(
    State(state): State<Arc<RhelemeterState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(), GatewayError> {
    let common_name = authenticate(&state, &headers)?;

    let capped = telemeter_validate::cap_bytes(&body, state.config.limit_receive_bytes)
        .map_err(|_| GatewayError::ReceiveBodyTooLarge)?;

    let decompressed = snap::raw::Decoder::new()
        .decompress_vec(capped)
        .map_err(|e| GatewayError::Decode(format!("failed to decompress snappy body: {e}")))?;

    let write_request: WriteRequest = prost::Message::decode(decompressed.as_slice())
        .map_err(|e| GatewayError::Decode(format!("failed to decode write request: {e}")))?;

    validate_labels(
        &write_request,
        &state.config.required_labels(),
        state.config.client_info_subject_label.as_deref(),
        common_name.as_deref(),
    )?;

    let Some(forward) = &state.forward else {
        tracing::debug!("no forward client configured; received batch accepted but not forwarded upstream");
        return Ok(());
    };

    // Stream the client's own compressed bytes upstream rather than
    // re-encoding `write_request` — it was only decoded to run the label
    // assertions above.
    forward
        .forward_compressed(capped)
        .await
        .map_err(|error| GatewayError::Forward {
            status: axum::http::StatusCode::BAD_GATEWAY,
            body: error.to_string(),
        })
}

/// Checks the pre-shared secret and recovers the proxy-injected subject, if
/// client-info authentication is configured. When it isn't, this process
/// trusts that the terminating proxy already validated the client
/// certificate before the request reached it.
fn authenticate(state: &RhelemeterState, headers: &HeaderMap) -> Result<Option<String>, GatewayError> {
    let Some(info) = &state.client_info else {
        return Ok(None);
    };

    let presented = headers
        .get(info.secret_header.as_str())
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::Forbidden("client secret header is missing".to_string()))?;
    if presented != info.secret {
        return Err(GatewayError::Forbidden("client secret does not match".to_string()));
    }

    let Some(raw_subject) = headers.get(info.common_name_header.as_str()).and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };

    if let Some(org) = organization_pattern().captures(raw_subject).map(|c| c[1].to_string()) {
        tracing::debug!(organization = %org, "client subject header carried an O= component");
    }

    Ok(parse_common_name(raw_subject))
}

fn validate_labels(
    request: &WriteRequest,
    required: &BTreeMap<String, String>,
    subject_label: Option<&str>,
    common_name: Option<&str>,
) -> Result<(), GatewayError> {
    for series in &request.timeseries {
        let family = series
            .labels
            .iter()
            .find(|l| l.name == metrics_model::METRIC_NAME_LABEL)
            .map(|l| l.value.clone())
            .unwrap_or_else(|| "(unnamed)".to_string());

        for (name, value) in required {
            let actual = series.labels.iter().find(|l| &l.name == name).map(|l| l.value.as_str());
            match actual {
                None => {
                    return Err(GatewayError::Transform(TransformError::RequiredLabelMissing {
                        family,
                        label: name.clone(),
                    }))
                }
                Some(found) if found != value => {
                    return Err(GatewayError::Transform(TransformError::RequiredLabelValueMismatch {
                        family,
                        label: name.clone(),
                    }))
                }
                _ => {}
            }
        }

        if let (Some(label_name), Some(cn)) = (subject_label, common_name) {
            let actual = series.labels.iter().find(|l| l.name == label_name).map(|l| l.value.as_str());
            if actual != Some(cn) {
                return Err(GatewayError::BadRequest(format!(
                    "time-series label `{label_name}` does not match the authenticated client's subject"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClientInfo, LogFormat, RhelemeterConfig};
    use metrics_model::remote_proto::{Label, Sample, TimeSeries};

    fn psk_state(client_info: ClientInfo) -> RhelemeterState {
        RhelemeterState {
            config: RhelemeterConfig {
                listen: "0.0.0.0:9005".parse().unwrap(),
                listen_internal: "127.0.0.1:9006".parse().unwrap(),
                tls_crt: None,
                tls_key: None,
                tls_ca_crt: None,
                client_info_data_file: None,
                client_info_subject_label: None,
                required_label: Vec::new(),
                forward_url: None,
                tenant_id: None,
                limit_receive_bytes: 15 * 1024,
                log_format: LogFormat::Text,
            },
            client_info: Some(client_info),
            forward: None,
        }
    }

    fn client_info() -> ClientInfo {
        ClientInfo {
            secret: "super-secret".to_string(),
            common_name_header: "x-common-name".to_string(),
            secret_header: "x-secret".to_string(),
        }
    }

    #[test]
    fn rejects_a_request_with_no_secret_header_as_forbidden() {
        let state = psk_state(client_info());
        let err = authenticate(&state, &HeaderMap::new()).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn rejects_a_wrong_secret_as_forbidden() {
        let state = psk_state(client_info());
        let mut headers = HeaderMap::new();
        headers.insert("x-secret", "wrong".parse().unwrap());
        let err = authenticate(&state, &headers).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }

    #[test]
    fn accepts_the_configured_secret_and_extracts_the_common_name() {
        let state = psk_state(client_info());
        let mut headers = HeaderMap::new();
        headers.insert("x-secret", "super-secret".parse().unwrap());
        headers.insert("x-common-name", "/O = test, /CN = test".parse().unwrap());
        assert_eq!(authenticate(&state, &headers).unwrap(), Some("test".to_string()));
    }

    fn series_with(labels: &[(&str, &str)]) -> TimeSeries {
        TimeSeries {
            labels: labels
                .iter()
                .map(|(n, v)| Label {
                    name: n.to_string(),
                    value: v.to_string(),
                })
                .collect(),
            samples: vec![Sample { value: 1.0, timestamp: 0 }],
        }
    }

    fn required(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn passes_when_every_series_carries_the_required_label() {
        let request = WriteRequest {
            timeseries: vec![series_with(&[("__name__", "up"), ("_id", "cluster1")])],
        };
        assert!(validate_labels(&request, &required(&[("_id", "cluster1")]), None, None).is_ok());
    }

    #[test]
    fn rejects_a_series_missing_the_required_label() {
        let request = WriteRequest {
            timeseries: vec![series_with(&[("__name__", "up")])],
        };
        let err = validate_labels(&request, &required(&[("_id", "cluster1")]), None, None).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Transform(TransformError::RequiredLabelMissing { .. })
        ));
    }

    #[test]
    fn rejects_a_subject_label_that_does_not_match_the_common_name() {
        let request = WriteRequest {
            timeseries: vec![series_with(&[("__name__", "up"), ("node", "other-host")])],
        };
        let err = validate_labels(&request, &BTreeMap::new(), Some("node"), Some("this-host")).unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[test]
    fn accepts_a_subject_label_matching_the_common_name() {
        let request = WriteRequest {
            timeseries: vec![series_with(&[("__name__", "up"), ("node", "this-host")])],
        };
        assert!(validate_labels(&request, &BTreeMap::new(), Some("node"), Some("this-host")).is_ok());
    }

    #[test]
    fn extracts_common_name_from_a_proxy_injected_subject_header() {
        assert_eq!(parse_common_name("/O = test, /CN = test"), Some("test".to_string()));
        assert_eq!(parse_common_name("/CN=node-1"), Some("node-1".to_string()));
        assert_eq!(parse_common_name("no subject here"), None);
    }
}
