//! Command-line configuration for both binaries. `telemeter` and
//! `rhelemeter` share every library crate but expose distinct flag
//! surfaces, so each gets its own [`clap::Parser`] struct rather than one
//! struct with fields that don't apply to both.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use telemeter_transform::Rule;

/// How `tracing_subscriber` renders log lines. Plain text on a terminal,
/// JSON when shipped to a log aggregator.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Parses a `key=value` CLI argument, used for `--label` and
/// `--required-label`.
fn parse_key_val(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{input}`"))?;
    if key.is_empty() {
        return Err("label key must not be empty".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parses a duration given as a Go-style string (`4m30s`, `10m`, `1h`) or a
/// bare number of seconds.
fn parse_duration(input: &str) -> Result<Duration, String> {
    humantime_duration(input).ok_or_else(|| format!("invalid duration `{input}`"))
}

fn humantime_duration(input: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut saw_unit = false;
    for ch in input.chars() {
        if ch.is_ascii_digit() || ch == '.' {
            digits.push(ch);
            continue;
        }
        let value: f64 = digits.parse().ok()?;
        digits.clear();
        let unit = match ch {
            'h' => 3600.0,
            'm' => 60.0,
            's' => 1.0,
            _ => return None,
        };
        total += Duration::from_secs_f64(value * unit);
        saw_unit = true;
    }
    if !digits.is_empty() {
        let value: f64 = digits.parse().ok()?;
        total += Duration::from_secs_f64(value);
        saw_unit = true;
    }
    saw_unit.then_some(total)
}

/// Parses a single whitelist rule: either a bare metric name (`up`) or a
/// label-selector (`up{job="api",env="prod"}`), mirroring PromQL's
/// instant-vector selector syntax.
fn parse_whitelist_rule(input: &str) -> Result<Rule, String> {
    let mut rule = Rule::new();
    let input = input.trim();
    let Some(brace) = input.find('{') else {
        rule.insert("__name__".to_string(), input.to_string());
        return Ok(rule);
    };
    let (name, rest) = input.split_at(brace);
    if !name.is_empty() {
        rule.insert("__name__".to_string(), name.to_string());
    }
    let rest = rest
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| format!("malformed selector `{input}`"))?;
    for pair in rest.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("malformed label pair `{pair}` in `{input}`"))?;
        let value = value.trim().trim_matches('"');
        rule.insert(key.trim().to_string(), value.to_string());
    }
    Ok(rule)
}

/// The v1 `telemeter` gateway's full CLI surface.
#[derive(Debug, Parser)]
#[command(name = "telemeter", about = "Prometheus federation gateway")]
pub struct GatewayConfig {
    /// External-facing listen address (authorize/upload).
    #[arg(long, env = "TELEMETER_LISTEN", default_value = "0.0.0.0:9003")]
    pub listen: SocketAddr,

    /// Internal listen address (federate/debug/health).
    #[arg(long, env = "TELEMETER_LISTEN_INTERNAL", default_value = "127.0.0.1:9004")]
    pub listen_internal: SocketAddr,

    /// Gossip bind address; presence enables cluster mode.
    #[arg(long, env = "TELEMETER_LISTEN_CLUSTER")]
    pub listen_cluster: Option<SocketAddr>,

    /// Other cluster members to join at startup.
    #[arg(long = "join", env = "TELEMETER_JOIN", value_delimiter = ',')]
    pub join: Vec<SocketAddr>,

    /// Stable name for this cluster member. Defaults to hostname plus a
    /// random suffix when unset.
    #[arg(long, env = "TELEMETER_MEMBER_NAME")]
    pub member_name: Option<String>,

    /// Path to a shared secret that encrypts and authenticates gossip
    /// traffic between cluster members. Falls back to `--shared-key` when
    /// absent, since a clustered deployment needs that configured anyway;
    /// only matters once `--listen-cluster` is set.
    #[arg(long = "cluster-secret", env = "TELEMETER_CLUSTER_SECRET")]
    pub cluster_secret: Option<PathBuf>,

    #[arg(long = "tls-crt", env = "TELEMETER_TLS_CRT")]
    pub tls_crt: Option<PathBuf>,
    #[arg(long = "tls-key", env = "TELEMETER_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
    #[arg(long = "tls-ca-crt", env = "TELEMETER_TLS_CA_CRT")]
    pub tls_ca_crt: Option<PathBuf>,
    #[arg(long = "internal-tls-crt", env = "TELEMETER_INTERNAL_TLS_CRT")]
    pub internal_tls_crt: Option<PathBuf>,
    #[arg(long = "internal-tls-key", env = "TELEMETER_INTERNAL_TLS_KEY")]
    pub internal_tls_key: Option<PathBuf>,

    /// Raw secret used as the HMAC key for issued JWTs. A fresh random
    /// secret is generated (and a warning logged) when this is absent,
    /// which only makes sense for a single, non-clustered node — every
    /// restart invalidates tokens issued before it.
    #[arg(long = "shared-key", env = "TELEMETER_SHARED_KEY")]
    pub shared_key: Option<PathBuf>,

    #[arg(long = "token-expire-seconds", env = "TELEMETER_TOKEN_EXPIRE_SECONDS", default_value_t = 86400)]
    pub token_expire_seconds: i64,

    #[arg(long = "partition-label", env = "TELEMETER_PARTITION_LABEL", default_value = "_id")]
    pub partition_label: String,

    /// Upstream Tollbooth-compatible authorization URL. A deterministic
    /// stub authorizer is used when this is absent.
    #[arg(long = "authorize", env = "TELEMETER_AUTHORIZE_URL")]
    pub authorize_url: Option<String>,

    #[arg(long = "oidc-issuer", env = "TELEMETER_OIDC_ISSUER")]
    pub oidc_issuer: Option<String>,
    #[arg(long = "oidc-token-url", env = "TELEMETER_OIDC_TOKEN_URL")]
    pub oidc_token_url: Option<String>,
    #[arg(long = "client-id", env = "TELEMETER_CLIENT_ID")]
    pub client_id: Option<String>,
    #[arg(long = "client-secret", env = "TELEMETER_CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Upstream remote-write URL. Batches are logged and dropped when this
    /// is absent, which is convenient for local testing against `/federate`
    /// alone.
    #[arg(long = "forward-url", env = "TELEMETER_FORWARD_URL")]
    pub forward_url: Option<String>,

    #[arg(long = "tenant-id", env = "TELEMETER_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long = "whitelist", value_parser = parse_whitelist_rule)]
    pub whitelist: Vec<Rule>,
    #[arg(long = "whitelist-file")]
    pub whitelist_file: Option<PathBuf>,
    #[arg(long = "elide-label")]
    pub elide_label: Vec<String>,
    #[arg(long = "label", value_parser = parse_key_val)]
    pub label: Vec<(String, String)>,
    #[arg(long = "required-label", value_parser = parse_key_val)]
    pub required_label: Vec<(String, String)>,
    #[arg(long = "rename-metric", value_parser = parse_key_val)]
    pub rename_metric: Vec<(String, String)>,

    #[arg(long = "ratelimit", value_parser = parse_duration, default_value = "4m30s")]
    pub ratelimit: Duration,

    #[arg(long = "ttl", value_parser = parse_duration, default_value = "10m")]
    pub ttl: Duration,

    #[arg(long = "limit-bytes", default_value_t = telemeter_validate::DEFAULT_LIMIT_BYTES)]
    pub limit_bytes: usize,

    #[arg(long = "storage-dir")]
    pub storage_dir: Option<PathBuf>,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// The full required-label table: `--required-label` entries plus the
    /// partition label itself, which every federation consumer implicitly
    /// requires.
    pub fn required_labels(&self) -> BTreeMap<String, String> {
        self.required_label.iter().cloned().collect()
    }

    pub fn fixed_labels(&self) -> Vec<(String, String)> {
        self.label.clone()
    }

    pub fn rename_table(&self) -> BTreeMap<String, String> {
        self.rename_metric.iter().cloned().collect()
    }

    /// `--whitelist` rules plus, if configured, one rule per non-empty,
    /// non-comment line of `--whitelist-file`, in the same `up` /
    /// `up{job="api"}` selector syntax as the CLI flag.
    pub fn effective_whitelist(&self) -> anyhow::Result<Vec<Rule>> {
        let mut rules = self.whitelist.clone();
        if let Some(path) = &self.whitelist_file {
            let contents = std::fs::read_to_string(path)?;
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                rules.push(parse_whitelist_rule(line).map_err(anyhow::Error::msg)?);
            }
        }
        Ok(rules)
    }
}

/// The v2 `rhelemeter` variant's CLI surface: no JWT exchange, no cluster
/// plane, no transformer pipeline beyond required-label assertion — just
/// mTLS/PSK authentication and remote-write passthrough.
#[derive(Debug, Parser)]
#[command(name = "rhelemeter", about = "TLS-authenticated remote-write receiver")]
pub struct RhelemeterConfig {
    #[arg(long, env = "RHELEMETER_LISTEN", default_value = "0.0.0.0:9005")]
    pub listen: SocketAddr,

    #[arg(long, env = "RHELEMETER_LISTEN_INTERNAL", default_value = "127.0.0.1:9006")]
    pub listen_internal: SocketAddr,

    #[arg(long = "tls-crt", env = "RHELEMETER_TLS_CRT")]
    pub tls_crt: Option<PathBuf>,
    #[arg(long = "tls-key", env = "RHELEMETER_TLS_KEY")]
    pub tls_key: Option<PathBuf>,
    #[arg(long = "tls-ca-crt", env = "RHELEMETER_TLS_CA_CRT")]
    pub tls_ca_crt: Option<PathBuf>,

    /// Path to a JSON file describing the pre-shared-key authentication
    /// mode: `{"secret": ..., "common_name_header": ..., "secret_header": ...}`.
    /// When absent, authentication falls back to mTLS via `tls-ca-crt`.
    #[arg(long = "client-info-data-file", env = "RHELEMETER_CLIENT_INFO_DATA_FILE")]
    pub client_info_data_file: Option<PathBuf>,

    /// A time-series label asserted to equal the extracted client CN.
    #[arg(long = "client-info-subject-label", env = "RHELEMETER_CLIENT_INFO_SUBJECT_LABEL")]
    pub client_info_subject_label: Option<String>,

    #[arg(long = "required-label", value_parser = parse_key_val)]
    pub required_label: Vec<(String, String)>,

    #[arg(long = "forward-url", env = "RHELEMETER_FORWARD_URL")]
    pub forward_url: Option<String>,
    #[arg(long = "tenant-id", env = "RHELEMETER_TENANT_ID")]
    pub tenant_id: Option<String>,

    #[arg(long = "limit-receive-bytes", default_value_t = 15 * 1024)]
    pub limit_receive_bytes: usize,

    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl RhelemeterConfig {
    pub fn required_labels(&self) -> BTreeMap<String, String> {
        self.required_label.iter().cloned().collect()
    }
}

/// The pre-shared-key client info a `rhelemeter` deployment behind an mTLS
/// proxy is configured with, loaded from `--client-info-data-file`.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ClientInfo {
    pub secret: String,
    pub common_name_header: String,
    pub secret_header: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds_and_compound_durations() {
        assert_eq!(humantime_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(
            humantime_duration("4m30s"),
            Some(Duration::from_secs(270))
        );
        assert_eq!(humantime_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(humantime_duration("1h"), Some(Duration::from_secs(3600)));
    }

    #[test]
    fn parses_a_bare_metric_name_whitelist_rule() {
        let rule = parse_whitelist_rule("up").unwrap();
        assert_eq!(rule.get("__name__"), Some(&"up".to_string()));
        assert_eq!(rule.len(), 1);
    }

    #[test]
    fn parses_a_selector_style_whitelist_rule() {
        let rule = parse_whitelist_rule(r#"up{job="api"}"#).unwrap();
        assert_eq!(rule.get("__name__"), Some(&"up".to_string()));
        assert_eq!(rule.get("job"), Some(&"api".to_string()));
    }

    #[test]
    fn rejects_a_key_val_pair_with_no_separator() {
        assert!(parse_key_val("not-a-pair").is_err());
    }
}
