//! Validates an authenticated upload request: resolves the client's
//! partition key and enforces the request body's size cap before any
//! decoder sees it.

mod error;
mod limit;

pub use error::ValidateError;
pub use limit::cap_bytes;

use telemeter_jwt::Client;

/// Default v1 upload size cap (500 KiB).
pub const DEFAULT_LIMIT_BYTES: usize = 500 * 1024;

/// What an upload is keyed and capped by, once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUpload {
    pub partition_key: String,
    pub limit_bytes: usize,
}

/// Looks up the authenticated `client`, reads its partition label, and
/// pairs that with the configured byte cap. Does not decode or inspect the
/// request body itself — callers run [`cap_bytes`] against the body using
/// the returned limit, then hand it to the transformer pipeline.
pub fn validate_upload(
    client: Option<&Client>,
    partition_label: &str,
    limit_bytes: usize,
) -> Result<ValidatedUpload, ValidateError> {
    let client = client.ok_or(ValidateError::Unauthenticated)?;
    let partition_key = client
        .labels
        .get(partition_label)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| ValidateError::MissingPartitionLabel {
            label: partition_label.to_string(),
        })?;
    Ok(ValidatedUpload {
        partition_key,
        limit_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn client_with(labels: &[(&str, &str)]) -> Client {
        let mut map = BTreeMap::new();
        for (k, v) in labels {
            map.insert(k.to_string(), v.to_string());
        }
        Client {
            id: "account-1".to_string(),
            labels: map,
        }
    }

    #[test]
    fn errors_when_no_client_is_present() {
        assert_eq!(
            validate_upload(None, "_id", DEFAULT_LIMIT_BYTES),
            Err(ValidateError::Unauthenticated)
        );
    }

    #[test]
    fn errors_when_the_partition_label_is_absent() {
        let client = client_with(&[]);
        assert_eq!(
            validate_upload(Some(&client), "_id", DEFAULT_LIMIT_BYTES),
            Err(ValidateError::MissingPartitionLabel {
                label: "_id".to_string()
            })
        );
    }

    #[test]
    fn errors_when_the_partition_label_is_empty() {
        let client = client_with(&[("_id", "")]);
        assert_eq!(
            validate_upload(Some(&client), "_id", DEFAULT_LIMIT_BYTES),
            Err(ValidateError::MissingPartitionLabel {
                label: "_id".to_string()
            })
        );
    }

    #[test]
    fn returns_the_partition_key_and_limit() {
        let client = client_with(&[("_id", "cluster1")]);
        let validated = validate_upload(Some(&client), "_id", DEFAULT_LIMIT_BYTES).unwrap();
        assert_eq!(validated.partition_key, "cluster1");
        assert_eq!(validated.limit_bytes, DEFAULT_LIMIT_BYTES);
    }
}
