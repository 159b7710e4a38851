use std::collections::BTreeMap;

use base64::Engine;
use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde_json::Value;

use crate::claims::Claims;
use crate::error::VerifyError;
use crate::key::{sniff_kind, KeyKind};

/// An authenticated client identity recovered from a verified token: the
/// subject claim plus whatever labels the issuer attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    pub id: String,
    pub labels: BTreeMap<String, String>,
}

struct ConfiguredKey {
    decoding_key: DecodingKey,
    algorithm: jsonwebtoken::Algorithm,
}

/// Verifies tokens issued by [`crate::signer::Signer`] against a fixed
/// issuer, a set of acceptable audiences, and one or more trusted public
/// keys, per the verification procedure described for the telemeter token
/// format: reject on issuer mismatch before attempting any signature check,
/// then try each configured key in turn, validating expiry and audience
/// along the way.
pub struct Verifier {
    keys: Vec<ConfiguredKey>,
    issuer: String,
    audiences: Vec<String>,
}

impl Verifier {
    pub fn new(
        public_keys: Vec<Vec<u8>>,
        issuer: String,
        audiences: Vec<String>,
    ) -> Result<Self, VerifyError> {
        let keys = public_keys
            .iter()
            .map(|pem| {
                let kind = sniff_kind(pem).map_err(|_| VerifyError::Malformed)?;
                let decoding_key = match kind {
                    KeyKind::Rsa => {
                        DecodingKey::from_rsa_pem(pem).map_err(|_| VerifyError::Malformed)?
                    }
                    KeyKind::EcP256 | KeyKind::EcP384 => {
                        DecodingKey::from_ec_pem(pem).map_err(|_| VerifyError::Malformed)?
                    }
                };
                Ok(ConfiguredKey {
                    decoding_key,
                    algorithm: kind.algorithm(),
                })
            })
            .collect::<Result<Vec<_>, VerifyError>>()?;

        Ok(Verifier {
            keys,
            issuer,
            audiences,
        })
    }

    /// Builds a verifier trusting a single raw HMAC secret, mirroring
    /// [`crate::signer::Signer::from_hmac_secret`].
    pub fn with_hmac_secret(secret: &[u8], issuer: String, audiences: Vec<String>) -> Self {
        Verifier {
            keys: vec![ConfiguredKey {
                decoding_key: DecodingKey::from_secret(secret),
                algorithm: jsonwebtoken::Algorithm::HS256,
            }],
            issuer,
            audiences,
        }
    }

    /// Verifies `token`, returning the client it identifies.
    ///
    /// The issuer is checked against the unverified payload first so a
    /// token minted by an unrelated issuer is rejected without spending a
    /// signature check against every configured key. Signature failures
    /// across all configured keys collapse into a single
    /// [`VerifyError::InvalidSignature`]; expiry/not-yet-valid take
    /// precedence when every key agrees the token is simply out of its
    /// validity window.
    pub fn verify(&self, token: &str) -> Result<Client, VerifyError> {
        let unverified = unverified_payload(token)?;
        let iss = unverified
            .get("iss")
            .and_then(Value::as_str)
            .ok_or(VerifyError::Malformed)?;
        if iss != self.issuer {
            return Err(VerifyError::BadIssuer);
        }

        let mut last_err = VerifyError::InvalidSignature;
        for key in &self.keys {
            let mut validation = Validation::new(key.algorithm);
            validation.validate_exp = true;
            validation.validate_nbf = true;
            validation.validate_aud = false;
            validation.required_spec_claims.clear();

            match decode::<Claims>(token, &key.decoding_key, &validation) {
                Ok(data) => {
                    let claims = data.claims;
                    if !claims.aud.intersects(&self.audiences) {
                        return Err(VerifyError::BadAudience);
                    }
                    return Ok(Client {
                        id: claims.sub,
                        labels: claims.private.labels,
                    });
                }
                Err(err) => match err.kind() {
                    ErrorKind::ExpiredSignature => last_err = VerifyError::TokenExpired,
                    ErrorKind::ImmatureSignature => last_err = VerifyError::TokenNotYetValid,
                    ErrorKind::InvalidToken
                    | ErrorKind::Json(_)
                    | ErrorKind::Utf8(_)
                    | ErrorKind::Base64(_) => return Err(VerifyError::Malformed),
                    _ => {
                        if !matches!(
                            last_err,
                            VerifyError::TokenExpired | VerifyError::TokenNotYetValid
                        ) {
                            last_err = VerifyError::InvalidSignature;
                        }
                    }
                },
            }
        }
        Err(last_err)
    }
}

fn unverified_payload(token: &str) -> Result<Value, VerifyError> {
    let payload_segment = token
        .split('.')
        .nth(1)
        .ok_or(VerifyError::Malformed)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload_segment)
        .map_err(|_| VerifyError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| VerifyError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::Signer;

    const TEST_EC_KEY: &str = include_str!("../testdata/ec256-private.pem");
    const TEST_EC_PUB: &str = include_str!("../testdata/ec256-public.pem");
    const OTHER_EC_PUB: &str = include_str!("../testdata/ec256-other-public.pem");

    fn issue(expire_seconds: i64) -> String {
        let signer = Signer::from_pem(TEST_EC_KEY.as_bytes()).unwrap();
        signer
            .issue(
                "account-1",
                BTreeMap::new(),
                "telemeter",
                "telemeter-client",
                expire_seconds,
            )
            .unwrap()
    }

    fn verifier_with(pub_pem: &str) -> Verifier {
        Verifier::new(
            vec![pub_pem.as_bytes().to_vec()],
            "telemeter".to_string(),
            vec!["telemeter-client".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn rejects_a_token_signed_by_a_disjoint_key() {
        let token = issue(3600);
        let verifier = verifier_with(OTHER_EC_PUB);
        assert_eq!(verifier.verify(&token), Err(VerifyError::InvalidSignature));
    }

    #[test]
    fn rejects_an_expired_token() {
        let token = issue(-60);
        let verifier = verifier_with(TEST_EC_PUB);
        assert_eq!(verifier.verify(&token), Err(VerifyError::TokenExpired));
    }

    #[test]
    fn rejects_a_mismatched_issuer() {
        let token = issue(3600);
        let verifier = Verifier::new(
            vec![TEST_EC_PUB.as_bytes().to_vec()],
            "someone-else".to_string(),
            vec!["telemeter-client".to_string()],
        )
        .unwrap();
        assert_eq!(verifier.verify(&token), Err(VerifyError::BadIssuer));
    }

    #[test]
    fn rejects_an_audience_the_verifier_does_not_accept() {
        let token = issue(3600);
        let verifier = Verifier::new(
            vec![TEST_EC_PUB.as_bytes().to_vec()],
            "telemeter".to_string(),
            vec!["some-other-client".to_string()],
        )
        .unwrap();
        assert_eq!(verifier.verify(&token), Err(VerifyError::BadAudience));
    }

    #[test]
    fn accepts_the_first_of_several_keys_that_matches() {
        let token = issue(3600);
        let verifier = Verifier::new(
            vec![
                OTHER_EC_PUB.as_bytes().to_vec(),
                TEST_EC_PUB.as_bytes().to_vec(),
            ],
            "telemeter".to_string(),
            vec!["telemeter-client".to_string()],
        )
        .unwrap();
        let client = verifier.verify(&token).unwrap();
        assert_eq!(client.id, "account-1");
    }

    #[test]
    fn hmac_secret_round_trips_a_token() {
        let signer = Signer::from_hmac_secret(b"a fairly long self-issued secret");
        let token = signer
            .issue(
                "account-1",
                BTreeMap::new(),
                "telemeter",
                "telemeter-client",
                3600,
            )
            .unwrap();

        let verifier = Verifier::with_hmac_secret(
            b"a fairly long self-issued secret",
            "telemeter".to_string(),
            vec!["telemeter-client".to_string()],
        );
        let client = verifier.verify(&token).unwrap();
        assert_eq!(client.id, "account-1");
    }

    #[test]
    fn hmac_secret_rejects_a_token_signed_with_a_different_secret() {
        let signer = Signer::from_hmac_secret(b"secret-one");
        let token = signer
            .issue("account-1", BTreeMap::new(), "telemeter", "telemeter-client", 3600)
            .unwrap();
        let verifier = Verifier::with_hmac_secret(
            b"secret-two",
            "telemeter".to_string(),
            vec!["telemeter-client".to_string()],
        );
        assert_eq!(verifier.verify(&token), Err(VerifyError::InvalidSignature));
    }
}
