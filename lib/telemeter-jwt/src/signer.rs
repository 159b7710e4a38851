use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, EncodingKey, Header};
use snafu::ResultExt;

use crate::claims::{Audience, Claims, PrivateClaims};
use crate::error::{SignError, SigningSnafu};
use crate::key::{sniff_kind, KeyKind};

/// Issues short-lived, signed tokens carrying a subject and a label bag.
pub struct Signer {
    encoding_key: EncodingKey,
    kind: KeyKind,
}

impl Signer {
    /// Builds a signer from a PEM-encoded private key. The signature
    /// algorithm is selected from the key type: RSA keys sign with RS256,
    /// P-256/384 EC keys sign with ES256/384.
    pub fn from_pem(pem: &[u8]) -> Result<Self, SignError> {
        let kind = sniff_kind(pem)?;
        let encoding_key = match kind {
            KeyKind::Rsa => EncodingKey::from_rsa_pem(pem).map_err(|_| SignError::UnsupportedKey)?,
            KeyKind::EcP256 | KeyKind::EcP384 => {
                EncodingKey::from_ec_pem(pem).map_err(|_| SignError::UnsupportedKey)?
            }
        };
        Ok(Signer { encoding_key, kind })
    }

    /// Builds a signer from a raw HMAC secret rather than a PEM key, for
    /// the self-issued token path a single node falls back to when no
    /// `--shared-key` is configured.
    pub fn from_hmac_secret(secret: &[u8]) -> Self {
        Signer {
            encoding_key: EncodingKey::from_secret(secret),
            kind: KeyKind::Hmac,
        }
    }

    /// Signs a token for `subject`, carrying `labels` as the
    /// `telemeter.openshift.io` private claim, with the given issuer and
    /// audience and an expiry `expire_seconds` from now.
    pub fn issue(
        &self,
        subject: &str,
        labels: BTreeMap<String, String>,
        issuer: &str,
        audience: &str,
        expire_seconds: i64,
    ) -> Result<String, SignError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before the Unix epoch")
            .as_secs() as i64;

        let claims = Claims {
            iss: issuer.to_owned(),
            sub: subject.to_owned(),
            aud: Audience::Single(audience.to_owned()),
            iat: now,
            nbf: now,
            exp: now + expire_seconds,
            private: PrivateClaims { labels },
        };

        let header = Header::new(self.kind.algorithm());
        encode(&header, &claims, &self.encoding_key).context(SigningSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::Verifier;

    const TEST_EC_KEY: &str = include_str!("../testdata/ec256-private.pem");
    const TEST_EC_PUB: &str = include_str!("../testdata/ec256-public.pem");

    #[test]
    fn issues_a_token_the_matching_verifier_accepts() {
        let signer = Signer::from_pem(TEST_EC_KEY.as_bytes()).unwrap();
        let mut labels = BTreeMap::new();
        labels.insert("_id".to_string(), "cluster1".to_string());

        let token = signer
            .issue("account-1", labels, "telemeter", "telemeter-client", 86400)
            .unwrap();

        let verifier = Verifier::new(
            vec![TEST_EC_PUB.as_bytes().to_vec()],
            "telemeter".to_string(),
            vec!["telemeter-client".to_string()],
        )
        .unwrap();
        let client = verifier.verify(&token).unwrap();
        assert_eq!(client.id, "account-1");
        assert_eq!(client.labels.get("_id"), Some(&"cluster1".to_string()));
    }
}
