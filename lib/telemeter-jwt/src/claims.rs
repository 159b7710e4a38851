use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const PRIVATE_CLAIM_KEY: &str = "telemeter.openshift.io";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivateClaims {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// An audience claim may be a single string or an array; both are valid
/// per RFC 7519 and upstream client libraries emit either.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audience::Single(s) => s == audience,
            Audience::Many(v) => v.iter().any(|s| s == audience),
        }
    }

    pub fn intersects(&self, configured: &[String]) -> bool {
        configured.iter().any(|aud| self.contains(aud))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub sub: String,
    pub aud: Audience,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    #[serde(rename = "telemeter.openshift.io")]
    pub private: PrivateClaims,
}
