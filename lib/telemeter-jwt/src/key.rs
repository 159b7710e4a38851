use base64::Engine;
use jsonwebtoken::Algorithm;

use crate::error::SignError;

/// A PEM-encoded private or public key, along with the JWS algorithm it
/// implies. RSA keys always sign with RS256; EC keys sign with the
/// ES256/384 variant matching their curve. `Hmac` is never produced by
/// [`sniff_kind`] — it backs the self-issued signer used when no signing
/// key is configured at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Rsa,
    EcP256,
    EcP384,
    Hmac,
}

impl KeyKind {
    pub fn algorithm(self) -> Algorithm {
        match self {
            KeyKind::Rsa => Algorithm::RS256,
            KeyKind::EcP256 => Algorithm::ES256,
            KeyKind::Hmac => Algorithm::HS256,
            KeyKind::EcP384 => Algorithm::ES384,
        }
    }
}

// DER encodings of the AlgorithmIdentifier OIDs that matter here. PKCS#1
// headers (`RSA PRIVATE/PUBLIC KEY`) name the algorithm outright; PKCS#8 and
// SEC1 wrappers (`PRIVATE KEY` / `PUBLIC KEY` / `EC PRIVATE KEY`) don't, so
// those are sniffed by scanning the decoded DER for the OID bytes instead of
// fully parsing the ASN.1.
const OID_RSA_ENCRYPTION: &[u8] = &[0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
const OID_EC_PUBLIC_KEY: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x02, 0x01];
const OID_PRIME256V1: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_SECP384R1: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];

/// Sniffs a PEM block to decide which key family and curve it is.
///
/// PKCS#1 headers name the algorithm directly. PKCS#8 (`PRIVATE KEY` /
/// `PUBLIC KEY`) and SEC1 (`EC PRIVATE KEY`) wrappers don't, so those are
/// resolved by searching the decoded DER body for the relevant OID bytes.
/// `jsonwebtoken`'s `ring` backend requires EC private keys in PKCS#8 form;
/// SEC1 material must be converted (e.g. `openssl pkcs8 -topk8 -nocrypt`)
/// before use.
pub fn sniff_kind(pem: &[u8]) -> Result<KeyKind, SignError> {
    let text = std::str::from_utf8(pem).map_err(|_| SignError::UnsupportedKey)?;

    if text.contains("BEGIN RSA PRIVATE KEY") || text.contains("BEGIN RSA PUBLIC KEY") {
        return Ok(KeyKind::Rsa);
    }

    let der = pem_body_der(text).ok_or(SignError::UnsupportedKey)?;

    if text.contains("BEGIN EC PRIVATE KEY") {
        return Ok(curve_from_der(&der).unwrap_or(KeyKind::EcP256));
    }

    if text.contains("BEGIN PRIVATE KEY") || text.contains("BEGIN PUBLIC KEY") {
        if contains_subsequence(&der, OID_RSA_ENCRYPTION) {
            return Ok(KeyKind::Rsa);
        }
        if contains_subsequence(&der, OID_EC_PUBLIC_KEY) {
            return Ok(curve_from_der(&der).unwrap_or(KeyKind::EcP256));
        }
        return Err(SignError::UnsupportedKey);
    }

    Err(SignError::UnsupportedKey)
}

fn curve_from_der(der: &[u8]) -> Option<KeyKind> {
    if contains_subsequence(der, OID_SECP384R1) {
        Some(KeyKind::EcP384)
    } else if contains_subsequence(der, OID_PRIME256V1) {
        Some(KeyKind::EcP256)
    } else {
        None
    }
}

fn pem_body_der(text: &str) -> Option<Vec<u8>> {
    let body: String = text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .ok()
}

fn contains_subsequence(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}
