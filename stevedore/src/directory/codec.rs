//! HMAC URL codec.
//!
//! Computes and verifies a keyed digest over canonicalized query
//! parameters. The verified subset is always `path` and `timestamp`,
//! sorted by key; the digest itself rides along as an unverified `hmac`
//! parameter. Verification recomputes the digest from the parsed request
//! parameters, never trusting client-supplied ordering.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Query parameters covered by the digest.
const VERIFIED_PARAMS: [&str; 2] = ["path", "timestamp"];

/// Name of the digest parameter appended to signed URLs.
pub const HMAC_PARAM: &str = "hmac";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Digest absent, malformed, or not matching the canonical subset.
    #[error("url digest mismatch")]
    DigestMismatch,

    /// The signing timestamp is older than the configured maximum age.
    #[error("url expired")]
    Expired,
}

/// Signs and verifies directory-access URLs.
///
/// The key is generated once per process and never persisted, so issued
/// URLs do not survive a restart.
pub struct UrlSigner {
    key: [u8; 32],
    max_age: Duration,
}

impl UrlSigner {
    pub fn new(max_age: Duration) -> Self {
        let mut key = [0u8; 32];
        rand::rng().fill_bytes(&mut key);
        Self { key, max_age }
    }

    #[cfg(test)]
    fn with_key(key: [u8; 32], max_age: Duration) -> Self {
        Self { key, max_age }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Build a signed path-and-query string for the given route.
    ///
    /// The verified subset is canonicalized by key sort; the digest is
    /// appended last as the unverified `hmac` parameter. Values are
    /// percent-encoded in the assembled URL but signed in decoded form,
    /// matching what the server sees after query parsing.
    pub fn sign(&self, route_path: &str, path: &str, timestamp: i64) -> String {
        let canonical = canonical_query(path, timestamp);
        let digest = self.digest(route_path, &canonical);
        format!(
            "{}?path={}&timestamp={}&{}={}",
            route_path,
            urlencoding::encode(path),
            timestamp,
            HMAC_PARAM,
            digest
        )
    }

    /// Verify a request against the signing key and expiry window.
    ///
    /// `params` are the decoded query parameters of the incoming request.
    /// The digest is recomputed over the canonical verified subset; the
    /// comparison runs in constant time over the full digest length.
    pub fn verify(
        &self,
        route_path: &str,
        params: &HashMap<String, String>,
        now: i64,
    ) -> Result<(), VerifyError> {
        let presented = params.get(HMAC_PARAM).ok_or(VerifyError::DigestMismatch)?;
        let presented = hex::decode(presented).map_err(|_| VerifyError::DigestMismatch)?;

        let mut verified: Vec<(&str, &str)> = Vec::with_capacity(VERIFIED_PARAMS.len());
        for name in VERIFIED_PARAMS {
            let value = params.get(name).ok_or(VerifyError::DigestMismatch)?;
            verified.push((name, value));
        }
        verified.sort_by_key(|(name, _)| *name);
        let canonical = verified
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut mac = self.mac();
        mac.update(route_path.as_bytes());
        mac.update(b"?");
        mac.update(canonical.as_bytes());
        mac.verify_slice(&presented)
            .map_err(|_| VerifyError::DigestMismatch)?;

        // The timestamp string is covered by the digest, so a parse
        // failure here means a signed-but-garbled value; treat as expired.
        let timestamp: i64 = params
            .get("timestamp")
            .and_then(|t| t.parse().ok())
            .ok_or(VerifyError::Expired)?;
        if now - timestamp > self.max_age.as_secs() as i64 {
            return Err(VerifyError::Expired);
        }
        Ok(())
    }

    fn digest(&self, route_path: &str, canonical: &str) -> String {
        let mut mac = self.mac();
        mac.update(route_path.as_bytes());
        mac.update(b"?");
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn mac(&self) -> HmacSha256 {
        // A 32-byte key is always acceptable to HMAC.
        HmacSha256::new_from_slice(&self.key).expect("hmac key length")
    }
}

/// Canonical form of the verified parameter subset, sorted by key.
fn canonical_query(path: &str, timestamp: i64) -> String {
    // "path" < "timestamp" lexicographically; keep the sort explicit so
    // adding a verified parameter later cannot silently break signing.
    let mut pairs = vec![
        ("path".to_string(), path.to_string()),
        ("timestamp".to_string(), timestamp.to_string()),
    ];
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}
