//! Key set document parsing
//!
//! The document is a JSON object with a `keys` array of JWKs:
//!
//! ```json
//! {"keys": [{"kty": "oct", "kid": "k1", "alg": "HS256", "use": "sig", "k": "..."}]}
//! ```
//!
//! Entries that cannot be used for signature verification are dropped and
//! reported rather than failing the whole document.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::key::{KeySet, KeyType, SigningKey};
use crate::error::{FilterError, FilterResult};

/// Raw JWK entry
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JwkEntry {
    /// Algorithm
    #[serde(default)]
    pub alg: Option<String>,
    /// Key type
    #[serde(default)]
    pub kty: Option<String>,
    /// Public key use
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    /// Key identifier
    #[serde(default)]
    pub kid: Option<String>,
    /// Symmetric secret
    #[serde(default)]
    pub k: Option<String>,
    /// RSA modulus
    #[serde(default)]
    pub n: Option<String>,
    /// RSA exponent
    #[serde(default)]
    pub e: Option<String>,
    /// X.509 chain, carried but not used for verification
    #[serde(default)]
    pub x5c: Vec<String>,
    /// X.509 thumbprint
    #[serde(default)]
    pub x5t: Option<String>,
}

/// Key set document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KeySetDocument {
    /// Keys
    pub keys: Vec<JwkEntry>,
}

/// Why an entry was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// No `kid`
    MissingKid,
    /// `use` is present and is not `sig`
    NotForSigning,
    /// `kty` missing or not `oct` / `RSA`
    UnsupportedKeyType,
    /// Material fields for the key type are missing
    MissingMaterial,
}

/// One dropped entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedKey {
    /// `kid` of the entry, if it had one
    pub kid: Option<String>,
    /// Reason
    pub reason: RejectReason,
}

/// Parsed key set plus the entries that were dropped
#[derive(Debug)]
pub struct KeySetReport {
    /// Usable keys
    pub key_set: KeySet,
    /// Dropped entries
    pub rejected: Vec<RejectedKey>,
}

/// Parse a key set document
///
/// # Errors
///
/// Returns `FilterError::KeySetFetch` when the bytes are not a JSON object
/// with a `keys` array. Individual unusable keys are not errors.
pub fn parse_key_set(bytes: &[u8]) -> FilterResult<KeySetReport> {
    let document: KeySetDocument = serde_json::from_slice(bytes)
        .map_err(|e| FilterError::key_set_fetch(format!("Invalid key set format: {e}")))?;

    let mut keys = Vec::with_capacity(document.keys.len());
    let mut rejected = Vec::new();

    for entry in document.keys {
        match signing_key(&entry) {
            Ok(key) => keys.push(key),
            Err(reason) => {
                warn!(kid = ?entry.kid, ?reason, "Skipping key set entry");
                rejected.push(RejectedKey {
                    kid: entry.kid,
                    reason,
                });
            }
        }
    }

    Ok(KeySetReport {
        key_set: KeySet::from_keys(keys),
        rejected,
    })
}

fn signing_key(entry: &JwkEntry) -> Result<SigningKey, RejectReason> {
    let kid = entry
        .kid
        .as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(RejectReason::MissingKid)?;

    if entry.key_use.as_deref().is_some_and(|u| u != "sig") {
        return Err(RejectReason::NotForSigning);
    }

    let key_type = entry
        .kty
        .as_deref()
        .and_then(KeyType::from_kty)
        .ok_or(RejectReason::UnsupportedKeyType)?;

    let mut key = match key_type {
        KeyType::Oct => {
            let k = entry.k.as_deref().ok_or(RejectReason::MissingMaterial)?;
            SigningKey::symmetric(kid, k)
        }
        KeyType::Rsa => match (entry.n.as_deref(), entry.e.as_deref()) {
            (Some(n), Some(e)) => SigningKey::rsa(kid, n, e),
            _ => return Err(RejectReason::MissingMaterial),
        },
    };

    if let Some(alg) = &entry.alg {
        key = key.with_alg(alg);
    }
    if let Some(key_use) = &entry.key_use {
        key = key.with_use(key_use);
    }

    Ok(key)
}
