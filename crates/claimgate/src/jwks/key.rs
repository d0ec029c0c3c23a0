//! Signing keys and the immutable key set

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::DecodingKey;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{FilterError, FilterResult};
use crate::validator::AlgorithmFamily;

/// JWK `kty` values this filter can verify with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    /// Symmetric secret (`oct`)
    Oct,
    /// RSA public key
    Rsa,
}

impl KeyType {
    /// Parse a JWK `kty`
    pub fn from_kty(kty: &str) -> Option<Self> {
        match kty {
            "oct" => Some(Self::Oct),
            "RSA" => Some(Self::Rsa),
            _ => None,
        }
    }

    /// Algorithm family this key type verifies
    pub fn family(self) -> AlgorithmFamily {
        match self {
            Self::Oct => AlgorithmFamily::Hmac,
            Self::Rsa => AlgorithmFamily::Rsa,
        }
    }
}

/// Algorithm-specific key material
#[derive(Debug)]
pub enum KeyMaterial {
    /// Base64url-encoded shared secret (`k`)
    Symmetric(SecretString),
    /// Base64url modulus and exponent
    Rsa { n: String, e: String },
}

/// One trusted signing key, immutable once stored
#[derive(Debug)]
pub struct SigningKey {
    kid: String,
    alg: Option<String>,
    key_use: Option<String>,
    material: KeyMaterial,
}

impl SigningKey {
    /// Symmetric key from a base64url secret
    pub fn symmetric(kid: impl Into<String>, k: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            alg: None,
            key_use: None,
            material: KeyMaterial::Symmetric(SecretString::from(k.into())),
        }
    }

    /// RSA public key from base64url components
    pub fn rsa(kid: impl Into<String>, n: impl Into<String>, e: impl Into<String>) -> Self {
        Self {
            kid: kid.into(),
            alg: None,
            key_use: None,
            material: KeyMaterial::Rsa {
                n: n.into(),
                e: e.into(),
            },
        }
    }

    /// Pin the key to one algorithm
    #[must_use]
    pub fn with_alg(mut self, alg: impl Into<String>) -> Self {
        self.alg = Some(alg.into());
        self
    }

    /// Record the declared `use`
    #[must_use]
    pub fn with_use(mut self, key_use: impl Into<String>) -> Self {
        self.key_use = Some(key_use.into());
        self
    }

    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Declared algorithm, if any
    pub fn alg(&self) -> Option<&str> {
        self.alg.as_deref()
    }

    /// Declared usage, if any
    pub fn key_use(&self) -> Option<&str> {
        self.key_use.as_deref()
    }

    /// Key type
    pub fn key_type(&self) -> KeyType {
        match self.material {
            KeyMaterial::Symmetric(_) => KeyType::Oct,
            KeyMaterial::Rsa { .. } => KeyType::Rsa,
        }
    }

    /// Build the verification key
    ///
    /// # Errors
    ///
    /// Returns `FilterError::InvalidSignature` when the stored material
    /// cannot be turned into a key.
    pub fn decoding_key(&self) -> FilterResult<DecodingKey> {
        match &self.material {
            KeyMaterial::Symmetric(secret) => {
                let encoded = secret.expose_secret().trim_end_matches('=');
                let bytes = URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
                    FilterError::InvalidSignature(format!(
                        "key '{}' has an undecodable secret: {e}",
                        self.kid
                    ))
                })?;
                Ok(DecodingKey::from_secret(&bytes))
            }
            KeyMaterial::Rsa { n, e } => DecodingKey::from_rsa_components(n, e).map_err(|err| {
                FilterError::InvalidSignature(format!(
                    "key '{}' has invalid RSA components: {err}",
                    self.kid
                ))
            }),
        }
    }
}

/// Trusted keys indexed by `kid`
///
/// Never mutated after construction; refresh builds a new one.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
}

impl KeySet {
    /// Build from keys; on duplicate `kid` the first one wins
    pub fn from_keys(keys: impl IntoIterator<Item = SigningKey>) -> Self {
        let mut map = HashMap::new();
        for key in keys {
            map.entry(key.kid.clone()).or_insert_with(|| Arc::new(key));
        }
        Self { keys: map }
    }

    /// Key for `kid`
    pub fn get(&self, kid: &str) -> Option<&Arc<SigningKey>> {
        self.keys.get(kid)
    }

    /// Whether `kid` is present
    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    /// Key identifiers, unordered
    pub fn kids(&self) -> impl Iterator<Item = &str> {
        self.keys.keys().map(String::as_str)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
