//! Token validation against the cached key set
//!
//! Steps, in order, each with its own failure kind:
//! 1. structural decode of header and payload (`MalformedToken`)
//! 2. declared `alg` must be in the permitted family (`NotAllowedAlgorithm`)
//! 3. header must carry a `kid` (`MissingKid`)
//! 4. `kid` must be in the current snapshot (`UnknownKey`)
//! 5. signature check with that key (`InvalidSignature`)
//! 6. exp / nbf, and iss / aud when configured (`InvalidClaims`)
//!
//! The algorithm check runs on the raw header string before anything is
//! trusted, so `none` or an RSA algorithm under an HMAC deployment is refused
//! before a key is even looked up.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::claims::{TokenHeader, VerifiedClaims};
use crate::error::{FilterError, FilterResult};
use crate::jwks::KeySetStore;

const HMAC_ALGORITHMS: &[Algorithm] = &[Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
const RSA_ALGORITHMS: &[Algorithm] = &[
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

/// The one signing algorithm family a deployment trusts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmFamily {
    /// HS256 / HS384 / HS512 with shared secrets
    #[default]
    Hmac,
    /// RS* and PS* with RSA public keys
    Rsa,
}

impl AlgorithmFamily {
    /// Algorithms in this family
    pub fn algorithms(self) -> &'static [Algorithm] {
        match self {
            Self::Hmac => HMAC_ALGORITHMS,
            Self::Rsa => RSA_ALGORITHMS,
        }
    }

    /// Resolve a declared `alg` if this family permits it
    pub fn permits(self, alg: &str) -> Option<Algorithm> {
        Algorithm::from_str(alg)
            .ok()
            .filter(|a| self.algorithms().contains(a))
    }
}

/// Validates bearer tokens against a [`KeySetStore`]
#[derive(Debug, Clone)]
pub struct TokenValidator {
    store: Arc<KeySetStore>,
    family: AlgorithmFamily,
    leeway: Duration,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenValidator {
    /// Validator for `family` reading keys from `store`
    pub fn new(store: Arc<KeySetStore>, family: AlgorithmFamily) -> Self {
        Self {
            store,
            family,
            leeway: Duration::ZERO,
            issuer: None,
            audience: None,
        }
    }

    /// Set clock skew tolerance for exp / nbf
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Require `iss`
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Require `aud`
    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Permitted family
    pub fn family(&self) -> AlgorithmFamily {
        self.family
    }

    /// Validate a token and return its verified claims
    ///
    /// # Errors
    ///
    /// Returns the failure kind of the first step that rejects the token;
    /// see the module documentation for the order.
    pub fn validate(&self, token: &str) -> FilterResult<VerifiedClaims> {
        let (header, _) = decode_unverified(token)?;

        let algorithm = self.family.permits(&header.alg).ok_or_else(|| {
            FilterError::NotAllowedAlgorithm {
                alg: header.alg.clone(),
            }
        })?;

        let kid = header
            .kid
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(FilterError::MissingKid)?;

        let key = self.store.lookup(kid)?;

        if let Some(key_alg) = key.alg()
            && key_alg != header.alg
        {
            return Err(FilterError::NotAllowedAlgorithm {
                alg: header.alg.clone(),
            });
        }

        if key.key_type().family() != self.family {
            return Err(FilterError::InvalidSignature(format!(
                "key '{kid}' cannot verify {} tokens",
                header.alg
            )));
        }

        let decoding_key = key.decoding_key()?;

        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = self.leeway.as_secs();
        match &self.audience {
            Some(aud) => validation.set_audience(&[aud]),
            None => validation.validate_aud = false,
        }
        if let Some(iss) = &self.issuer {
            validation.set_issuer(&[iss]);
        }

        let token_data =
            decode::<Map<String, Value>>(token, &decoding_key, &validation).map_err(classify)?;

        debug!(kid, alg = %header.alg, "Token validated");

        Ok(VerifiedClaims::new(header, token_data.claims))
    }
}

/// Split and decode header and payload without checking anything
fn decode_unverified(token: &str) -> FilterResult<(TokenHeader, Map<String, Value>)> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(FilterError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let header: TokenHeader = decode_segment(header, "header")?;
    let payload: Map<String, Value> = decode_segment(payload, "payload")?;
    Ok((header, payload))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, what: &str) -> FilterResult<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| FilterError::MalformedToken(format!("{what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FilterError::MalformedToken(format!("{what} is not a JSON object: {e}")))
}

fn classify(err: jsonwebtoken::errors::Error) -> FilterError {
    match err.kind() {
        ErrorKind::ExpiredSignature
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::InvalidClaimFormat(_)
        | ErrorKind::MissingRequiredClaim(_) =>FilterError::InvalidClaims(err.to_string()),
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
            FilterError::MalformedToken(err.to_string())
        }
        _ => FilterError::InvalidSignature(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwks::{KeySet, SigningKey};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde_json::json;

    const SECRET: &[u8] = b"test_secret_key_at_least_32_bytes_long_12345678";

    fn store() -> Arc<KeySetStore> {
        let store = Arc::new(KeySetStore::new());
        store.replace(KeySet::from_keys([
            SigningKey::symmetric("k1", URL_SAFE_NO_PAD.encode(SECRET)),
            SigningKey::symmetric("pinned", URL_SAFE_NO_PAD.encode(SECRET)).with_alg("HS512"),
            SigningKey::rsa("rsa-1", "xGOr", "AQAB"),
            SigningKey::rsa("r1", RSA_MODULUS, "AQAB").with_alg("RS256"),
        ]));
        store
    }

    const RSA_PRIVATE_PEM: &str = include_str!("../tests/fixtures/rsa_test_key.pem");
    const RSA_MODULUS: &str = include_str!("../tests/fixtures/rsa_test_key.n");

    fn rsa_token(kid: &str, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).unwrap();
        encode(&header, claims, &key).unwrap()
    }

    fn token(alg: Algorithm, kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(alg);
        header.kid = kid.map(str::to_string);
        encode(&header, claims, &EncodingKey::from_secret(SECRET)).unwrap()
    }

    fn segment(value: &Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    #[test]
    fn test_family_permits() {
        assert_eq!(AlgorithmFamily::Hmac.permits("HS256"), Some(Algorithm::HS256));
        assert_eq!(AlgorithmFamily::Hmac.permits("RS256"), None);
        assert_eq!(AlgorithmFamily::Hmac.permits("none"), None);
        assert_eq!(AlgorithmFamily::Hmac.permits("hs256"), None);
        assert_eq!(AlgorithmFamily::Rsa.permits("PS384"), Some(Algorithm::PS384));
        assert_eq!(AlgorithmFamily::Rsa.permits("HS256"), None);
    }

    #[test]
    fn test_valid_token() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, Some("k1"), &json!({"org": "acme", "n": 7}));

        let claims = validator.validate(&jwt).unwrap();
        assert_eq!(claims.kid(), Some("k1"));
        assert_eq!(claims.get("org").unwrap().to_string(), "acme");
        assert_eq!(claims.get("n").unwrap().to_string(), "7");
    }

    #[test]
    fn test_malformed_token() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        for jwt in ["", "abc", "a.b", "a.b.c.d", "!!!.e30.sig"] {
            assert!(
                matches!(validator.validate(jwt), Err(FilterError::MalformedToken(_))),
                "{jwt:?}"
            );
        }

        let not_object = format!("{}.{}.sig", segment(&json!({"alg": "HS256"})), segment(&json!([1])));
        assert!(matches!(
            validator.validate(&not_object),
            Err(FilterError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_none_algorithm_refused() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = format!(
            "{}.{}.",
            segment(&json!({"alg": "none", "kid": "k1"})),
            segment(&json!({"org": "evil"}))
        );
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::NotAllowedAlgorithm { ref alg }) if alg == "none"
        ));
    }

    #[test]
    fn test_asymmetric_algorithm_refused_under_hmac() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = format!(
            "{}.{}.c2ln",
            segment(&json!({"alg": "RS256", "kid": "rsa-1"})),
            segment(&json!({"org": "evil"}))
        );
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::NotAllowedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_missing_kid() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, None, &json!({"org": "acme"}));
        assert!(matches!(validator.validate(&jwt), Err(FilterError::MissingKid)));

        let jwt = token(Algorithm::HS256, Some(""), &json!({"org": "acme"}));
        assert!(matches!(validator.validate(&jwt), Err(FilterError::MissingKid)));
    }

    #[test]
    fn test_unknown_key() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, Some("k9"), &json!({"org": "acme"}));
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::UnknownKey { ref kid }) if kid == "k9"
        ));
    }

    #[test]
    fn test_unknown_key_before_first_refresh() {
        let validator =
            TokenValidator::new(Arc::new(KeySetStore::new()), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, Some("k1"), &json!({"org": "acme"}));
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_key_pinned_to_other_algorithm() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, Some("pinned"), &json!({"org": "acme"}));
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::NotAllowedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_invalid_signature() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("k1".to_string());
        let jwt = encode(
            &header,
            &json!({"org": "acme"}),
            &EncodingKey::from_secret(b"some_other_secret_that_is_long_enough"),
        )
        .unwrap();

        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_tampered_payload() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, Some("k1"), &json!({"org": "acme"}));
        let parts: Vec<&str> = jwt.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], segment(&json!({"org": "evil"})), parts[2]);

        assert!(matches!(
            validator.validate(&forged),
            Err(FilterError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_expired_and_not_yet_valid() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let now = jsonwebtoken::get_current_timestamp();

        let expired = token(Algorithm::HS256, Some("k1"), &json!({"org": "acme", "exp": now - 120}));
        assert!(matches!(
            validator.validate(&expired),
            Err(FilterError::InvalidClaims(_))
        ));

        let early = token(Algorithm::HS256, Some("k1"), &json!({"org": "acme", "nbf": now + 600}));
        assert!(matches!(
            validator.validate(&early),
            Err(FilterError::InvalidClaims(_))
        ));

        let fresh = token(Algorithm::HS256, Some("k1"), &json!({"org": "acme", "exp": now + 600}));
        assert!(validator.validate(&fresh).is_ok());
    }

    #[test]
    fn test_leeway_accepts_small_skew() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac)
            .with_leeway(Duration::from_secs(300));
        let now = jsonwebtoken::get_current_timestamp();
        let jwt = token(Algorithm::HS256, Some("k1"), &json!({"exp": now - 60}));
        assert!(validator.validate(&jwt).is_ok());
    }

    #[test]
    fn test_issuer_and_audience() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac)
            .with_issuer("https://auth.example.com")
            .with_audience("gateway");

        let good = token(
            Algorithm::HS256,
            Some("k1"),
            &json!({"iss": "https://auth.example.com", "aud": "gateway"}),
        );
        assert!(validator.validate(&good).is_ok());

        let wrong_aud = token(
            Algorithm::HS256,
            Some("k1"),
            &json!({"iss": "https://auth.example.com", "aud": "other"}),
        );
        assert!(matches!(
            validator.validate(&wrong_aud),
            Err(FilterError::InvalidClaims(_))
        ));

        let wrong_iss = token(
            Algorithm::HS256,
            Some("k1"),
            &json!({"iss": "https://evil.example.com", "aud": "gateway"}),
        );
        assert!(matches!(
            validator.validate(&wrong_iss),
            Err(FilterError::InvalidClaims(_))
        ));
    }

    #[test]
    fn test_audience_ignored_when_not_configured() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = token(Algorithm::HS256, Some("k1"), &json!({"aud": "anything"}));
        assert!(validator.validate(&jwt).is_ok());
    }

    #[test]
    fn test_wrongly_typed_time_claims_are_claim_errors() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);

        for claims in [json!({"exp": "1"}), json!({"nbf": "soon"})] {
            let jwt = token(Algorithm::HS256, Some("k1"), &claims);
            let err = validator.validate(&jwt).unwrap_err();
            assert!(matches!(err, FilterError::InvalidClaims(_)), "{claims}: {err}");
            assert_eq!(err.kind(), "invalid_claims");
        }
    }

    #[test]
    fn test_non_string_kid_is_missing() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        for kid in [json!(7), json!(null), json!(["k1"])] {
            let jwt = format!(
                "{}.{}.c2ln",
                segment(&json!({"alg": "HS256", "kid": kid})),
                segment(&json!({"org": "acme"}))
            );
            assert!(
                matches!(validator.validate(&jwt), Err(FilterError::MissingKid)),
                "kid {kid}"
            );
        }
    }

    #[test]
    fn test_rsa_token_validates_under_rsa_family() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Rsa);
        let jwt = rsa_token("r1", &json!({"org": "acme", "user_uuid": "u-1"}));

        let claims = validator.validate(&jwt).unwrap();
        assert_eq!(claims.kid(), Some("r1"));
        assert_eq!(claims.header().alg, "RS256");
        assert_eq!(claims.get("user_uuid").unwrap().to_string(), "u-1");
    }

    #[test]
    fn test_rsa_token_refused_under_hmac_family() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Hmac);
        let jwt = rsa_token("r1", &json!({"org": "acme"}));
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::NotAllowedAlgorithm { ref alg }) if alg == "RS256"
        ));
    }

    #[test]
    fn test_rsa_token_with_symmetric_key_cannot_verify() {
        let validator = TokenValidator::new(store(), AlgorithmFamily::Rsa);
        let jwt = rsa_token("k1", &json!({"org": "acme"}));
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_rsa_token_signed_by_other_key() {
        let store = Arc::new(KeySetStore::new());
        // Same kid, unrelated modulus
        store.replace(KeySet::from_keys([SigningKey::rsa(
            "r1",
            RSA_MODULUS.replace('A', "B"),
            "AQAB",
        )]));
        let validator = TokenValidator::new(store, AlgorithmFamily::Rsa);
        let jwt = rsa_token("r1", &json!({"org": "acme"}));
        assert!(matches!(
            validator.validate(&jwt),
            Err(FilterError::InvalidSignature(_))
        ));
    }
}
