//! Common test utilities for integration tests
//!
//! A recording host, token minting, and a mock key set endpoint.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use claimgate::{FilterConfig, HostRequest};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Shared secret behind key `k1`
pub const SECRET_K1: &[u8] = b"integration_secret_for_k1_at_least_32_bytes";

/// Shared secret behind key `k2`
pub const SECRET_K2: &[u8] = b"integration_secret_for_k2_at_least_32_bytes";

/// PKCS#1 private key behind key `r1`
pub const RSA_PRIVATE_PEM: &str = include_str!("../fixtures/rsa_test_key.pem");

/// Base64url modulus of the `r1` public key (exponent 65537)
pub const RSA_MODULUS: &str = include_str!("../fixtures/rsa_test_key.n");

/// In-memory host that records every call
#[derive(Debug, Default)]
pub struct RecordingHost {
    /// Lowercase name → values, in insertion order
    pub headers: BTreeMap<String, Vec<String>>,
    /// Every `add_request_header` call, including failed ones
    pub added: Vec<(String, String)>,
    /// Local response, if one was sent
    pub response: Option<(u16, Vec<(String, String)>, Vec<u8>)>,
    /// Make `remove_request_header` fail
    pub fail_remove: bool,
    /// Make `add_request_header` fail for this name
    pub fail_add: Option<String>,
}

impl RecordingHost {
    /// Host with the given request headers
    pub fn with_headers<'a>(headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut host = Self::default();
        for (name, value) in headers {
            host.headers
                .entry(name.to_ascii_lowercase())
                .or_default()
                .push(value.to_string());
        }
        host
    }

    /// Host carrying `Authorization: Bearer <token>`
    pub fn with_bearer(token: &str) -> Self {
        Self::with_headers([("authorization", format!("Bearer {token}").as_str())])
    }

    /// All values of a header
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(name)
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Single value of a header
    pub fn value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.first()).map(String::as_str)
    }
}

impl HostRequest for RecordingHost {
    fn get_request_header(&self, name: &str) -> Option<String> {
        self.value(&name.to_ascii_lowercase()).map(str::to_string)
    }

    fn remove_request_header(&mut self, name: &str) -> io::Result<()> {
        if self.fail_remove {
            return Err(io::Error::other("header map is read-only"));
        }
        self.headers.remove(&name.to_ascii_lowercase());
        Ok(())
    }

    fn add_request_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        self.added.push((name.to_string(), value.to_string()));
        if self.fail_add.as_deref() == Some(name) {
            return Err(io::Error::other("add rejected"));
        }
        self.headers
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
        Ok(())
    }

    fn send_error_response(
        &mut self,
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> io::Result<()> {
        self.response = Some((
            status,
            headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body.to_vec(),
        ));
        Ok(())
    }
}

/// Mint an HS256 token, optionally with a `kid`
pub fn mint(kid: Option<&str>, secret: &[u8], claims: &Value) -> String {
    mint_with(Algorithm::HS256, kid, secret, claims)
}

/// Mint an HMAC token with an explicit algorithm
pub fn mint_with(alg: Algorithm, kid: Option<&str>, secret: &[u8], claims: &Value) -> String {
    let mut header = Header::new(alg);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_secret(secret)).expect("token encoding")
}

/// Mint an RS256 token signed by the `r1` private key
pub fn mint_rs256(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()).expect("fixture key");
    encode(&header, claims, &key).expect("token encoding")
}

/// Unsigned token with an arbitrary header, for algorithm-confusion tests
pub fn forge(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

/// The usual identity claims
pub fn identity_claims() -> Value {
    json!({
        "org": "acme",
        "user_uuid": "u-1",
        "principal_type": "service",
        "exp": jsonwebtoken::get_current_timestamp() + 600,
    })
}

/// JWK for a symmetric key
pub fn oct_jwk(kid: &str, secret: &[u8]) -> Value {
    json!({
        "kty": "oct",
        "kid": kid,
        "alg": "HS256",
        "use": "sig",
        "k": URL_SAFE_NO_PAD.encode(secret),
    })
}

/// JWK for the `r1` RSA public key
pub fn rsa_jwk(kid: &str) -> Value {
    json!({
        "kty": "RSA",
        "kid": kid,
        "alg": "RS256",
        "use": "sig",
        "n": RSA_MODULUS,
        "e": "AQAB",
    })
}

/// Key set document from JWKs
pub fn jwks(keys: &[Value]) -> Value {
    json!({ "keys": keys })
}

/// Mock key set endpoint
pub struct MockKeyServer {
    pub server: MockServer,
    pub jwks_endpoint: String,
}

impl MockKeyServer {
    /// Start a new mock endpoint
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_endpoint = format!("{}/jwks", server.uri());
        Self {
            server,
            jwks_endpoint,
        }
    }

    /// Serve this document from now on
    pub async fn serve(&self, document: Value) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(document))
            .mount(&self.server)
            .await;
    }

    /// Fail with this status from now on
    pub async fn fail(&self, status: u16) {
        self.server.reset().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Filter configuration pointing at this endpoint
    pub fn config(&self) -> FilterConfig {
        FilterConfig::default().with_jwks_uri(&self.jwks_endpoint)
    }
}
