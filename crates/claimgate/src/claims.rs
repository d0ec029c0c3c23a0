//! Verified claims and their projection onto request headers

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Number, Value};
use tracing::{debug, error};

use crate::headers::{HostRequest, SanitizedHeaderMap};

/// Separator used when a list claim is rendered into one header value
pub const LIST_SEPARATOR: &str = ",";

/// Claim value in the shapes a header can carry
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    /// String (booleans are kept as their JSON text)
    Text(String),
    /// JSON number, rendered exactly as issued
    Number(Number),
    /// Array of scalars
    List(Vec<String>),
}

impl ClaimValue {
    /// Convert a JSON claim; `null` and objects have no header form
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Self::Text(s.clone())),
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::Bool(b) => Some(Self::Text(b.to_string())),
            Value::Array(items) => Some(Self::List(
                items.iter().filter_map(scalar_text).collect(),
            )),
            Value::Null | Value::Object(_) => None,
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Canonical header rendering
impl fmt::Display for ClaimValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::List(items) => f.write_str(&items.join(LIST_SEPARATOR)),
        }
    }
}

/// JOSE header fields of a token
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Declared signing algorithm
    pub alg: String,
    /// Key identifier; a non-string `kid` counts as absent
    #[serde(default, deserialize_with = "string_only")]
    pub kid: Option<String>,
    /// Token type
    #[serde(default)]
    pub typ: Option<String>,
}

fn string_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Claims of a token whose signature and time claims were verified
///
/// Lives for one request only.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    header: TokenHeader,
    claims: BTreeMap<String, ClaimValue>,
}

impl VerifiedClaims {
    /// Build from a verified header and payload
    ///
    /// Claims with no header form (`null`, objects) are dropped here.
    pub fn new(header: TokenHeader, payload: Map<String, Value>) -> Self {
        let claims = payload
            .iter()
            .filter_map(|(name, value)| {
                ClaimValue::from_json(value).map(|v| (name.clone(), v))
            })
            .collect();
        Self { header, claims }
    }

    /// Token header fields
    pub fn header(&self) -> &TokenHeader {
        &self.header
    }

    /// Signing key identifier
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    /// Look up one claim
    pub fn get(&self, name: &str) -> Option<&ClaimValue> {
        self.claims.get(name)
    }

    /// Number of representable claims
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True when no claim has a header form
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

/// What happened to each header slot during projection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectionSummary {
    /// Headers written
    pub injected: Vec<String>,
    /// Slots whose claim was absent
    pub missing: Vec<String>,
    /// Slots the host refused, or whose value was not header-safe
    pub failed: Vec<String>,
}

/// Inject one header per mapped claim
///
/// Values come from payload claims only, never from token header fields.
/// Absent claims and injection faults are logged and skipped so the
/// remaining slots are still written.
pub fn project<H>(claims: &VerifiedClaims, map: &SanitizedHeaderMap, host: &mut H) -> ProjectionSummary
where
    H: HostRequest + ?Sized,
{
    let mut summary = ProjectionSummary::default();

    for slot in map.iter() {
        let Some(value) = claims.get(slot.claim()) else {
            debug!(
                header = slot.header(),
                claim = slot.claim(),
                "Claim absent, header not injected"
            );
            summary.missing.push(slot.header().to_string());
            continue;
        };

        let rendered = value.to_string();
        if !is_header_safe(&rendered) {
            error!(
                header = slot.header(),
                claim = slot.claim(),
                "Claim value contains control characters, header not injected"
            );
            summary.failed.push(slot.header().to_string());
            continue;
        }

        match host.add_request_header(slot.header(), &rendered) {
            Ok(()) => summary.injected.push(slot.header().to_string()),
            Err(e) => {
                error!(
                    header = slot.header(),
                    error = %e,
                    "Failed to add header"
                );
                summary.failed.push(slot.header().to_string());
            }
        }
    }

    summary
}

/// No CR, LF, NUL or other control characters except horizontal tab
fn is_header_safe(value: &str) -> bool {
    !value.chars().any(|c| c.is_control() && c != '\t')
}
