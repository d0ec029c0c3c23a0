//! Header handling: the strip / inject table, the host capability, the
//! sanitizer and the bearer token extractor.

use std::io;

use http::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::error::{FilterError, FilterResult};

/// Request header carrying the bearer token
pub const AUTHORIZATION: &str = "authorization";

const BEARER_SCHEME: &str = "bearer";

/// Request header store provided by the proxy hosting the filter
///
/// The filter never touches the request any other way. Methods returning
/// `io::Result` model host faults; a failed removal fails the request closed.
pub trait HostRequest {
    /// First value of a request header, if present and textual
    fn get_request_header(&self, name: &str) -> Option<String>;

    /// Remove every value of a request header
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the host cannot perform the removal.
    fn remove_request_header(&mut self, name: &str) -> io::Result<()>;

    /// Append a request header value
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the host rejects the name or value.
    fn add_request_header(&mut self, name: &str, value: &str) -> io::Result<()>;

    /// Terminate the request with a local response
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the response cannot be sent.
    fn send_error_response(
        &mut self,
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> io::Result<()>;
}

/// One row of the strip / inject table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSlot {
    header: String,
    claim: String,
}

impl HeaderSlot {
    /// Output header name (lowercase)
    pub fn header(&self) -> &str {
        &self.header
    }

    /// Claim the header value is read from
    pub fn claim(&self) -> &str {
        &self.claim
    }
}

/// Static output-header → claim mapping
///
/// The same names are stripped before validation and injected after it, so
/// the strip set and the inject set cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedHeaderMap {
    slots: Vec<HeaderSlot>,
}

impl SanitizedHeaderMap {
    /// Build the table from `(header, claim)` pairs
    ///
    /// Header names are normalised to lowercase.
    ///
    /// # Errors
    ///
    /// Returns `FilterError::Configuration` if the table is empty, a name is
    /// empty or not a valid HTTP header name, or a header appears twice.
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> FilterResult<Self> {
        let mut slots: Vec<HeaderSlot> = Vec::new();

        for (header, claim) in pairs {
            if claim.is_empty() {
                return Err(FilterError::configuration_with_key(
                    format!("header '{header}' maps to an empty claim name"),
                    "headers",
                ));
            }

            let name = HeaderName::from_bytes(header.as_bytes()).map_err(|e| {
                FilterError::configuration_with_key(
                    format!("invalid header name '{header}': {e}"),
                    "headers",
                )
            })?;

            if name.as_str() == AUTHORIZATION {
                return Err(FilterError::configuration_with_key(
                    "the authorization header cannot be an identity header",
                    "headers",
                ));
            }

            if slots.iter().any(|s| s.header == name.as_str()) {
                return Err(FilterError::configuration_with_key(
                    format!("header '{}' mapped more than once", name.as_str()),
                    "headers",
                ));
            }

            slots.push(HeaderSlot {
                header: name.as_str().to_string(),
                claim: claim.to_string(),
            });
        }

        if slots.is_empty() {
            return Err(FilterError::configuration_with_key(
                "at least one header mapping is required",
                "headers",
            ));
        }

        Ok(Self { slots })
    }

    /// Rows in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &HeaderSlot> {
        self.slots.iter()
    }

    /// Output header names (the strip set)
    pub fn header_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(HeaderSlot::header)
    }

    /// Whether `name` is one of the managed headers (case-insensitive)
    pub fn contains(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.header.eq_ignore_ascii_case(name))
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always false for a constructed table
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for SanitizedHeaderMap {
    fn default() -> Self {
        let slot = |name: &str| HeaderSlot {
            header: name.to_string(),
            claim: name.to_string(),
        };
        Self {
            slots: vec![slot("org"), slot("user_uuid"), slot("principal_type")],
        }
    }
}

/// Strip every managed header from the inbound request
///
/// Removal is attempted for every name whether or not a value is present.
/// Returns how many names carried a caller-supplied value.
///
/// # Errors
///
/// Returns `FilterError::HeaderIo` on the first host fault; the caller must
/// fail the request closed.
pub fn sanitize<H>(host: &mut H, map: &SanitizedHeaderMap) -> FilterResult<usize>
where
    H: HostRequest + ?Sized,
{
    let mut spoofed = 0;

    for name in map.header_names() {
        if host.get_request_header(name).is_some() {
            spoofed += 1;
            warn!(header = name, "Stripping caller-supplied identity header");
        }

        host.remove_request_header(name)
            .map_err(|e| FilterError::header_io(name, e.to_string()))?;
    }

    debug!(stripped = map.len(), spoofed, "Request headers sanitized");
    Ok(spoofed)
}

/// Split an `Authorization` value into scheme and credential
///
/// Exactly two whitespace-separated parts are accepted, and the scheme must
/// be `bearer` in any case.
///
/// # Errors
///
/// Returns `FilterError::MalformedAuthHeader` for any other shape.
pub fn extract_bearer(value: &str) -> FilterResult<&str> {
    let mut parts = value.split(|c: char| c.is_ascii_whitespace());

    let (Some(scheme), Some(credential), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(FilterError::MalformedAuthHeader(
            "expected '<scheme> <credential>'".to_string(),
        ));
    };

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(FilterError::MalformedAuthHeader(format!(
            "unsupported scheme '{scheme}'"
        )));
    }

    if credential.is_empty() {
        return Err(FilterError::MalformedAuthHeader(
            "empty bearer credential".to_string(),
        ));
    }

    Ok(credential)
}

/// Local response captured by [`HeaderMapHost::send_error_response`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// HTTP status
    pub status: u16,
    /// Extra response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

/// [`HostRequest`] over an `http::HeaderMap`
///
/// Invalid header names or values surface as host I/O faults, which is how
/// a claim containing control characters is kept out of the request.
#[derive(Debug)]
pub struct HeaderMapHost<'a> {
    headers: &'a mut HeaderMap,
    rejection: Option<Rejection>,
}

impl<'a> HeaderMapHost<'a> {
    /// Wrap a request's headers
    pub fn new(headers: &'a mut HeaderMap) -> Self {
        Self {
            headers,
            rejection: None,
        }
    }

    /// The local response, if the filter sent one
    pub fn into_rejection(self) -> Option<Rejection> {
        self.rejection
    }
}

fn parse_name(name: &str) -> io::Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

impl HostRequest for HeaderMapHost<'_> {
    fn get_request_header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    }

    fn remove_request_header(&mut self, name: &str) -> io::Result<()> {
        let name = parse_name(name)?;
        // `remove` drops every value stored under the name
        self.headers.remove(&name);
        Ok(())
    }

    fn add_request_header(&mut self, name: &str, value: &str) -> io::Result<()> {
        let name = parse_name(name)?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.headers.append(name, value);
        Ok(())
    }

    fn send_error_response(
        &mut self,
        status: u16,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> io::Result<()> {
        self.rejection = Some(Rejection {
            status,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            body: body.to_vec(),
        });
        Ok(())
    }
}
