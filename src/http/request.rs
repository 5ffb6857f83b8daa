//! Inbound request decorated with derived metadata.
//!
//! # Responsibilities
//! - Wrap the raw `http::Request` together with per-request cached state
//! - Derive content length/type, keep-alive, security and upgrade flags
//! - Answer content negotiation queries through a lazily built [`Negotiator`]
//!
//! # Design Decisions
//! - Every derived value is computed on first access and never invalidated;
//!   headers are not expected to change mid-request
//! - Cache state is owned by the request, nothing is shared between requests
//! - The upgrade flag is set from outside (protocol-switch handling) and is
//!   never inferred from headers

use std::fmt;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, Method, Request, Version};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;

use crate::error::{BoxError, Result, TransportError};
use crate::http::location::Location;
use crate::http::mime::{self, DEFAULT_MEDIA_TYPE};
use crate::http::negotiation::Negotiator;

/// One or more candidate types for [`IncomingRequest::accepts`].
#[derive(Debug, Clone)]
pub struct Candidates<'a>(Vec<&'a str>);

impl<'a> From<&'a str> for Candidates<'a> {
    fn from(value: &'a str) -> Self {
        Self(vec![value])
    }
}

impl<'a> From<&'a String> for Candidates<'a> {
    fn from(value: &'a String) -> Self {
        Self(vec![value.as_str()])
    }
}

impl<'a> From<&'a [&'a str]> for Candidates<'a> {
    fn from(value: &'a [&'a str]) -> Self {
        Self(value.to_vec())
    }
}

impl<'a, const N: usize> From<[&'a str; N]> for Candidates<'a> {
    fn from(value: [&'a str; N]) -> Self {
        Self(value.to_vec())
    }
}

impl<'a> From<Vec<&'a str>> for Candidates<'a> {
    fn from(value: Vec<&'a str>) -> Self {
        Self(value)
    }
}

impl<'a> From<&'a [String]> for Candidates<'a> {
    fn from(value: &'a [String]) -> Self {
        Self(value.iter().map(String::as_str).collect())
    }
}

/// Values derived from the request, each populated on first access.
#[derive(Debug, Default)]
struct RequestMetadata {
    negotiator: OnceLock<Negotiator>,
    content_length: OnceLock<Option<u64>>,
    content_type: OnceLock<String>,
    date: OnceLock<DateTime<Utc>>,
    keep_alive: OnceLock<bool>,
    secure: OnceLock<bool>,
    upgrade: OnceLock<bool>,
    trailers: OnceLock<HeaderMap>,
}

/// An inbound request plus its derived metadata.
#[derive(Debug)]
pub struct IncomingRequest<B = Body> {
    inner: Request<B>,
    /// Whether the connection that carried this request is encrypted.
    encrypted: bool,
    /// Milliseconds since the epoch at construction.
    time: u64,
    meta: RequestMetadata,
}

impl<B> IncomingRequest<B> {
    /// Wrap a raw request. The capture time is taken now.
    pub fn new(inner: Request<B>, encrypted: bool) -> Self {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            inner,
            encrypted,
            time,
            meta: RequestMetadata::default(),
        }
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// Raw request target as received.
    pub fn url(&self) -> String {
        self.inner
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| self.inner.uri().to_string())
    }

    pub fn inner(&self) -> &Request<B> {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut Request<B> {
        &mut self.inner
    }

    pub fn into_inner(self) -> Request<B> {
        self.inner
    }

    /// Absolute URI of this request.
    pub fn location(&self) -> Location {
        Location::new(&self.url(), self.is_secure(), self.first_header(header::HOST))
    }

    /// Best match among `types` for the `Accept` header.
    ///
    /// Short names such as `json` are expanded to full media types and the
    /// expanded form is returned.
    pub fn accepts<'a>(&self, types: impl Into<Candidates<'a>>) -> Result<Option<&'a str>> {
        let Candidates(types) = types.into();
        self.negotiator().preferred_media_type(&types)
    }

    /// Best match among `types` for the `Accept-Encoding` header.
    pub fn accepts_encoding<'a>(&self, types: impl Into<Candidates<'a>>) -> Result<Option<&'a str>> {
        let Candidates(types) = types.into();
        self.negotiator().preferred_encoding(&types)
    }

    /// Every acceptable media range in the client's preference order.
    pub fn accepted_media_types(&self) -> Vec<String> {
        self.negotiator().preferred_media_types()
    }

    /// Every acceptable content coding in the client's preference order.
    pub fn accepted_encodings(&self) -> Vec<String> {
        self.negotiator().preferred_encodings()
    }

    /// Declared body length. Always `Some(0)` for upgrade requests.
    pub fn content_length(&self) -> Option<u64> {
        // upgraded connections never carry a parseable body
        if self.is_upgrade_request() {
            return Some(0);
        }

        *self.meta.content_length.get_or_init(|| {
            self.first_header(header::CONTENT_LENGTH)
                .and_then(parse_leading_digits)
        })
    }

    /// Media type without parameters, lower-cased.
    pub fn content_type(&self) -> &str {
        self.meta.content_type.get_or_init(|| {
            match self.first_header(header::CONTENT_TYPE) {
                Some(value) if !value.is_empty() => {
                    let essence = value.split(';').next().unwrap_or_default();
                    essence.trim().to_ascii_lowercase()
                }
                _ => DEFAULT_MEDIA_TYPE.to_string(),
            }
        })
    }

    /// Milliseconds since the epoch when the request object was created.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// [`time`](Self::time) as a calendar date.
    pub fn date(&self) -> DateTime<Utc> {
        *self.meta.date.get_or_init(|| {
            DateTime::<Utc>::from_timestamp_millis(self.time as i64).unwrap_or_default()
        })
    }

    /// Case-insensitive header lookup. `referrer` is read as `referer`.
    ///
    /// Returns the first value of a repeated header; use
    /// [`header_values`](Self::header_values) for all of them.
    pub fn header(&self, name: &str) -> Result<Option<&str>> {
        let name = canonical_header_name(name)?;
        Ok(self.first_header(name))
    }

    /// Every value of a header in wire order, same name rules as [`header`](Self::header).
    pub fn header_values(&self, name: &str) -> Result<Vec<&str>> {
        let name = canonical_header_name(name)?;
        Ok(all_values(self.headers(), &name))
    }

    /// [`header`](Self::header) with a fallback value.
    pub fn header_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        Ok(self.header(name)?.unwrap_or(default))
    }

    /// Trailer lookup; trailers exist only once a chunked body was consumed.
    pub fn trailer(&self, name: &str) -> Result<Option<&str>> {
        let name = canonical_header_name(name)?;
        Ok(self
            .meta
            .trailers
            .get()
            .and_then(|trailers| trailers.get(name))
            .and_then(|v| v.to_str().ok()))
    }

    /// [`trailer`](Self::trailer) with a fallback value.
    pub fn trailer_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str> {
        Ok(self.trailer(name)?.unwrap_or(default))
    }

    /// Record trailers received after the body. Only the first call has effect.
    pub fn set_trailers(&self, trailers: HeaderMap) -> bool {
        self.meta.trailers.set(trailers).is_ok()
    }

    /// Check the content type against a short name or media type.
    ///
    /// `*` on either side matches any type or subtype, each compared on its own.
    pub fn is_content_type(&self, expected: &str) -> Result<bool> {
        if expected.trim().is_empty() {
            return Err(TransportError::invalid_argument("type", "empty content type"));
        }

        let content_type = self.content_type();
        if content_type.is_empty() {
            return Ok(false);
        }

        let expected = mime::normalize(expected).to_ascii_lowercase();
        if !expected.contains('*') && !content_type.contains('*') {
            return Ok(content_type == expected);
        }

        let (expected_kind, expected_sub) = expected.split_once('/').unwrap_or((expected.as_str(), ""));
        let (actual_kind, actual_sub) = content_type.split_once('/').unwrap_or((content_type, ""));
        let segment = |a: &str, b: &str| a == "*" || b == "*" || a == b;

        Ok(segment(expected_kind, actual_kind) && segment(expected_sub, actual_sub))
    }

    pub fn is_chunked(&self) -> bool {
        self.first_header(header::TRANSFER_ENCODING) == Some("chunked")
    }

    /// Persistent connection per `Connection`, else per protocol version.
    pub fn is_keep_alive(&self) -> bool {
        *self.meta.keep_alive.get_or_init(|| {
            match self.first_header(header::CONNECTION) {
                Some(value) => value.to_ascii_lowercase().contains("keep-alive"),
                None => self.version() != Version::HTTP_10,
            }
        })
    }

    pub fn is_secure(&self) -> bool {
        *self.meta.secure.get_or_init(|| self.encrypted)
    }

    /// `false` unless [`mark_upgrade`](Self::mark_upgrade) was called.
    pub fn is_upgrade_request(&self) -> bool {
        self.meta.upgrade.get().copied().unwrap_or(false)
    }

    /// Flag this request as switching protocols. The first call wins.
    pub fn mark_upgrade(&self, upgraded: bool) -> bool {
        let accepted = self.meta.upgrade.set(upgraded).is_ok();
        if !accepted {
            tracing::debug!(method = %self.method(), url = %self.url(), "Upgrade flag already set");
        }
        accepted
    }

    pub fn is_upload(&self) -> bool {
        matches!(*self.method(), Method::PATCH | Method::POST | Method::PUT)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.first_header(header::USER_AGENT)
    }

    fn negotiator(&self) -> &Negotiator {
        self.meta.negotiator.get_or_init(|| {
            Negotiator::new(
                self.first_header(header::ACCEPT),
                self.first_header(header::ACCEPT_ENCODING),
            )
        })
    }

    fn first_header<K: axum::http::header::AsHeaderName>(&self, name: K) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }
}

impl IncomingRequest<Body> {
    /// Consume the body, keeping any trailers for [`trailer`](Self::trailer).
    pub async fn collect_body(&mut self) -> std::result::Result<Bytes, BoxError> {
        let body = std::mem::take(self.inner.body_mut());
        let collected = body.collect().await?;
        if let Some(trailers) = collected.trailers() {
            self.set_trailers(trailers.clone());
        }
        Ok(collected.to_bytes())
    }
}

impl<B> fmt::Display for IncomingRequest<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} HTTP/{}",
            self.method(),
            self.url(),
            version_number(self.version())
        )?;
        let headers = self.headers();
        for name in headers.keys() {
            writeln!(f, "{}: {}", name, all_values(headers, name).join(", "))?;
        }
        Ok(())
    }
}

fn all_values<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Vec<&'a str> {
    headers
        .get_all(name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

fn version_number(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

fn canonical_header_name(name: &str) -> Result<HeaderName> {
    let lowered = name.trim().to_ascii_lowercase();
    if lowered == "referrer" {
        return Ok(header::REFERER);
    }
    HeaderName::from_bytes(lowered.as_bytes())
        .map_err(|_| TransportError::invalid_argument("name", format!("`{}` is not a header name", name.escape_debug())))
}

/// Base-10 integer prefix, the way lenient HTTP stacks read `Content-Length`.
fn parse_leading_digits(value: &str) -> Option<u64> {
    let value = value.trim();
    let end = value
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(value.len());
    value[..end].parse().ok()
}
