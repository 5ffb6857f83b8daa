//! Absolute location of an inbound request.

use std::fmt;

use axum::http::Uri;
use url::Url;

/// Absolute URI rebuilt from the request target, the transport's security
/// and the `Host` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    scheme: &'static str,
    authority: Option<String>,
    path: String,
    query: Option<String>,
}

impl Location {
    /// Build a location from a raw request target.
    ///
    /// A target that does not parse yields an empty skeleton; scheme and
    /// authority are applied either way.
    pub fn new(target: &str, secure: bool, host: Option<&str>) -> Self {
        let (path, query) = match target.parse::<Uri>() {
            Ok(uri) => (
                uri.path_and_query()
                    .map(|pq| pq.path().to_string())
                    .unwrap_or_default(),
                uri.query().map(str::to_string),
            ),
            Err(_) => (String::new(), None),
        };

        Self {
            scheme: if secure { "https" } else { "http" },
            authority: host.filter(|h| !h.is_empty()).map(str::to_string),
            path,
            query,
        }
    }

    pub fn scheme(&self) -> &str {
        self.scheme
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Parsed form, available once an authority is known.
    pub fn to_url(&self) -> Option<Url> {
        self.authority.as_ref()?;
        Url::parse(&self.to_string()).ok()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(authority) = &self.authority {
            f.write_str(authority)?;
        }
        f.write_str(&self.path)?;
        if let Some(query) = &self.query {
            write!(f, "?{}", query)?;
        }
        Ok(())
    }
}
