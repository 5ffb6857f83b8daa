//! Response body formatters selected through content negotiation.

use axum::body::Bytes;
use serde_json::Value;

use crate::error::BoxError;

/// Renders a response value as one media type.
pub trait Formatter: Send + Sync + 'static {
    /// Full media type this formatter produces, e.g. `application/json`.
    fn media_type(&self) -> &str;

    fn format(&self, value: &Value) -> Result<Bytes, BoxError>;
}

/// `application/json` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl Formatter for JsonFormatter {
    fn media_type(&self) -> &str {
        "application/json"
    }

    fn format(&self, value: &Value) -> Result<Bytes, BoxError> {
        let body = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(Bytes::from(body))
    }
}

/// `text/plain` output: strings verbatim, everything else as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn media_type(&self) -> &str {
        "text/plain"
    }

    fn format(&self, value: &Value) -> Result<Bytes, BoxError> {
        match value {
            Value::String(s) => Ok(Bytes::from(s.clone())),
            other => Ok(Bytes::from(other.to_string())),
        }
    }
}
