//! Error taxonomy for the transport layer.
//!
//! # Propagation
//! - `Configuration` and `InvalidArgument` are raised synchronously at the
//!   call site and are never retried.
//! - `BindFailure` and `DispatcherInit` are reported exactly once, through the
//!   outcome of [`ServerBootstrap::listen`](crate::http::ServerBootstrap::listen).

use thiserror::Error;

/// Boxed error used at collaborator boundaries (dispatcher, middleware, formatters).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Invalid setup: missing TLS material, unknown registration kind.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A metadata or negotiation accessor received a malformed argument.
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    /// The transport failed to bind before its first successful listen.
    #[error("failed to bind listener: {0}")]
    BindFailure(#[source] std::io::Error),

    /// The dispatcher's own initialization failed; the transport never bound.
    #[error("dispatcher initialization failed: {0}")]
    DispatcherInit(#[source] BoxError),
}

impl TransportError {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub(crate) fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }
}

/// Convenience result alias.
pub type Result<T, E = TransportError> = std::result::Result<T, E>;
