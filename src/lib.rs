//! Substance HTTP transport library.
//!
//! Request metadata and content negotiation over a plain or TLS listener,
//! with a pluggable dispatcher behind it.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::TransportConfig;
pub use error::{BoxError, TransportError};
pub use http::{IncomingRequest, ServerBootstrap};
pub use net::ListeningServer;
