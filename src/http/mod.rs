//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (ServerBootstrap: Axum fallback, transport selection)
//!     → request.rs (IncomingRequest: lazily derived metadata)
//!     → dispatcher.rs (middleware chain, formatter selection)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod formatter;
pub mod location;
pub mod middleware;
pub mod mime;
pub mod negotiation;
pub mod registry;
pub mod request;
pub mod server;

pub use dispatcher::{Dispatcher, MetadataDispatcher};
pub use formatter::{Formatter, JsonFormatter, TextFormatter};
pub use location::Location;
pub use middleware::{ConnectMiddleware, Flow, Middleware, Next};
pub use negotiation::Negotiator;
pub use registry::{Instance, InstanceRegistry, RegistrationKind, Registry};
pub use request::{Candidates, IncomingRequest};
pub use server::ServerBootstrap;
