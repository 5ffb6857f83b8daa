//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → tls.rs (optional: read and check certificate/key, build rustls config)
//!     → listener.rs (settle bind outcome once, running-server handle)
//!     → Hand off to HTTP layer
//!
//! Transport states:
//!     Constructed → Listening → (Error | Closed)
//! ```
//!
//! # Design Decisions
//! - TLS material problems fail at construction, before any socket work
//! - Bind success and bind error race for a single settle guard
//! - Errors after a successful bind go to the running-server handle

pub mod listener;
pub mod tls;

pub use listener::{ListeningServer, SettleGuard};
pub use tls::{CredentialSource, TlsMaterial};
