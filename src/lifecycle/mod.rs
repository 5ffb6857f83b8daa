//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → ServerBootstrap::listen
//!
//! Shutdown:
//!     Signal received → ListeningServer::shutdown → Drain within grace → Exit
//! ```

pub mod signals;

pub use signals::shutdown_signal;
