//! Registry boundary for formatters and middleware.
//!
//! # Responsibilities
//! - Define the two registration kinds and the [`Registry`] collaborator trait
//! - Provide [`InstanceRegistry`], the in-memory default
//! - Pick the formatter a request prefers through `Accept` negotiation

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::{Result, TransportError};
use crate::http::formatter::Formatter;
use crate::http::middleware::Middleware;
use crate::http::request::IncomingRequest;

/// The kinds of instance that can be registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegistrationKind {
    Formatter,
    Middleware,
}

impl RegistrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationKind::Formatter => "formatter",
            RegistrationKind::Middleware => "middleware",
        }
    }
}

impl FromStr for RegistrationKind {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "formatter" => Ok(RegistrationKind::Formatter),
            "middleware" => Ok(RegistrationKind::Middleware),
            other => Err(TransportError::configuration(format!(
                "`{}` is not an allowed registration type (expected formatter or middleware)",
                other
            ))),
        }
    }
}

impl fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered formatter or middleware.
#[derive(Clone)]
pub enum Instance {
    Formatter(Arc<dyn Formatter>),
    Middleware(Arc<dyn Middleware>),
}

impl Instance {
    pub fn formatter(formatter: impl Formatter) -> Self {
        Instance::Formatter(Arc::new(formatter))
    }

    pub fn middleware(middleware: impl Middleware) -> Self {
        Instance::Middleware(Arc::new(middleware))
    }

    pub fn kind(&self) -> RegistrationKind {
        match self {
            Instance::Formatter(_) => RegistrationKind::Formatter,
            Instance::Middleware(_) => RegistrationKind::Middleware,
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Formatter(formatter) => f
                .debug_tuple("Formatter")
                .field(&formatter.media_type())
                .finish(),
            Instance::Middleware(_) => f.write_str("Middleware"),
        }
    }
}

/// Store of registered instances, keyed by kind.
pub trait Registry: Send + Sync + 'static {
    fn register_instance(&self, kind: RegistrationKind, instance: Instance);
}

/// In-memory registry keeping instances in registration order.
#[derive(Default)]
pub struct InstanceRegistry {
    formatters: RwLock<Vec<Arc<dyn Formatter>>>,
    middleware: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl InstanceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn formatters(&self) -> Vec<Arc<dyn Formatter>> {
        self.formatters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn middleware(&self) -> Vec<Arc<dyn Middleware>> {
        self.middleware
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Formatter whose media type the request accepts best.
    pub fn select_formatter<B>(&self, request: &IncomingRequest<B>) -> Result<Option<Arc<dyn Formatter>>> {
        let formatters = self.formatters();
        let media_types: Vec<&str> = formatters.iter().map(|f| f.media_type()).collect();

        let Some(preferred) = request.accepts(media_types)? else {
            return Ok(None);
        };
        Ok(formatters
            .iter()
            .find(|f| f.media_type() == preferred)
            .cloned())
    }
}

impl Registry for InstanceRegistry {
    fn register_instance(&self, kind: RegistrationKind, instance: Instance) {
        tracing::debug!(kind = %kind, instance = ?instance, "Instance registered");
        match instance {
            Instance::Formatter(formatter) => self
                .formatters
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(formatter),
            Instance::Middleware(middleware) => self
                .middleware
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(middleware),
        }
    }
}
