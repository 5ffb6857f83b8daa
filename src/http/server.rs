//! HTTP server bootstrap.
//!
//! # Responsibilities
//! - Choose the plain or TLS transport from configuration
//! - Wrap every inbound request in [`IncomingRequest`] and hand it to the dispatcher
//! - Register formatters and middleware with the registry collaborator
//! - Start listening: dispatcher init first, then bind, one settled outcome
//!
//! # Startup Ordering
//! ```text
//! listen(addr)
//!     → settle guard created (bind error path exists before binding)
//!     → dispatcher.init()          ── Err → DispatcherInit, never binds
//!     → spawn transport (bind)     ── Err before listening → BindFailure
//!     → handle.listening()         ── Some(addr) → ListeningServer
//! ```

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use axum_server::Handle;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::{Result, TransportError};
use crate::http::dispatcher::Dispatcher;
use crate::http::middleware::{ConnectMiddleware, Next};
use crate::http::registry::{Instance, InstanceRegistry, Registry, RegistrationKind};
use crate::http::request::IncomingRequest;
use crate::net::listener::{ListeningServer, SettleGuard};
use crate::net::tls::TlsMaterial;
use crate::observability::metrics;

/// The transport a bootstrap will bind.
#[derive(Debug)]
enum Transport {
    Plain,
    Tls(TlsMaterial),
}

impl Transport {
    fn is_secure(&self) -> bool {
        matches!(self, Transport::Tls(_))
    }
}

/// State injected into the dispatch handler.
struct DispatchState<D> {
    dispatcher: Arc<D>,
    secure: bool,
}

impl<D> Clone for DispatchState<D> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            secure: self.secure,
        }
    }
}

/// Owns the listening transport and its startup protocol.
pub struct ServerBootstrap<D, R = InstanceRegistry> {
    dispatcher: Arc<D>,
    registry: Arc<R>,
    transport: Transport,
    shutdown_grace: Duration,
    listening: AtomicBool,
}

impl<D, R> std::fmt::Debug for ServerBootstrap<D, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBootstrap")
            .field("transport", &self.transport)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("listening", &self.listening.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<D: Dispatcher, R: Registry> ServerBootstrap<D, R> {
    /// Create the bootstrap. With `secure` set, certificate and key must be
    /// present and parse, otherwise this fails before any socket work.
    pub fn new(config: &ServerConfig, dispatcher: D, registry: Arc<R>) -> Result<Self> {
        let transport = if config.secure {
            Transport::Tls(TlsMaterial::from_config(config)?)
        } else {
            Transport::Plain
        };

        tracing::debug!(secure = transport.is_secure(), "Server transport constructed");

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            registry,
            transport,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
            listening: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &Arc<R> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatcher
    }

    pub fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// Register a formatter or middleware under `kind`.
    pub fn register(&self, kind: &str, instance: Instance) -> Result<&Self> {
        let kind: RegistrationKind = kind.parse()?;
        if instance.kind() != kind {
            return Err(TransportError::configuration(format!(
                "cannot register a {} as {}",
                instance.kind(),
                kind
            )));
        }

        self.registry.register_instance(kind, instance);
        Ok(self)
    }

    /// Register a connect-style `(request, response, next)` function as middleware.
    pub fn use_middleware<F>(&self, func: F) -> &Self
    where
        F: Fn(&mut IncomingRequest, &mut Response, Next) + Send + Sync + 'static,
    {
        self.registry.register_instance(
            RegistrationKind::Middleware,
            Instance::middleware(ConnectMiddleware::new(func)),
        );
        self
    }

    /// Initialize the dispatcher, then bind `addr`.
    ///
    /// Resolves once the transport is accepting connections. Fails with
    /// [`TransportError::DispatcherInit`] without binding when the dispatcher
    /// cannot initialize, and with [`TransportError::BindFailure`] when the
    /// transport errors before it is listening. Only one successful `listen`
    /// is allowed per bootstrap.
    pub async fn listen(&self, addr: SocketAddr) -> Result<ListeningServer> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Err(TransportError::configuration("listen() already called on this server"));
        }

        let outcome = self.start(addr).await;
        match &outcome {
            Ok(server) => {
                metrics::record_listen("listening");
                tracing::info!(
                    address = %server.local_addr(),
                    secure = server.is_secure(),
                    "Listening for connections"
                );
            }
            Err(error) => {
                self.listening.store(false, Ordering::SeqCst);
                let result = match error {
                    TransportError::DispatcherInit(_) => "init_failed",
                    _ => "bind_failed",
                };
                metrics::record_listen(result);
                tracing::error!(address = %addr, error = %error, "Failed to start listening");
            }
        }
        outcome
    }

    async fn start(&self, addr: SocketAddr) -> Result<ListeningServer> {
        let (settle, outcome) = SettleGuard::<io::Result<SocketAddr>>::new();

        self.dispatcher
            .init()
            .await
            .map_err(TransportError::DispatcherInit)?;
        tracing::debug!("Dispatcher initialized; binding transport");

        let handle = Handle::new();
        let app = self.router().into_make_service();

        let task = match &self.transport {
            Transport::Plain => {
                let serving = axum_server::bind(addr).handle(handle.clone()).serve(app);
                tokio::spawn(serve_transport(serving, settle.clone()))
            }
            Transport::Tls(material) => {
                let rustls = material.rustls_config().await.map_err(|e| {
                    TransportError::configuration(format!("failed to build TLS configuration: {}", e))
                })?;
                let serving = axum_server::bind_rustls(addr, rustls)
                    .handle(handle.clone())
                    .serve(app);
                tokio::spawn(serve_transport(serving, settle.clone()))
            }
        };

        let watcher = handle.clone();
        tokio::spawn(async move {
            if let Some(bound) = watcher.listening().await {
                if settle.settle(Ok(bound)).is_some() {
                    tracing::debug!(address = %bound, "Listening reported after startup settled");
                }
            }
        });

        match outcome.await {
            Ok(Ok(local_addr)) => Ok(ListeningServer::new(
                local_addr,
                self.transport.is_secure(),
                handle,
                task,
                self.shutdown_grace,
            )),
            Ok(Err(error)) => Err(TransportError::BindFailure(error)),
            Err(_) => Err(TransportError::BindFailure(io::Error::other(
                "transport stopped before reporting a bind outcome",
            ))),
        }
    }

    fn router(&self) -> Router {
        let state = DispatchState {
            dispatcher: Arc::clone(&self.dispatcher),
            secure: self.transport.is_secure(),
        };

        Router::new()
            .fallback(dispatch::<D>)
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }
}

/// Drive the transport. Errors before listening settle the startup outcome;
/// later errors are returned to whoever awaits the server.
async fn serve_transport<F>(serving: F, settle: SettleGuard<io::Result<SocketAddr>>) -> io::Result<()>
where
    F: Future<Output = io::Result<()>>,
{
    match serving.await {
        Ok(()) => {
            let _ = settle.settle(Err(io::Error::other("transport closed before listening")));
            tracing::info!("HTTP server stopped");
            Ok(())
        }
        Err(error) => match settle.settle(Err(error)) {
            None => Ok(()),
            Some(rejected) => {
                let error = rejected
                    .err()
                    .unwrap_or_else(|| io::Error::other("transport failed after listening"));
                tracing::error!(error = %error, "Transport error after listening");
                Err(error)
            }
        },
    }
}

async fn dispatch<D: Dispatcher>(State(state): State<DispatchState<D>>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();

    let request = IncomingRequest::new(request, state.secure);
    tracing::trace!(request = %request, "Dispatching request");

    let response = state.dispatcher.dispatch(request).await;
    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}
