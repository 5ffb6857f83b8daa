//! Middleware contract and the connect-style adapter.
//!
//! # Data Flow
//! ```text
//! registered middleware (in registration order)
//!     → Middleware::handle(request, response)
//!     → Flow::Continue  → next middleware
//!     → Flow::Halt      → chain stops, response is final
//!     → Err(error)      → chain stops, error returned to the dispatcher
//! ```

use std::sync::Arc;

use axum::response::Response;
use futures_util::future::BoxFuture;
use tokio::sync::oneshot;

use crate::error::BoxError;
use crate::http::request::IncomingRequest;

/// What the chain does after a middleware returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Halt,
}

/// Future-aware middleware.
pub trait Middleware: Send + Sync + 'static {
    fn handle<'a>(
        &'a self,
        request: &'a mut IncomingRequest,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow, BoxError>>;
}

/// One-shot continuation handed to connect-style middleware.
///
/// Calling it with `None` continues the chain, with `Some(error)` fails it.
/// Dropping it without a call halts the chain.
#[derive(Debug)]
pub struct Next {
    tx: oneshot::Sender<Option<BoxError>>,
}

impl Next {
    pub fn call(self, error: Option<BoxError>) {
        // receiver gone means the chain was already abandoned
        let _ = self.tx.send(error);
    }

    pub fn proceed(self) {
        self.call(None);
    }

    pub fn fail(self, error: impl Into<BoxError>) {
        self.call(Some(error.into()));
    }
}

/// Adapts a `(request, response, next)` function to [`Middleware`].
pub struct ConnectMiddleware<F> {
    func: F,
}

impl<F> ConnectMiddleware<F>
where
    F: Fn(&mut IncomingRequest, &mut Response, Next) + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Middleware for ConnectMiddleware<F>
where
    F: Fn(&mut IncomingRequest, &mut Response, Next) + Send + Sync + 'static,
{
    fn handle<'a>(
        &'a self,
        request: &'a mut IncomingRequest,
        response: &'a mut Response,
    ) -> BoxFuture<'a, Result<Flow, BoxError>> {
        let (tx, rx) = oneshot::channel();
        (self.func)(request, response, Next { tx });

        Box::pin(async move {
            match rx.await {
                Ok(None) => Ok(Flow::Continue),
                Ok(Some(error)) => Err(error),
                Err(_) => Ok(Flow::Halt),
            }
        })
    }
}

/// Run `chain` in order until one halts or fails.
pub async fn run_middleware(
    chain: &[Arc<dyn Middleware>],
    request: &mut IncomingRequest,
    response: &mut Response,
) -> Result<Flow, BoxError> {
    for middleware in chain {
        if middleware.handle(request, response).await? == Flow::Halt {
            return Ok(Flow::Halt);
        }
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> IncomingRequest {
        IncomingRequest::new(Request::builder().uri("/").body(Default::default()).unwrap(), false)
    }

    #[tokio::test]
    async fn test_next_without_error_continues() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(ConnectMiddleware::new(move |_req, _res, next| {
                counter.fetch_add(1, Ordering::SeqCst);
                next.proceed();
            })),
            Arc::new(ConnectMiddleware::new(|_req, res: &mut Response, next| {
                *res.status_mut() = StatusCode::ACCEPTED;
                next.call(None);
            })),
        ];

        let mut req = request();
        let mut res = Response::default();
        let flow = run_middleware(&chain, &mut req, &mut res).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(res.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_next_with_error_fails_chain() {
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = reached.clone();
        let chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(ConnectMiddleware::new(|_req, _res, next| {
                next.fail("session store unavailable");
            })),
            Arc::new(ConnectMiddleware::new(move |_req, _res, next| {
                counter.fetch_add(1, Ordering::SeqCst);
                next.proceed();
            })),
        ];

        let mut req = request();
        let mut res = Response::default();
        let err = run_middleware(&chain, &mut req, &mut res).await.unwrap_err();

        assert_eq!(err.to_string(), "session store unavailable");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dropped_next_halts() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(ConnectMiddleware::new(
            |_req, res: &mut Response, next: Next| {
                *res.status_mut() = StatusCode::UNAUTHORIZED;
                drop(next);
            },
        ))];

        let mut req = request();
        let mut res = Response::default();
        let flow = run_middleware(&chain, &mut req, &mut res).await.unwrap();

        assert_eq!(flow, Flow::Halt);
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_next_called_later() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(ConnectMiddleware::new(
            |_req, _res, next: Next| {
                tokio::spawn(async move {
                    tokio::task::yield_now().await;
                    next.proceed();
                });
            },
        ))];

        let mut req = request();
        let mut res = Response::default();
        let flow = run_middleware(&chain, &mut req, &mut res).await.unwrap();
        assert_eq!(flow, Flow::Continue);
    }
}
