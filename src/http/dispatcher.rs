//! Request dispatcher contract and the metadata dispatcher.
//!
//! The transport hands every request to a [`Dispatcher`]. Route matching,
//! persistence and hook chains live behind this trait and are not part of
//! this crate; [`MetadataDispatcher`] is a complete dispatcher that runs the
//! registered middleware and renders what the transport knows about the
//! request with the negotiated formatter.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::BoxError;
use crate::http::middleware::{run_middleware, Flow};
use crate::http::registry::InstanceRegistry;
use crate::http::request::IncomingRequest;

/// Downstream request router.
pub trait Dispatcher: Send + Sync + 'static {
    /// Prepare routing tables and resources. Completes before the transport binds.
    fn init(&self) -> impl Future<Output = Result<(), BoxError>> + Send;

    /// Produce the response for one request.
    fn dispatch(&self, request: IncomingRequest) -> impl Future<Output = Response> + Send;
}

/// Dispatcher that reports request metadata back to the client.
#[derive(Clone)]
pub struct MetadataDispatcher {
    registry: Arc<InstanceRegistry>,
}

impl MetadataDispatcher {
    pub fn new(registry: Arc<InstanceRegistry>) -> Self {
        Self { registry }
    }

    async fn summarize(&self, request: &mut IncomingRequest) -> serde_json::Value {
        let body_bytes = if request.is_upload() {
            match request.collect_body().await {
                Ok(bytes) => Some(bytes.len()),
                Err(error) => {
                    tracing::warn!(error = %error, "Failed to read request body");
                    None
                }
            }
        } else {
            None
        };

        json!({
            "method": request.method().as_str(),
            "url": request.url(),
            "location": request.location().to_string(),
            "content_type": request.content_type(),
            "content_length": request.content_length(),
            "body_bytes": body_bytes,
            "chunked": request.is_chunked(),
            "keep_alive": request.is_keep_alive(),
            "secure": request.is_secure(),
            "upgrade": request.is_upgrade_request(),
            "upload": request.is_upload(),
            "user_agent": request.user_agent(),
            "accepted_media_types": request.accepted_media_types(),
            "accepted_encodings": request.accepted_encodings(),
            "time": request.time(),
            "date": request.date().to_rfc3339(),
        })
    }
}

impl Dispatcher for MetadataDispatcher {
    async fn init(&self) -> Result<(), BoxError> {
        tracing::info!(
            formatters = self.registry.formatters().len(),
            middleware = self.registry.middleware().len(),
            "Metadata dispatcher ready"
        );
        Ok(())
    }

    async fn dispatch(&self, mut request: IncomingRequest) -> Response {
        let mut response = Response::default();

        match run_middleware(&self.registry.middleware(), &mut request, &mut response).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Halt) => return response,
            Err(error) => {
                tracing::warn!(error = %error, url = %request.url(), "Middleware chain failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response();
            }
        }

        let formatter = match self.registry.select_formatter(&request) {
            Ok(Some(formatter)) => formatter,
            Ok(None) => return StatusCode::NOT_ACCEPTABLE.into_response(),
            Err(error) => return (StatusCode::BAD_REQUEST, error.to_string()).into_response(),
        };

        let summary = self.summarize(&mut request).await;
        let body = match formatter.format(&summary) {
            Ok(body) => body,
            Err(error) => {
                tracing::error!(error = %error, media_type = formatter.media_type(), "Formatter failed");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        match HeaderValue::from_str(formatter.media_type()) {
            Ok(value) => {
                response.headers_mut().insert(header::CONTENT_TYPE, value);
            }
            Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
        *response.body_mut() = Body::from(body);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::formatter::{JsonFormatter, TextFormatter};
    use crate::http::middleware::ConnectMiddleware;
    use crate::http::registry::{Instance, RegistrationKind, Registry};
    use axum::http::Request;
    use http_body_util::BodyExt;

    fn registry() -> Arc<InstanceRegistry> {
        let registry = Arc::new(InstanceRegistry::new());
        registry.register_instance(RegistrationKind::Formatter, Instance::formatter(JsonFormatter::default()));
        registry.register_instance(RegistrationKind::Formatter, Instance::formatter(TextFormatter));
        registry
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_reports_metadata() {
        let dispatcher = MetadataDispatcher::new(registry());
        dispatcher.init().await.unwrap();

        let request = IncomingRequest::new(
            Request::builder()
                .method("POST")
                .uri("/users?limit=3")
                .header("Host", "api.local")
                .header("Content-Type", "application/json; charset=utf-8")
                .header("Content-Length", "2")
                .body(Body::from("{}"))
                .unwrap(),
            false,
        );
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let body = body_json(response).await;
        assert_eq!(body["location"], "http://api.local/users?limit=3");
        assert_eq!(body["content_type"], "application/json");
        assert_eq!(body["content_length"], 2);
        assert_eq!(body["body_bytes"], 2);
        assert_eq!(body["upload"], true);
    }

    #[tokio::test]
    async fn test_dispatch_not_acceptable() {
        let dispatcher = MetadataDispatcher::new(registry());
        let request = IncomingRequest::new(
            Request::builder().header("Accept", "image/webp").body(Body::empty()).unwrap(),
            false,
        );
        let response = dispatcher.dispatch(request).await;
        assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_dispatch_middleware_error() {
        let registry = registry();
        registry.register_instance(
            RegistrationKind::Middleware,
            Instance::middleware(ConnectMiddleware::new(|_req, _res, next| {
                next.fail("rejected by policy");
            })),
        );

        let dispatcher = MetadataDispatcher::new(registry);
        let response = dispatcher
            .dispatch(IncomingRequest::new(Request::builder().body(Body::empty()).unwrap(), false))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
