//! Listen lifecycle and registration through the public bootstrap API.

mod common;

use std::sync::{Arc, Mutex};

use common::{
    free_addr, loopback, self_signed_config, FailingDispatcher, ProbingDispatcher, RecordingRegistry,
};
use substance_transport::config::ServerConfig;
use substance_transport::http::{
    ConnectMiddleware, Instance, InstanceRegistry, JsonFormatter, MetadataDispatcher, RegistrationKind, ServerBootstrap,
    TextFormatter,
};
use substance_transport::TransportError;

fn metadata_server() -> ServerBootstrap<MetadataDispatcher> {
    let registry = Arc::new(InstanceRegistry::new());
    let server = ServerBootstrap::new(
        &ServerConfig::default(),
        MetadataDispatcher::new(Arc::clone(&registry)),
        registry,
    )
    .unwrap();
    server
        .register("formatter", Instance::formatter(JsonFormatter::default()))
        .unwrap()
        .register("formatter", Instance::formatter(TextFormatter))
        .unwrap();
    server
}

#[tokio::test]
async fn test_init_failure_never_binds() {
    let addr = free_addr();
    let server = ServerBootstrap::new(
        &ServerConfig::default(),
        FailingDispatcher,
        Arc::new(InstanceRegistry::new()),
    )
    .unwrap();

    let err = server.listen(addr).await.unwrap_err();
    assert!(matches!(err, TransportError::DispatcherInit(_)));
    assert!(err.to_string().contains("routing table unavailable"));

    assert!(tokio::net::TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_init_completes_before_bind() {
    let addr = free_addr();
    let free_during_init = Arc::new(Mutex::new(None));
    let dispatcher = ProbingDispatcher {
        addr,
        free_during_init: Arc::clone(&free_during_init),
    };
    let server = ServerBootstrap::new(&ServerConfig::default(), dispatcher, Arc::new(InstanceRegistry::new()))
        .unwrap();

    let running = server.listen(addr).await.unwrap();
    assert_eq!(running.local_addr(), addr);
    assert_eq!(*free_during_init.lock().unwrap(), Some(true));

    running.shutdown();
    running.closed().await.unwrap();
}

#[tokio::test]
async fn test_secure_without_material_is_rejected() {
    let config = ServerConfig {
        secure: true,
        cert: Some("/nonexistent/cert.pem".to_string()),
        ..ServerConfig::default()
    };
    let result = ServerBootstrap::new(&config, FailingDispatcher, Arc::new(InstanceRegistry::new()));
    match result {
        Err(TransportError::Configuration(message)) => {
            assert_eq!(message, "HTTPS requires certificate and key")
        }
        other => panic!("expected configuration error, got {:?}", other.err()),
    }
}

#[tokio::test]
async fn test_registrations_reach_registry() {
    let registry = Arc::new(RecordingRegistry::default());
    let server = ServerBootstrap::new(&ServerConfig::default(), FailingDispatcher, Arc::clone(&registry)).unwrap();

    server
        .use_middleware(|_req, _res, next| next.proceed())
        .register(
            "middleware",
            Instance::middleware(ConnectMiddleware::new(|_req, _res, next| next.proceed())),
        )
        .unwrap()
        .register("formatter", Instance::formatter(TextFormatter))
        .unwrap();

    let err = server
        .register("unknown", Instance::formatter(TextFormatter))
        .unwrap_err();
    assert!(matches!(err, TransportError::Configuration(_)));

    assert_eq!(
        *registry.calls.lock().unwrap(),
        vec![
            RegistrationKind::Middleware,
            RegistrationKind::Middleware,
            RegistrationKind::Formatter
        ]
    );
}

#[tokio::test]
async fn test_bind_to_occupied_port_fails() {
    let holder = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = holder.local_addr().unwrap();

    let server = metadata_server();
    let err = server.listen(addr).await.unwrap_err();
    assert!(matches!(err, TransportError::BindFailure(_)));

    drop(holder);
    let running = server.listen(addr).await.unwrap();
    running.shutdown();
    running.closed().await.unwrap();
}

#[tokio::test]
async fn test_serves_negotiated_metadata() {
    let server = metadata_server();
    let running = server.listen(loopback()).await.unwrap();
    assert_eq!(running.connection_count(), 0);
    let base = format!("http://{}", running.local_addr());
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/users?limit=3", base))
        .header("Accept", "application/json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["method"], "GET");
    assert_eq!(body["accepted_media_types"], serde_json::json!(["application/json"]));
    assert_eq!(body["url"], "/users?limit=3");
    assert_eq!(body["secure"], false);
    assert_eq!(body["location"], format!("{}/users?limit=3", base));

    let response = client
        .get(&base)
        .header("Accept", "text/plain")
        .send()
        .await
        .unwrap();
    assert_eq!(response.headers()["content-type"], "text/plain");

    let response = client
        .get(&base)
        .header("Accept", "image/png")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 406);

    running.shutdown();
    running.closed().await.unwrap();
}

#[tokio::test]
async fn test_halting_middleware_short_circuits() {
    let server = metadata_server();
    server.use_middleware(|request, response, next| {
        if request.header("x-api-key").ok().flatten().is_none() {
            *response.status_mut() = axum::http::StatusCode::UNAUTHORIZED;
            drop(next);
            return;
        }
        next.proceed();
    });
    let running = server.listen(loopback()).await.unwrap();
    let url = format!("http://{}/", running.local_addr());
    let client = reqwest::Client::new();

    let denied = client.get(&url).send().await.unwrap();
    assert_eq!(denied.status(), 401);

    let allowed = client.get(&url).header("x-api-key", "k").send().await.unwrap();
    assert_eq!(allowed.status(), 200);

    running.shutdown();
    running.closed().await.unwrap();
}

#[tokio::test]
async fn test_second_listen_is_rejected() {
    let server = metadata_server();
    let running = server.listen(loopback()).await.unwrap();

    let err = server.listen(loopback()).await.unwrap_err();
    assert!(matches!(err, TransportError::Configuration(_)));

    running.shutdown();
    running.closed().await.unwrap();
}

#[tokio::test]
async fn test_secure_listen_binds() {
    let registry = Arc::new(InstanceRegistry::new());
    let server = ServerBootstrap::new(
        &self_signed_config(),
        MetadataDispatcher::new(Arc::clone(&registry)),
        registry,
    )
    .unwrap();
    assert!(server.is_secure());

    let running = server.listen(loopback()).await.unwrap();
    assert!(running.is_secure());
    assert!(tokio::net::TcpStream::connect(running.local_addr()).await.is_ok());

    running.shutdown();
    running.closed().await.unwrap();
}
