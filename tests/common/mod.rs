//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use substance_transport::config::ServerConfig;
use substance_transport::http::{Dispatcher, Instance, IncomingRequest, RegistrationKind, Registry};
use substance_transport::BoxError;

/// An address on loopback that nothing is listening on right now.
pub fn free_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

pub fn self_signed_config() -> ServerConfig {
    let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    ServerConfig {
        secure: true,
        cert: Some(generated.serialize_pem().unwrap()),
        key: Some(generated.serialize_private_key_pem()),
        ..ServerConfig::default()
    }
}

/// Dispatcher whose init fails.
pub struct FailingDispatcher;

impl Dispatcher for FailingDispatcher {
    async fn init(&self) -> Result<(), BoxError> {
        Err("routing table unavailable".into())
    }

    async fn dispatch(&self, _request: IncomingRequest) -> Response {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}

/// Dispatcher that records whether `addr` was still free when init ran.
pub struct ProbingDispatcher {
    pub addr: SocketAddr,
    pub free_during_init: Arc<Mutex<Option<bool>>>,
}

impl Dispatcher for ProbingDispatcher {
    async fn init(&self) -> Result<(), BoxError> {
        let free = TcpListener::bind(self.addr).is_ok();
        *self.free_during_init.lock().unwrap() = Some(free);
        Ok(())
    }

    async fn dispatch(&self, request: IncomingRequest) -> Response {
        (StatusCode::OK, request.url()).into_response()
    }
}

/// Registry that only remembers what was registered.
#[derive(Default)]
pub struct RecordingRegistry {
    pub calls: Mutex<Vec<RegistrationKind>>,
}

impl Registry for RecordingRegistry {
    fn register_instance(&self, kind: RegistrationKind, instance: Instance) {
        assert_eq!(kind, instance.kind());
        self.calls.lock().unwrap().push(kind);
    }
}
