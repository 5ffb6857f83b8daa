//! Listener startup outcome and the running-server handle.
//!
//! # Responsibilities
//! - Settle the startup outcome exactly once, from whichever of the bind
//!   success and bind error events fires first
//! - Expose the bound address and graceful shutdown of a running transport
//! - Surface post-bind transport errors through [`ListeningServer::closed`]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum_server::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// One-shot settle guard shared by competing event sources.
///
/// The first [`settle`](Self::settle) delivers its value; every later call is
/// a no-op that hands the value back.
#[derive(Debug)]
pub struct SettleGuard<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for SettleGuard<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> SettleGuard<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver `value` unless already settled; returns it back otherwise.
    pub fn settle(&self, value: T) -> Option<T> {
        let sender = self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        match sender {
            Some(tx) => {
                // a dropped receiver means nobody awaits the outcome anymore
                let _ = tx.send(value);
                None
            }
            None => Some(value),
        }
    }

    pub fn is_settled(&self) -> bool {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).is_none()
    }
}

/// A transport that has bound and is accepting connections.
#[derive(Debug)]
pub struct ListeningServer {
    local_addr: SocketAddr,
    secure: bool,
    handle: Handle,
    task: JoinHandle<io::Result<()>>,
    shutdown_grace: Duration,
}

impl ListeningServer {
    pub(crate) fn new(
        local_addr: SocketAddr,
        secure: bool,
        handle: Handle,
        task: JoinHandle<io::Result<()>>,
        shutdown_grace: Duration,
    ) -> Self {
        Self {
            local_addr,
            secure,
            handle,
            task,
            shutdown_grace,
        }
    }

    /// Address the transport actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Currently open connections.
    pub fn connection_count(&self) -> usize {
        self.handle.connection_count()
    }

    /// Stop accepting and let in-flight requests finish within the grace period.
    pub fn shutdown(&self) {
        tracing::info!(
            address = %self.local_addr,
            grace_secs = self.shutdown_grace.as_secs(),
            "Graceful shutdown requested"
        );
        self.handle.graceful_shutdown(Some(self.shutdown_grace));
    }

    /// Wait for the transport to stop. Errors after listening surface here.
    pub async fn closed(self) -> io::Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(join_error) => Err(io::Error::other(join_error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_settle_wins() {
        let (guard, rx) = SettleGuard::<u32>::new();
        let other = guard.clone();

        assert!(!guard.is_settled());
        assert_eq!(guard.settle(1), None);
        assert_eq!(other.settle(2), Some(2));
        assert!(other.is_settled());
        assert_eq!(rx.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_settle_after_receiver_dropped() {
        let (guard, rx) = SettleGuard::<&str>::new();
        drop(rx);
        assert_eq!(guard.settle("late"), None);
        assert_eq!(guard.settle("later"), Some("later"));
    }

    #[tokio::test]
    async fn test_dropped_guards_close_receiver() {
        let (guard, rx) = SettleGuard::<()>::new();
        drop(guard);
        assert!(rx.await.is_err());
    }
}
