//! Device connection
//!
//! The session owns exactly one connection to the device under test for its
//! whole lifetime. [`ConnectionGuard`] scopes it: the connection is released
//! when the session terminates and, failing that, when the guard is dropped.

mod tcp;

pub use tcp::{TcpConnector, TcpDeviceConnection};

use async_trait::async_trait;

use crate::common::credentials::Credentials;
use crate::common::Result;

/// A live connection handle to the device under test
#[async_trait]
pub trait DeviceConnection: Send + Sync {
    /// Address of the connected machine
    fn address(&self) -> &str;

    /// Whether the device still answers
    async fn is_alive(&self) -> bool;

    /// Release the underlying resources. Called at most once.
    fn release(&mut self);
}

/// Establishes device connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect using the given credentials; fails with `Error::Connection`
    /// or `Error::MissingCredential`
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DeviceConnection>>;
}

/// Scoped ownership of a device connection
pub struct ConnectionGuard {
    conn: Option<Box<dyn DeviceConnection>>,
}

impl ConnectionGuard {
    pub fn new(conn: Box<dyn DeviceConnection>) -> Self {
        Self { conn: Some(conn) }
    }

    /// The connection, unless it has been released
    pub fn get(&self) -> Option<&dyn DeviceConnection> {
        self.conn.as_deref()
    }

    /// Release the connection now. Returns false if it was already released.
    pub fn release(&mut self) -> bool {
        match self.conn.take() {
            Some(mut conn) => {
                tracing::info!("Releasing device connection to {}", conn.address());
                conn.release();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.conn.is_none()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.conn {
            Some(conn) => write!(f, "ConnectionGuard({})", conn.address()),
            None => write!(f, "ConnectionGuard(released)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingConnection {
        releases: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DeviceConnection for CountingConnection {
        fn address(&self) -> &str {
            "robot.local"
        }

        async fn is_alive(&self) -> bool {
            true
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_releases_once() {
        let releases = Arc::new(AtomicUsize::new(0));
        let mut guard = ConnectionGuard::new(Box::new(CountingConnection {
            releases: releases.clone(),
        }));

        assert!(guard.release());
        assert!(!guard.release());
        drop(guard);

        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let releases = Arc::new(AtomicUsize::new(0));
        {
            let guard = ConnectionGuard::new(Box::new(CountingConnection {
                releases: releases.clone(),
            }));
            assert!(guard.get().is_some());
        }
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
