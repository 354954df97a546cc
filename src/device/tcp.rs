//! TCP reachability connection to the robot

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use super::{Connector, DeviceConnection};
use crate::common::credentials::Credentials;
use crate::common::{Error, Result};

/// Port assumed when the machine address carries none
const DEFAULT_PORT: u16 = 443;

/// Liveness re-probes use a shorter bound than the initial connect
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(3);

/// Connects to the machine address over TCP
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

/// Append the default port unless the address already names one
fn with_port(address: &str) -> String {
    let address = address
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');

    let has_port = match address.rfind(':') {
        // bracketed IPv6 literal: a port follows the closing bracket
        Some(idx) if address.starts_with('[') => address[..idx].ends_with(']'),
        Some(idx) => address[idx + 1..].parse::<u16>().is_ok() && address.matches(':').count() == 1,
        None => false,
    };

    if has_port {
        address.to_string()
    } else {
        format!("{}:{}", address, DEFAULT_PORT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Box<dyn DeviceConnection>> {
        credentials.require_api_key()?;
        let address = with_port(credentials.require_machine_address()?);

        tracing::info!("Connecting to {}", address);
        let stream = match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::Connection(format!("{}: {}", address, e)));
            }
            Err(_) => {
                return Err(Error::Connection(format!(
                    "{}: timed out after {} seconds",
                    address,
                    self.connect_timeout.as_secs()
                )));
            }
        };

        Ok(Box::new(TcpDeviceConnection {
            address,
            stream: Some(stream),
        }))
    }
}

/// Connection handle holding the initial TCP stream open
#[derive(Debug)]
pub struct TcpDeviceConnection {
    address: String,
    stream: Option<TcpStream>,
}

#[async_trait]
impl DeviceConnection for TcpDeviceConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn is_alive(&self) -> bool {
        if self.stream.is_none() {
            return false;
        }
        match timeout(LIVENESS_TIMEOUT, TcpStream::connect(&self.address)).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::warn!("Liveness check against {} failed: {}", self.address, e);
                false
            }
            Err(_) => {
                tracing::warn!("Liveness check against {} timed out", self.address);
                false
            }
        }
    }

    fn release(&mut self) {
        self.stream.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn creds(address: &str) -> Credentials {
        Credentials {
            api_key: Some("key".into()),
            api_key_id: Some("key-id".into()),
            machine_address: Some(address.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_with_port() {
        assert_eq!(with_port("robot.viam.cloud"), "robot.viam.cloud:443");
        assert_eq!(with_port("robot.local:8080"), "robot.local:8080");
        assert_eq!(with_port("https://robot.viam.cloud/"), "robot.viam.cloud:443");
        assert_eq!(with_port("[::1]:9000"), "[::1]:9000");
        assert_eq!(with_port("[::1]"), "[::1]:443");
    }

    #[tokio::test]
    async fn test_connect_and_release() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                if listener.accept().await.is_err() {
                    break;
                }
            }
        });

        let connector = TcpConnector::new(Duration::from_secs(2));
        let mut conn = connector.connect(&creds(&addr)).await.unwrap();
        assert_eq!(conn.address(), addr);
        assert!(conn.is_alive().await);

        conn.release();
        assert!(!conn.is_alive().await);
    }

    #[tokio::test]
    async fn test_connect_requires_api_key() {
        let connector = TcpConnector::new(Duration::from_secs(1));
        let mut c = creds("127.0.0.1:1");
        c.api_key = None;
        let err = connector.connect(&c).await.err().unwrap();
        assert!(matches!(err, Error::MissingCredential("API_KEY")));
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let connector = TcpConnector::new(Duration::from_secs(2));
        let err = connector.connect(&creds(&addr)).await.err().unwrap();
        assert!(err.is_connection());
    }
}
