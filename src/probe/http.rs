//! Upload verification over HTTP
//!
//! Polls the location an upload is expected at. A 2xx answer with a video
//! or binary body counts as present and playable; 404 means "not there yet".

use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::StatusCode;

use super::{expand_template, Probe, ProbeError, ProbeOutcome, ProbeRequest};
use crate::common::{Error, Result};
use crate::device::DeviceConnection;

/// Content types accepted as playable media
const PLAYABLE_TYPES: &[&str] = &["video/", "application/octet-stream", "application/mp4"];

/// HTTP presence and playability probe
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str) -> Result<Self> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Configuration(format!(
                "http probe url must start with http:// or https://, got '{}'",
                url
            )));
        }
        let client = reqwest::Client::builder()
            .user_agent(concat!("rigcheck/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

fn classify_send_error(e: &reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::new(super::ProbeErrorKind::Timeout, e.to_string())
    } else if e.is_connect() {
        ProbeError::unreachable(e.to_string())
    } else {
        ProbeError::protocol_mismatch(e.to_string())
    }
}

fn evaluate(
    status: StatusCode,
    content_type: Option<&str>,
    content_length: Option<u64>,
    url: &str,
) -> std::result::Result<ProbeOutcome, ProbeError> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ProbeError::unauthorized(
            format!("{} answered {}", url, status),
        )),
        StatusCode::NOT_FOUND => Ok(ProbeOutcome::mismatch(format!("{} not uploaded yet", url))),
        s if s.is_success() => {
            let content_type = content_type.unwrap_or("");
            if !PLAYABLE_TYPES.iter().any(|t| content_type.starts_with(t)) {
                return Ok(ProbeOutcome::mismatch(format!(
                    "{} is '{}', not a playable video",
                    url, content_type
                )));
            }
            if content_length == Some(0) {
                return Ok(ProbeOutcome::mismatch(format!("{} is empty", url)));
            }
            let size = content_length
                .map(|n| format!("{} bytes", n))
                .unwrap_or_else(|| "unknown size".to_string());
            Ok(ProbeOutcome::matched(format!(
                "{} present ({}, {})",
                url, content_type, size
            )))
        }
        s => Err(ProbeError::protocol_mismatch(format!("{} answered {}", url, s))),
    }
}

#[async_trait]
impl Probe for HttpProbe {
    fn name(&self) -> &str {
        "http"
    }

    async fn probe(
        &self,
        _conn: &dyn DeviceConnection,
        request: &ProbeRequest<'_>,
    ) -> std::result::Result<ProbeOutcome, ProbeError> {
        let url = expand_template(&self.url, request.params);
        tracing::debug!("Checking upload at {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        evaluate(
            response.status(),
            content_type.as_deref(),
            content_length,
            &url,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeErrorKind;
    use std::collections::BTreeMap;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct Loopback;

    #[async_trait]
    impl DeviceConnection for Loopback {
        fn address(&self) -> &str {
            "127.0.0.1"
        }
        async fn is_alive(&self) -> bool {
            true
        }
        fn release(&mut self) {}
    }

    /// Serve one canned HTTP response; returns the base URL
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(HttpProbe::new("ftp://example.com/video.mp4").is_err());
    }

    #[test]
    fn test_evaluate_statuses() {
        let ok = evaluate(StatusCode::OK, Some("video/mp4"), Some(1024), "u").unwrap();
        assert!(ok.matched);

        let missing = evaluate(StatusCode::NOT_FOUND, None, None, "u").unwrap();
        assert!(!missing.matched);

        let html = evaluate(StatusCode::OK, Some("text/html"), Some(10), "u").unwrap();
        assert!(!html.matched);

        let empty = evaluate(StatusCode::OK, Some("video/mp4"), Some(0), "u").unwrap();
        assert!(!empty.matched);

        let denied = evaluate(StatusCode::FORBIDDEN, None, None, "u").unwrap_err();
        assert_eq!(denied.kind, ProbeErrorKind::Unauthorized);

        let broken = evaluate(StatusCode::BAD_GATEWAY, None, None, "u").unwrap_err();
        assert_eq!(broken.kind, ProbeErrorKind::ProtocolMismatch);
    }

    #[tokio::test]
    async fn test_probe_against_local_server() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: video/mp4\r\nContent-Length: 4\r\nConnection: close\r\n\r\nmp4!",
        )
        .await;
        let probe = HttpProbe::new(&format!("{}/{{preset}}.mp4", base)).unwrap();

        let mut params = BTreeMap::new();
        params.insert("preset".to_string(), "medium".to_string());
        let outcome = probe
            .probe(
                &Loopback,
                &ProbeRequest {
                    step_id: "upload-medium",
                    params: &params,
                },
            )
            .await
            .unwrap();

        assert!(outcome.matched);
        assert!(outcome.detail.contains("/medium.mp4"));
    }

    #[tokio::test]
    async fn test_probe_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = HttpProbe::new(&format!("http://{}/clip.mp4", addr)).unwrap();
        let params = BTreeMap::new();
        let err = probe
            .probe(
                &Loopback,
                &ProbeRequest {
                    step_id: "upload",
                    params: &params,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProbeErrorKind::Unreachable);
    }
}
