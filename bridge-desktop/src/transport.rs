//! HTTP Media Transport Implementation
//!
//! Ships media bytes to an HTTP endpoint with honest transient/permanent
//! error classification: connection failures, timeouts, 408/429 and 5xx
//! responses are worth retrying; any other 4xx rejection is final.

use async_trait::async_trait;
use bridge_traits::{
    assets::MediaItem,
    error::{BridgeError, Result},
    transport::{MediaTransport, RemoteMediaRef},
};
use bytes::Bytes;
use reqwest::StatusCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Uploads media over HTTP (PUT per item).
pub struct HttpMediaTransport {
    client: reqwest::Client,
    endpoint: String,
    bearer_token: Option<String>,
}

impl HttpMediaTransport {
    /// Create a transport targeting `{endpoint}/media`.
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("HTTP client init: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bearer_token: None,
        })
    }

    /// Attach a bearer token to every upload request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    fn upload_url(&self) -> String {
        format!("{}/media", self.endpoint)
    }

    /// `None` for success; `Some(transient)` for failures.
    fn classify_status(status: StatusCode) -> Option<bool> {
        if status.is_success() {
            return None;
        }
        let transient = status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS;
        Some(transient)
    }
}

#[async_trait]
impl MediaTransport for HttpMediaTransport {
    async fn upload(
        &self,
        item: &MediaItem,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<RemoteMediaRef> {
        let url = self.upload_url();
        let size = data.len();

        let mut request = self
            .client
            .put(&url)
            .query(&[("id", item.id.as_str()), ("kind", item.kind.as_str())])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        debug!(media_id = %item.id, size, url = %url, "Uploading media");

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(media_id = %item.id, "Upload aborted by cancellation");
                return Err(BridgeError::Transfer {
                    message: "transfer aborted".to_string(),
                    transient: true,
                });
            }
            response = request.send() => response,
        };

        let response = response.map_err(|e| {
            // Connection-level failures are transient by nature.
            BridgeError::Transfer {
                message: format!("request failed: {}", e),
                transient: true,
            }
        })?;

        let status = response.status();
        if let Some(transient) = Self::classify_status(status) {
            warn!(media_id = %item.id, status = %status, transient, "Upload rejected");
            return Err(BridgeError::Transfer {
                message: format!("server responded {}", status),
                transient,
            });
        }

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{}?id={}", url, item.id));

        debug!(media_id = %item.id, location = %location, "Upload accepted");
        Ok(RemoteMediaRef::new(location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::assets::{MediaItemId, MediaKind};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn photo(id: &str) -> MediaItem {
        MediaItem {
            id: MediaItemId::new(id),
            kind: MediaKind::Photo,
            created_at: 1_700_000_000,
            is_favorite: true,
            file_size: Some(9),
        }
    }

    /// Minimal one-shot HTTP server answering with a canned response.
    async fn one_shot_server(response: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = vec![0u8; 16 * 1024];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(HttpMediaTransport::classify_status(StatusCode::OK), None);
        assert_eq!(
            HttpMediaTransport::classify_status(StatusCode::CREATED),
            None
        );
        assert_eq!(
            HttpMediaTransport::classify_status(StatusCode::BAD_GATEWAY),
            Some(true)
        );
        assert_eq!(
            HttpMediaTransport::classify_status(StatusCode::TOO_MANY_REQUESTS),
            Some(true)
        );
        assert_eq!(
            HttpMediaTransport::classify_status(StatusCode::REQUEST_TIMEOUT),
            Some(true)
        );
        assert_eq!(
            HttpMediaTransport::classify_status(StatusCode::FORBIDDEN),
            Some(false)
        );
        assert_eq!(
            HttpMediaTransport::classify_status(StatusCode::PAYLOAD_TOO_LARGE),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_successful_upload_uses_location_header() {
        let endpoint = one_shot_server(
            "HTTP/1.1 201 Created\r\nLocation: /u/42\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = HttpMediaTransport::new(endpoint).unwrap();
        let remote = transport
            .upload(
                &photo("DCIM/IMG_0001.jpg"),
                Bytes::from_static(b"jpeg-data"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(remote.location, "/u/42");
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let endpoint = one_shot_server(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = HttpMediaTransport::new(endpoint).unwrap();
        let err = transport
            .upload(
                &photo("a"),
                Bytes::from_static(b"jpeg-data"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            BridgeError::Transfer { transient, .. } => assert!(transient),
            other => panic!("expected Transfer error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_client_rejection_is_permanent() {
        let endpoint = one_shot_server(
            "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = HttpMediaTransport::new(endpoint).unwrap();
        let err = transport
            .upload(
                &photo("a"),
                Bytes::from_static(b"jpeg-data"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_cancelled_upload_aborts() {
        // No server needed: the token is tripped before the request races.
        let transport = HttpMediaTransport::new("http://127.0.0.1:1").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = transport
            .upload(&photo("a"), Bytes::from_static(b"jpeg-data"), &cancel)
            .await
            .unwrap_err();

        match err {
            BridgeError::Transfer { message, .. } => assert!(message.contains("aborted")),
            other => panic!("expected Transfer error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_failure_is_transient() {
        // Nothing listens on this port.
        let transport = HttpMediaTransport::new("http://127.0.0.1:1").unwrap();
        let err = transport
            .upload(
                &photo("a"),
                Bytes::from_static(b"jpeg-data"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.is_transient());
    }
}
