use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use futures_util::TryStreamExt;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SessionError;

/// Raw response body, chunked however the transport delivers it.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, io::Error>> + Send>>;

/// Body of a synthesis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: String,
}

/// Opens the long-lived response stream for one synthesis request.
#[async_trait]
pub trait SynthesisTransport: Send + Sync {
    async fn open(&self, endpoint: &Url, request: &SynthesisRequest) -> Result<ByteStream, SessionError>;
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

const UNKNOWN_BACKEND_ERROR: &str = "Unknown error from TTS backend.";

/// Extract the `detail` field of an error response body.
pub fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: Some(serde_json::Value::String(detail)),
        }) if !detail.is_empty() => detail,
        Ok(ErrorBody {
            detail: Some(detail),
        }) if !detail.is_null() && !detail.is_string() => detail.to_string(),
        _ => UNKNOWN_BACKEND_ERROR.to_string(),
    }
}

/// HTTP transport: `POST {endpoint}/generate` with a JSON body, streaming the
/// chunked response.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SynthesisTransport for HttpTransport {
    async fn open(&self, endpoint: &Url, request: &SynthesisRequest) -> Result<ByteStream, SessionError> {
        let url = format!("{}/generate", endpoint.as_str().trim_end_matches('/'));
        debug!("POST {url}");

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| SessionError::Transport(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            warn!("TTS backend rejected request with {status}: {detail}");
            return Err(SessionError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let chunks = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Box::pin(chunks))
    }
}
