use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::fmt;
use std::time::Duration;

use crate::error::{ArchiveError, Result};
use crate::utils::constants::EXPECTED_CONTENT_TYPE;

/// Response body, pulled chunk by chunk. Dropping it unread abandons the transfer.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Status line and headers of an HTTP exchange, with the body not yet read.
pub struct FetchResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: BodyStream,
}

impl FetchResponse {
    /// A response whose body is already in memory.
    pub fn buffered(status: u16, content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            content_type: content_type.map(str::to_string),
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    /// True when the declared media type is `application/octet-stream`, ignoring
    /// parameters and case.
    pub fn is_binary(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or("").trim())
            .is_some_and(|essence| essence.eq_ignore_ascii_case(EXPECTED_CONTENT_TYPE))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for FetchResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// GET access to the remote forecast tree.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Resolves once the headers are in. Network-level failures are errors; HTTP
    /// status codes are not.
    async fn get(&self, url: &str) -> Result<FetchResponse>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse> {
        let response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(ArchiveError::from))
            .boxed();

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}
