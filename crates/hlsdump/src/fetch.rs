// Outbound HTTP: the single seam through which playlists and segments are fetched.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::trace;
use url::Url;

use crate::DumpError;

pub type BodyStream = BoxStream<'static, Result<Bytes, DumpError>>;

/// Inclusive-exclusive byte window of a resource: `offset..offset + length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub offset: u64,
    pub length: u64,
}

impl ByteRange {
    /// Value for the `Range` request header.
    pub fn header_value(&self) -> String {
        let last = self.offset.saturating_add(self.length.saturating_sub(1));
        format!("bytes={}-{}", self.offset, last)
    }
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub range: Option<ByteRange>,
    pub timeout: Option<Duration>,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            range: None,
            timeout: None,
        }
    }

    pub fn with_range(mut self, range: Option<ByteRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Status a successful response must carry.
    pub fn expected_status(&self) -> StatusCode {
        if self.range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        }
    }
}

pub struct FetchResponse {
    pub status: StatusCode,
    /// URL the body was served from, after redirects.
    pub url: Url,
    pub body: BodyStream,
}

impl FetchResponse {
    /// Fails with [`DumpError::HttpStatus`] unless the status is `expected`.
    pub fn require_status(self, expected: StatusCode) -> Result<Self, DumpError> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(DumpError::http_status(self.status, self.url.as_str()))
        }
    }

    /// Collects the whole body.
    pub async fn bytes(self) -> Result<Bytes, DumpError> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, DumpError>;
}

/// [`HttpFetch`] backed by a shared reqwest client.
pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, DumpError> {
        let mut builder = self.client.get(request.url.clone());
        if let Some(range) = request.range {
            builder = builder.header(reqwest::header::RANGE, range.header_value());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let url = response.url().clone();
        trace!(%url, %status, http_version = ?response.version(), "Received response");

        let error_url = url.to_string();
        let body = response
            .bytes_stream()
            .map_err(move |e| DumpError::Transfer {
                url: error_url.clone(),
                reason: e.to_string(),
            })
            .boxed();

        Ok(FetchResponse { status, url, body })
    }
}
