use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};

use crate::DumpError;
use crate::fetch::{FetchRequest, FetchResponse, HttpFetch};

/// Initialize tracing for tests with appropriate settings
#[inline]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone)]
pub enum Reply {
    Body { status: u16, body: Bytes },
    /// Sends `partial`, then fails mid-body
    Interrupted { status: u16, partial: Bytes },
    /// Fails before any response arrives
    NetworkDown,
}

impl Reply {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self::Body {
            status: 200,
            body: body.into(),
        }
    }

    pub fn partial(body: impl Into<Bytes>) -> Self {
        Self::Body {
            status: 206,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::Body {
            status,
            body: Bytes::new(),
        }
    }
}

/// [`HttpFetch`] fake replaying scripted replies per URL.
///
/// Replies for a URL are consumed in order; the last one repeats forever.
/// Unknown URLs answer 404. Every request is recorded.
#[derive(Default)]
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.replies
            .lock()
            .entry(url.to_string())
            .or_default()
            .extend(replies);
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.url.as_str() == url)
            .count()
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut replies = self.replies.lock();
        match replies.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::status(404)),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::status(404)),
            None => Reply::status(404),
        }
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetcher {
    async fn get(&self, request: FetchRequest) -> Result<FetchResponse, DumpError> {
        let url = request.url.clone();
        self.requests.lock().push(request);

        let transfer_error = |url: &url::Url| DumpError::Transfer {
            url: url.to_string(),
            reason: "connection reset".to_string(),
        };

        match self.next_reply(url.as_str()) {
            Reply::Body { status, body } => Ok(FetchResponse {
                status: StatusCode::from_u16(status).unwrap(),
                url,
                body: futures::stream::iter(vec![Ok(body)]).boxed(),
            }),
            Reply::Interrupted { status, partial } => {
                let err = transfer_error(&url);
                Ok(FetchResponse {
                    status: StatusCode::from_u16(status).unwrap(),
                    url,
                    body: futures::stream::iter(vec![Ok(partial), Err(err)]).boxed(),
                })
            }
            Reply::NetworkDown => Err(transfer_error(&url)),
        }
    }
}
