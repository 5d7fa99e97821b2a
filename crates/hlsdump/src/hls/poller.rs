// HLS Playlist Poller: reloads one rendition's media playlist and feeds newly
// discovered segments to the downloader.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::DumpError;
use crate::fetch::{FetchRequest, HttpFetch};
use crate::hls::manifest::SharedManifest;
use crate::hls::media::{MediaPlaylistParser, SegmentDescriptor};

/// Capacity of the queue between a rendition's poller and downloader.
pub const SEGMENT_QUEUE_CAPACITY: usize = 64;

/// A segment handed to the downloader, with the URL its URI is relative to.
#[derive(Debug, Clone)]
pub struct ScheduledSegment {
    pub base_url: Arc<Url>,
    pub segment: SegmentDescriptor,
}

impl ScheduledSegment {
    pub fn url(&self) -> Result<Url, DumpError> {
        self.base_url
            .join(&self.segment.uri)
            .map_err(|e| DumpError::invalid_url(&self.segment.uri, e))
    }
}

enum Delivery {
    Delivered,
    /// The downloader went away
    Closed,
}

pub struct PlaylistPoller {
    url: Url,
    fetcher: Arc<dyn HttpFetch>,
    parser: MediaPlaylistParser,
    manifest: SharedManifest,
    queue: mpsc::Sender<ScheduledSegment>,
    token: CancellationToken,
    timeout: Option<Duration>,
    max_retries: u32,
}

impl PlaylistPoller {
    pub fn new(
        url: Url,
        fetcher: Arc<dyn HttpFetch>,
        parser: MediaPlaylistParser,
        manifest: SharedManifest,
        queue: mpsc::Sender<ScheduledSegment>,
        token: CancellationToken,
    ) -> Self {
        Self {
            url,
            fetcher,
            parser,
            manifest,
            queue,
            token,
            timeout: Some(crate::config::DEFAULT_PLAYLIST_TIMEOUT),
            max_retries: 0,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Consecutive transient failures tolerated once a reload interval is known.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Polls until the playlist ends, a fetch fails for good, or the token is
    /// cancelled. The segment queue is closed when this returns.
    pub async fn run(mut self) -> Result<(), DumpError> {
        let result = self.poll().await;
        if let Err(e) = &result {
            error!(url = %self.url, error = %e, "Failed to fetch playlist");
        }
        self.parser.state_mut().live = false;
        result
    }

    async fn poll(&mut self) -> Result<(), DumpError> {
        let mut sleep = Duration::ZERO;
        let mut failures = 0u32;

        while self.parser.state().live {
            if self.token.is_cancelled() {
                break;
            }
            if !sleep.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break,
                    _ = tokio::time::sleep(sleep) => {}
                }
            }
            if self.token.is_cancelled() {
                break;
            }

            let before = Instant::now();
            match self.fetch_playlist().await {
                Ok(Delivery::Delivered) => failures = 0,
                Ok(Delivery::Closed) => {
                    debug!(url = %self.url, "Segment queue closed, stopping playlist reloads");
                    return Ok(());
                }
                Err(e) => {
                    let interval = self.parser.state().last_duration;
                    if e.is_fatal() || interval.is_zero() || failures >= self.max_retries {
                        return Err(e);
                    }
                    failures += 1;
                    warn!(
                        url = %self.url,
                        attempt = failures,
                        max = self.max_retries,
                        error = %e,
                        "Retrying playlist after transient error"
                    );
                }
            }

            sleep = self
                .parser
                .state()
                .last_duration
                .saturating_sub(before.elapsed());
        }

        if !self.parser.state().live {
            info!(url = %self.url, "Playlist ended");
        }
        Ok(())
    }

    async fn fetch_playlist(&mut self) -> Result<Delivery, DumpError> {
        let state = self.parser.state_mut();
        state.last_duration = state.target_duration / 2;

        let request = FetchRequest::new(self.url.clone()).with_timeout(self.timeout);
        let response = self
            .fetcher
            .get(request)
            .await?
            .require_status(reqwest::StatusCode::OK)?;
        let base_url = Arc::new(response.url.clone());
        let body = response.bytes().await?;
        let text = String::from_utf8_lossy(&body);
        if let Cow::Owned(_) = text {
            warn!(url = %base_url, "Playlist is not valid UTF-8, replacing invalid bytes");
        }

        let mut lines = text.lines().peekable();
        let mut preamble = Vec::new();
        let header = self.parser.parse_header(&mut lines, &mut preamble);
        if !preamble.is_empty() {
            self.manifest.lock().write_lines(&preamble)?;
        }
        if let Err(e) = header {
            error!(error = %e, "Failed to read playlist header");
            return Err(e);
        }

        let segments = self
            .parser
            .parse_segments(&mut lines)
            .inspect_err(|e| error!(error = %e, "Failed to read playlist segments"))?;

        for segment in segments {
            let scheduled = ScheduledSegment {
                base_url: Arc::clone(&base_url),
                segment,
            };
            if self.queue.send(scheduled).await.is_err() {
                return Ok(Delivery::Closed);
            }
        }

        Ok(Delivery::Delivered)
    }
}
