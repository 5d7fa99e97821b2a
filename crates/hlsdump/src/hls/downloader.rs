// HLS Segment Downloader: drains a rendition's segment queue, writes segment
// bodies to disk and records them in the output manifest.

use futures::StreamExt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::DumpError;
use crate::config::DumperConfig;
use crate::fetch::{BodyStream, FetchRequest, HttpFetch};
use crate::hls::manifest::SharedManifest;
use crate::hls::media::SegmentDescriptor;
use crate::hls::poller::ScheduledSegment;
use crate::hls::retry::{Backoff, RetryPolicy};

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Copies `body` to `file`. Body errors keep their kind; local write errors
/// are fatal.
async fn copy_body(file: &mut File, path: &Path, mut body: BodyStream) -> Result<u64, DumpError> {
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DumpError::io(path, e))?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(|e| DumpError::io(path, e))?;
    Ok(written)
}

/// The single output file of a rendition in single-file mode.
struct OutputSink {
    file: File,
    path: PathBuf,
    file_name: String,
    /// End of the last complete segment
    cursor: u64,
}

impl OutputSink {
    async fn create(path: PathBuf) -> Result<Self, DumpError> {
        let file = File::create(&path)
            .await
            .map_err(|e| DumpError::io(&path, e))?;
        Ok(Self {
            file,
            file_name: file_name(&path),
            path,
            cursor: 0,
        })
    }

    /// Appends `body`. On failure the file is cut back to the end of the
    /// previous segment, so a retry starts clean.
    async fn append(&mut self, body: BodyStream) -> Result<(u64, u64), DumpError> {
        let start = self.cursor;
        match copy_body(&mut self.file, &self.path, body).await {
            Ok(size) => {
                self.cursor += size;
                Ok((size, start))
            }
            Err(err) => {
                if let Err(rewind) = self.rewind(start).await {
                    error!(
                        path = %self.path.display(),
                        offset = start,
                        error = %rewind,
                        "Failed to seek back to previous segment end"
                    );
                    return Err(DumpError::io(&self.path, rewind));
                }
                Err(err)
            }
        }
    }

    async fn rewind(&mut self, offset: u64) -> std::io::Result<()> {
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.file.set_len(offset).await
    }
}

pub struct SegmentDownloader {
    name: String,
    fetcher: Arc<dyn HttpFetch>,
    config: Arc<DumperConfig>,
    manifest: SharedManifest,
    queue: mpsc::Receiver<ScheduledSegment>,
    token: CancellationToken,
    policy: RetryPolicy,
    sink: Option<OutputSink>,
}

impl SegmentDownloader {
    /// `name` is the rendition's output prefix.
    pub fn new(
        name: impl Into<String>,
        fetcher: Arc<dyn HttpFetch>,
        config: Arc<DumperConfig>,
        manifest: SharedManifest,
        queue: mpsc::Receiver<ScheduledSegment>,
        token: CancellationToken,
    ) -> Self {
        Self {
            name: name.into(),
            fetcher,
            config,
            manifest,
            queue,
            token,
            policy: RetryPolicy::default(),
            sink: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Downloads queued segments until the queue is closed and drained, the
    /// token is cancelled, or a segment fails fatally.
    pub async fn run(mut self) -> Result<(), DumpError> {
        if self.config.single_file {
            let path = PathBuf::from(format!("{}.ts", self.name));
            self.sink = Some(
                OutputSink::create(path)
                    .await
                    .inspect_err(|e| error!(error = %e, "Failed to create output file"))?,
            );
        }

        while let Some(scheduled) = self.queue.recv().await {
            if self.token.is_cancelled() {
                debug!("Stop requested, leaving remaining segments");
                return Ok(());
            }

            let segment = &scheduled.segment;
            if segment.is_skipped() {
                if let Err(e) = self.manifest.lock().write_skipped(segment) {
                    error!(sequence = segment.sequence, error = %e, "Failed to record skipped segment");
                }
                continue;
            }

            match self.process_segment(&scheduled).await {
                Ok(()) => {}
                Err(e) if !e.is_fatal() => {
                    debug!(sequence = segment.sequence, error = %e, "Segment abandoned");
                }
                Err(e) if e.is_client_error() && self.config.skip_client_errors => {
                    warn!(sequence = segment.sequence, error = %e, "Skipping rejected segment");
                    let mut manifest = self.manifest.lock();
                    let recorded = manifest
                        .write_skipped(segment)
                        .and_then(|_| manifest.write_comment(&format!("SKIP: {e}")));
                    if let Err(e) = recorded {
                        error!(sequence = segment.sequence, error = %e, "Failed to record skipped segment");
                    }
                }
                Err(e) => {
                    error!(
                        sequence = segment.sequence,
                        uri = %segment.uri,
                        error = %e,
                        "Failed to download segment"
                    );
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Downloads one segment, retrying transient failures with backoff.
    async fn process_segment(&mut self, scheduled: &ScheduledSegment) -> Result<(), DumpError> {
        let segment = &scheduled.segment;
        let url = scheduled.url()?;
        let policy = self.policy.clone();
        let mut backoff = Backoff::new(&policy);

        loop {
            match self.download(segment, &url).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(
                        sequence = segment.sequence,
                        attempt = backoff.attempts() + 1,
                        url = %url,
                        error = %e,
                        "Segment download failed, retrying"
                    );
                    backoff.wait(&self.token).await?;
                }
            }
        }
    }

    async fn download(&mut self, segment: &SegmentDescriptor, url: &Url) -> Result<(), DumpError> {
        debug!(sequence = segment.sequence, url = %url, "Downloading segment");

        let request = FetchRequest::new(url.clone())
            .with_range(segment.byte_range())
            .with_timeout(self.config.segment_timeout(segment.duration));
        let expected = request.expected_status();
        let response = self.fetcher.get(request).await?.require_status(expected)?;

        let (byte_range, file_name, size) = match self.sink.as_mut() {
            Some(sink) => {
                let (size, start) = sink.append(response.body).await?;
                (Some((size, start)), sink.file_name.clone(), size)
            }
            None => {
                let path = PathBuf::from(format!("{}-{}.ts", self.name, segment.sequence));
                let mut file = File::create(&path)
                    .await
                    .map_err(|e| DumpError::io(&path, e))?;
                let size = copy_body(&mut file, &path, response.body).await?;
                (None, file_name(&path), size)
            }
        };

        self.manifest
            .lock()
            .write_segment(segment, byte_range, &file_name)?;
        info!(sequence = segment.sequence, size, file = %file_name, "Segment saved");
        Ok(())
    }
}
