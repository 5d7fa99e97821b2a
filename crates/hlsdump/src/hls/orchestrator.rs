// HLS Orchestrator: resolves the source manifest into renditions and runs one
// poller/downloader pipeline per rendition.

use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};
use url::Url;

use crate::DumpError;
use crate::config::{DumperConfig, create_client};
use crate::fetch::{FetchRequest, HttpFetch, ReqwestFetcher};
use crate::hls::downloader::SegmentDownloader;
use crate::hls::manifest::ManifestWriter;
use crate::hls::master::{MasterPlaylistResolver, RenditionJob};
use crate::hls::media::MediaPlaylistParser;
use crate::hls::poller::{PlaylistPoller, SEGMENT_QUEUE_CAPACITY};
use crate::hls::tags::TagClassifier;

/// Requests a running [`Dumper`] to stop. Cheap to clone and safe to use from
/// any task or thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    /// Every rendition stops at its next checkpoint. In-flight requests are
    /// not aborted. Calling this more than once has no further effect.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("Stop requested");
            self.token.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Everything a rendition pipeline needs, detached from the [`Dumper`] so it
/// can run on its own task.
#[derive(Clone)]
struct PipelineContext {
    config: Arc<DumperConfig>,
    fetcher: Arc<dyn HttpFetch>,
    tags: TagClassifier,
    token: CancellationToken,
}

pub struct Dumper {
    context: PipelineContext,
}

impl Dumper {
    /// Creates a dumper fetching over a reqwest client built from `config`.
    pub fn new(config: DumperConfig) -> Result<Self, DumpError> {
        let client = create_client(&config)?;
        Ok(Self::with_fetcher(config, Arc::new(ReqwestFetcher::new(client))))
    }

    pub fn with_fetcher(config: DumperConfig, fetcher: Arc<dyn HttpFetch>) -> Self {
        Self {
            context: PipelineContext {
                config: Arc::new(config),
                fetcher,
                tags: TagClassifier::default(),
                token: CancellationToken::new(),
            },
        }
    }

    pub fn config(&self) -> &DumperConfig {
        &self.context.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.context.token.clone(),
        }
    }

    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Captures every selected rendition of the configured URL until each
    /// one ends, fails, or a stop is requested.
    pub async fn start(&self) -> Result<(), DumpError> {
        let jobs = self
            .load_master()
            .await
            .inspect_err(|e| error!(url = %self.context.config.url, error = %e, "Failed to load playlist"))?;
        self.run(jobs).await
    }

    /// Fetches the source manifest, saves it verbatim and resolves it.
    async fn load_master(&self) -> Result<Vec<RenditionJob>, DumpError> {
        let config = &self.context.config;
        let url = Url::parse(&config.url).map_err(|e| DumpError::invalid_url(&config.url, e))?;

        let request = FetchRequest::new(url).with_timeout(config.playlist_timeout());
        let response = self
            .context
            .fetcher
            .get(request)
            .await?
            .require_status(reqwest::StatusCode::OK)?;
        let served = response.url.clone();
        let body = response.bytes().await?;

        let path = PathBuf::from(format!("{}.m3u8", config.name));
        tokio::fs::write(&path, &body)
            .await
            .map_err(|e| DumpError::io(&path, e))?;

        let text = String::from_utf8_lossy(&body);
        if let Cow::Owned(_) = text {
            warn!(url = %served, "Playlist is not valid UTF-8, replacing invalid bytes");
        }
        let resolved = MasterPlaylistResolver::new(self.context.tags, &config.groups, &config.name)
            .resolve(&text, &served)?;
        Ok(resolved.jobs)
    }

    /// Runs one pipeline per job and returns the first error observed.
    pub async fn run(&self, mut jobs: Vec<RenditionJob>) -> Result<(), DumpError> {
        match jobs.len() {
            0 => {
                error!("No streams found");
                Err(DumpError::NoStreamsFound)
            }
            1 => {
                let job = jobs.remove(0);
                dump_rendition(job, self.context.clone()).await
            }
            count => {
                info!(count, "Downloading renditions concurrently");
                let mut tasks = JoinSet::new();
                for job in jobs {
                    tasks.spawn(dump_rendition(job, self.context.clone()));
                }

                let mut first_error = None;
                while let Some(joined) = tasks.join_next().await {
                    let result = joined.map_err(DumpError::from).and_then(|r| r);
                    if let Err(e) = result {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }
}

/// Captures one rendition: a poller task feeding a downloader on the caller.
async fn dump_rendition(job: RenditionJob, context: PipelineContext) -> Result<(), DumpError> {
    let span = info_span!("rendition", name = %job.name);
    async move {
        let config = context.config;
        let token = context.token.child_token();

        let manifest_path = PathBuf::from(format!("{}.m3u8", job.name));
        let manifest = ManifestWriter::create(&manifest_path)
            .inspect_err(|e| error!(error = %e, "Failed to create playlist file"))?
            .into_shared();

        let (tx, rx) = mpsc::channel(SEGMENT_QUEUE_CAPACITY);
        let parser = MediaPlaylistParser::new(context.tags, config.single_file, config.titles.clone());
        let poller = PlaylistPoller::new(
            job.url.clone(),
            context.fetcher.clone(),
            parser,
            manifest.clone(),
            tx,
            token.clone(),
        )
        .with_timeout(config.playlist_timeout())
        .with_max_retries(config.playlist_retries);
        let poller = tokio::spawn(poller.run().in_current_span());

        info!(url = %job.url, "Downloading rendition");
        let mut result = SegmentDownloader::new(
            job.name.clone(),
            context.fetcher,
            config.clone(),
            manifest.clone(),
            rx,
            token.clone(),
        )
        .run()
        .await;

        if result.is_err() {
            token.cancel();
        }
        let polled = poller.await.map_err(DumpError::from).and_then(|r| r);

        if let Err(e) = manifest.lock().finish() {
            error!(error = %e, "Failed to terminate playlist");
            if result.is_ok() {
                result = Err(e);
            }
        }

        result.and(polled)?;
        info!("Rendition finished");
        Ok(())
    }
    .instrument(span)
    .await
}
