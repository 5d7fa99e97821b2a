// HLS capture pipeline: manifest parsing, playlist polling, segment download

pub mod attributes;
mod downloader;
mod manifest;
pub mod master;
pub mod media;
mod orchestrator;
mod poller;
pub mod retry;
pub mod tags;

pub use attributes::AttributeList;
pub use downloader::SegmentDownloader;
pub use manifest::{ManifestWriter, SharedManifest};
pub use master::{MasterPlaylistResolver, RenditionJob, ResolvedPlaylist};
pub use media::{MediaPlaylistParser, PlaylistState, SegmentDescriptor};
pub use orchestrator::{Dumper, StopHandle};
pub use poller::{PlaylistPoller, SEGMENT_QUEUE_CAPACITY, ScheduledSegment};
pub use retry::{Backoff, RetryPolicy};
pub use tags::TagClassifier;
