//! HLS capture engine
//!
//! Records live or on-demand HLS streams to disk. A source URL is resolved
//! into one or more renditions; each rendition runs a playlist poller that
//! discovers new segments and a downloader that saves them, next to a
//! reconstructed playlist that references the local copies.
//!
//! ## Component Overview
//!
//! - `config`: capture options, header parsing and HTTP client construction
//! - `error`: the fatal/transient error taxonomy
//! - `fetch`: the HTTP seam used for every playlist and segment request
//! - `hls`: manifest parsing and the per-rendition capture pipeline
//!
//! ```no_run
//! use hlsdump_engine::{Dumper, DumperConfig};
//!
//! # async fn capture() -> Result<(), hlsdump_engine::DumpError> {
//! let dumper = Dumper::new(DumperConfig::new("https://example.com/live.m3u8", "live"))?;
//! let stop = dumper.stop_handle();
//! tokio::spawn(async move {
//!     tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
//!     stop.stop();
//! });
//! dumper.start().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fetch;
pub mod hls;

#[cfg(test)]
mod test_utils;

pub use config::{DumperConfig, create_client, parse_headers};
pub use error::{DumpError, ErrorKind};
pub use fetch::{HttpFetch, ReqwestFetcher};
pub use hls::{Dumper, StopHandle};
