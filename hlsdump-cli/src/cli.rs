use clap::Parser;
use hlsdump_engine::{DumperConfig, parse_headers};
use std::time::Duration;
use url::Url;

use crate::error::{AppError, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// URL of the master or media playlist
    pub url: String,

    /// Output file prefix [default: playlist file name without .m3u8]
    #[arg(short, long)]
    pub name: Option<String>,

    /// Append all segments of a rendition to a single .ts file
    #[arg(short, long)]
    pub single_file: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Extra HTTP header (`Name: Value`), may be repeated
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    pub headers: Vec<String>,

    /// Only download renditions of this group ID, may be repeated
    #[arg(short, long = "group", value_name = "GROUP")]
    pub groups: Vec<String>,

    /// Only download segments with this EXTINF title, may be repeated
    #[arg(short, long = "title", value_name = "TITLE")]
    pub titles: Vec<String>,

    /// Timeout for playlist requests, in seconds (negative = default 5s, 0 = none)
    #[arg(long, value_name = "SECONDS", default_value_t = -1.0, allow_negative_numbers = true)]
    pub playlist_timeout: f64,

    /// Segment timeout as a multiple of the segment duration (negative = default 5, 0 = none)
    #[arg(long, value_name = "MULTIPLIER", default_value_t = -1, allow_negative_numbers = true)]
    pub segment_timeout: i64,

    /// Consecutive playlist reload failures to tolerate on a live stream
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub playlist_retries: u32,

    /// Record segments rejected with HTTP 4xx as skipped and keep going
    #[arg(long)]
    pub skip_client_errors: bool,
}

/// Output prefix derived from the playlist URL: its last path segment
/// without the `.m3u8` extension.
pub fn default_name(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| AppError::InvalidInput(format!("{url}: {e}")))?;
    let file = parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let name = file.strip_suffix(".m3u8").unwrap_or(file);

    if name.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "cannot derive an output name from {url}, use --name"
        )));
    }
    Ok(name.to_string())
}

impl Args {
    pub fn into_config(self) -> Result<DumperConfig> {
        let name = match self.name {
            Some(name) => name,
            None => default_name(&self.url)?,
        };

        let playlist_timeout = if self.playlist_timeout < 0.0 {
            None
        } else {
            Some(
                Duration::try_from_secs_f64(self.playlist_timeout)
                    .map_err(|e| AppError::InvalidInput(format!("--playlist-timeout: {e}")))?,
            )
        };
        let segment_timeout = if self.segment_timeout < 0 {
            None
        } else {
            Some(u32::try_from(self.segment_timeout).map_err(|e| {
                AppError::InvalidInput(format!("--segment-timeout: {e}"))
            })?)
        };

        let mut config = DumperConfig::new(self.url, name)
            .with_single_file(self.single_file)
            .with_headers(parse_headers(&self.headers)?)
            .with_groups(self.groups)
            .with_titles(self.titles)
            .with_playlist_timeout(playlist_timeout)
            .with_segment_timeout_multiplier(segment_timeout)
            .with_playlist_retries(self.playlist_retries)
            .with_skip_client_errors(self.skip_client_errors);
        config.verbose = self.verbose;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("hlsdump").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn default_name_strips_the_playlist_extension() {
        assert_eq!(
            default_name("https://example.com/live/stream.m3u8?token=1").unwrap(),
            "stream"
        );
        assert_eq!(default_name("https://example.com/live/chunks").unwrap(), "chunks");
        assert!(default_name("https://example.com/").is_err());
        assert!(default_name("not a url").is_err());
    }

    #[test]
    fn defaults_map_to_engine_defaults() {
        let config = parse(&["https://example.com/index.m3u8"]).into_config().unwrap();
        assert_eq!(config.name, "index");
        assert!(!config.single_file);
        assert_eq!(config.playlist_timeout, None);
        assert_eq!(config.segment_timeout_multiplier, None);
        assert_eq!(config.playlist_retries, 0);
        assert!(config.headers.is_empty());
    }

    #[test]
    fn flags_are_carried_into_the_config() {
        let config = parse(&[
            "https://example.com/index.m3u8",
            "--name",
            "rec/show",
            "--single-file",
            "-H",
            "Referer: https://example.com/",
            "--header",
            "Cookie: a=1",
            "--group",
            "hd",
            "--title",
            "main",
            "--playlist-timeout",
            "2.5",
            "--segment-timeout",
            "0",
            "--playlist-retries",
            "3",
            "--skip-client-errors",
            "-v",
        ])
        .into_config()
        .unwrap();

        assert_eq!(config.name, "rec/show");
        assert!(config.single_file);
        assert!(config.verbose);
        assert_eq!(config.headers.len(), 2);
        assert_eq!(config.groups, vec!["hd"]);
        assert_eq!(config.titles, vec!["main"]);
        assert_eq!(config.playlist_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(config.segment_timeout_multiplier, Some(0));
        assert_eq!(config.playlist_retries, 3);
        assert!(config.skip_client_errors);
    }

    #[test]
    fn negative_timeouts_select_defaults() {
        let config = parse(&[
            "https://example.com/index.m3u8",
            "--playlist-timeout",
            "-1",
            "--segment-timeout",
            "-3",
        ])
        .into_config()
        .unwrap();
        assert_eq!(config.playlist_timeout, None);
        assert_eq!(config.segment_timeout_multiplier, None);
    }

    #[test]
    fn malformed_header_is_rejected() {
        let err = parse(&["https://example.com/index.m3u8", "-H", "oops"])
            .into_config()
            .unwrap_err();
        assert!(matches!(err, AppError::Dump(_)));
    }
}
