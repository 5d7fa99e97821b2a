use std::time::Duration;

use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::debug;

use crate::DumpError;

pub const DEFAULT_USER_AGENT: &str = concat!("hlsdump/", env!("CARGO_PKG_VERSION"));

/// Timeout for playlist requests when none is configured.
pub const DEFAULT_PLAYLIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Segment timeout multiplier when none is configured.
pub const DEFAULT_SEGMENT_TIMEOUT_MULTIPLIER: u32 = 5;

/// Options for one capture run.
#[derive(Debug, Clone)]
pub struct DumperConfig {
    /// Source manifest URL (master or media playlist)
    pub url: String,

    /// Output file prefix, without extension. May contain directories.
    pub name: String,

    /// Append every segment of a rendition to one file using EXT-X-BYTERANGE
    pub single_file: bool,

    /// Carried for callers; the engine never reads it. Log verbosity is
    /// decided by the installed tracing subscriber.
    pub verbose: bool,

    /// Extra headers sent with every manifest and segment request
    pub headers: HeaderMap,

    /// Rendition group IDs to download (empty = all)
    pub groups: Vec<String>,

    /// Segment titles to download (empty = all)
    pub titles: Vec<String>,

    /// Timeout for each playlist request. `None` uses [`DEFAULT_PLAYLIST_TIMEOUT`],
    /// zero disables it.
    pub playlist_timeout: Option<Duration>,

    /// Segment timeout, in multiples of the segment duration.
    /// `None` uses [`DEFAULT_SEGMENT_TIMEOUT_MULTIPLIER`].
    pub segment_timeout_multiplier: Option<u32>,

    /// Consecutive transient playlist failures tolerated once the reload
    /// interval is known.
    pub playlist_retries: u32,

    /// Record segments rejected with HTTP 4xx as skipped instead of stopping
    /// the rendition.
    pub skip_client_errors: bool,

    pub user_agent: String,
}

impl Default for DumperConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            name: String::new(),
            single_file: false,
            verbose: false,
            headers: HeaderMap::new(),
            groups: Vec::new(),
            titles: Vec::new(),
            playlist_timeout: None,
            segment_timeout_multiplier: None,
            playlist_retries: 0,
            skip_client_errors: false,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl DumperConfig {
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_single_file(mut self, single_file: bool) -> Self {
        self.single_file = single_file;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_titles(mut self, titles: Vec<String>) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_playlist_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.playlist_timeout = timeout;
        self
    }

    pub fn with_segment_timeout_multiplier(mut self, multiplier: Option<u32>) -> Self {
        self.segment_timeout_multiplier = multiplier;
        self
    }

    pub fn with_playlist_retries(mut self, retries: u32) -> Self {
        self.playlist_retries = retries;
        self
    }

    pub fn with_skip_client_errors(mut self, skip: bool) -> Self {
        self.skip_client_errors = skip;
        self
    }

    /// Request timeout for playlists. `None` when configured as zero.
    pub fn playlist_timeout(&self) -> Option<Duration> {
        match self.playlist_timeout {
            None => Some(DEFAULT_PLAYLIST_TIMEOUT),
            Some(timeout) if timeout.is_zero() => None,
            timeout => timeout,
        }
    }

    /// Request timeout for a segment of `duration_secs` seconds.
    /// `None` when the product is zero (no timeout).
    pub fn segment_timeout(&self, duration_secs: u64) -> Option<Duration> {
        let multiplier = self
            .segment_timeout_multiplier
            .unwrap_or(DEFAULT_SEGMENT_TIMEOUT_MULTIPLIER);
        let secs = duration_secs.saturating_mul(u64::from(multiplier));
        (secs > 0).then(|| Duration::from_secs(secs))
    }
}

/// Parses `Name: Value` strings into a header map.
///
/// Repeated names are kept as multiple values, in the order given.
pub fn parse_headers(headers: &[String]) -> Result<HeaderMap, DumpError> {
    let mut map = HeaderMap::new();

    for raw in headers {
        let (name, value) = raw.split_once(':').ok_or_else(|| DumpError::InvalidHeader {
            input: raw.clone(),
            reason: "expected `Name: Value`".to_string(),
        })?;

        let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|e| {
            DumpError::InvalidHeader {
                input: raw.clone(),
                reason: e.to_string(),
            }
        })?;
        let value =
            HeaderValue::from_str(value.trim()).map_err(|e| DumpError::InvalidHeader {
                input: raw.clone(),
                reason: e.to_string(),
            })?;

        debug!(header = %name, "Added custom header");
        map.append(name, value);
    }

    Ok(map)
}

/// Create the HTTP client shared by every playlist and segment request.
///
/// Custom headers are installed as default headers. Timeouts are applied per
/// request since they differ between playlists and segments.
pub fn create_client(config: &DumperConfig) -> Result<Client, DumpError> {
    Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(config.headers.clone())
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(DumpError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_headers_keeps_duplicates_in_order() {
        let headers = parse_headers(&[
            "Referer: http://example.com/".to_string(),
            "X-Token:abc".to_string(),
            "x-token: def".to_string(),
        ])
        .unwrap();

        assert_eq!(headers["referer"], "http://example.com/");
        let tokens: Vec<_> = headers.get_all("x-token").iter().collect();
        assert_eq!(tokens, vec!["abc", "def"]);
    }

    #[test]
    fn parse_headers_rejects_missing_colon() {
        let err = parse_headers(&["NoColonHere".to_string()]).unwrap_err();
        assert!(matches!(err, DumpError::InvalidHeader { .. }));
    }

    #[test]
    fn parse_headers_rejects_bad_name() {
        let err = parse_headers(&["Bad Name: value".to_string()]).unwrap_err();
        assert!(matches!(err, DumpError::InvalidHeader { .. }));
    }

    #[test]
    fn timeouts_fall_back_to_defaults() {
        let config = DumperConfig::new("http://h/index.m3u8", "out");
        assert_eq!(config.playlist_timeout(), Some(DEFAULT_PLAYLIST_TIMEOUT));
        assert_eq!(config.segment_timeout(4), Some(Duration::from_secs(20)));
        assert_eq!(config.segment_timeout(0), None);

        let config = config
            .with_playlist_timeout(Some(Duration::from_secs(1)))
            .with_segment_timeout_multiplier(Some(2));
        assert_eq!(config.playlist_timeout(), Some(Duration::from_secs(1)));
        assert_eq!(config.segment_timeout(3), Some(Duration::from_secs(6)));

        let config = config.with_playlist_timeout(Some(Duration::ZERO));
        assert_eq!(config.playlist_timeout(), None);
    }
}
