use reqwest::StatusCode;

/// How a failure affects the rendition that hit it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Forward progress is impossible. `client` is set when the failure was
    /// detected through an HTTP 4xx status.
    Fatal { client: bool },
    /// Worth retrying (network errors, 5xx, 429, interrupted transfers).
    Transient,
}

#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("download cancelled")]
    Cancelled,

    #[error("playlist file does not start with #EXTM3U: {line}")]
    MissingHeader { line: String },

    #[error("playlist ended before #EXTM3U")]
    EmptyPlaylist,

    #[error("invalid {tag} tag with value '{value}': {reason}")]
    InvalidTag {
        tag: String,
        value: String,
        reason: String,
    },

    #[error("mixed master/media playlist")]
    MixedPlaylist,

    #[error("playlist is missing EXT-X-TARGETDURATION")]
    MissingTargetDuration,

    #[error("media sequence number decreased from {previous} to {current}")]
    SequenceDecreased { previous: u64, current: u64 },

    #[error("byte range offset must be given for the first sub-range")]
    OffsetFirstSegment,

    #[error("no streams found")]
    NoStreamsFound,

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("invalid HTTP header `{input}`: {reason}")]
    InvalidHeader { input: String, reason: String },

    #[error("server returned HTTP status code {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("transfer interrupted for {url}: {reason}")]
    Transfer { url: String, reason: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("rendition task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DumpError {
    pub fn invalid_tag(
        tag: impl Into<String>,
        value: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::InvalidTag {
            tag: tag.into(),
            value: value.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.to_string(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::HttpStatus { status, .. } => {
                if status.is_client_error() && *status != StatusCode::TOO_MANY_REQUESTS {
                    ErrorKind::Fatal { client: true }
                } else {
                    ErrorKind::Transient
                }
            }
            Self::Cancelled | Self::Network { .. } | Self::Transfer { .. } => ErrorKind::Transient,
            Self::MissingHeader { .. }
            | Self::EmptyPlaylist
            | Self::InvalidTag { .. }
            | Self::MixedPlaylist
            | Self::MissingTargetDuration
            | Self::SequenceDecreased { .. }
            | Self::OffsetFirstSegment
            | Self::NoStreamsFound
            | Self::InvalidUrl { .. }
            | Self::InvalidHeader { .. }
            | Self::Io { .. }
            | Self::Configuration { .. }
            | Self::Join(_) => ErrorKind::Fatal { client: false },
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Fatal { .. })
    }

    /// Fatal because the server answered with a 4xx status.
    pub fn is_client_error(&self) -> bool {
        self.kind() == ErrorKind::Fatal { client: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_statuses_are_fatal_except_429() {
        let not_found = DumpError::http_status(StatusCode::NOT_FOUND, "http://h/a.ts");
        assert_eq!(not_found.kind(), ErrorKind::Fatal { client: true });
        assert!(not_found.is_client_error());

        let throttled = DumpError::http_status(StatusCode::TOO_MANY_REQUESTS, "http://h/a.ts");
        assert_eq!(throttled.kind(), ErrorKind::Transient);
    }

    #[test]
    fn server_statuses_are_transient() {
        let err = DumpError::http_status(StatusCode::BAD_GATEWAY, "http://h/a.ts");
        assert!(!err.is_fatal());
    }

    #[test]
    fn protocol_errors_are_fatal_but_not_client() {
        let err = DumpError::SequenceDecreased {
            previous: 10,
            current: 9,
        };
        assert_eq!(err.kind(), ErrorKind::Fatal { client: false });
        assert!(!err.is_client_error());
        assert!(DumpError::MissingTargetDuration.is_fatal());
        assert!(!DumpError::Cancelled.is_fatal());
    }

    #[test]
    fn invalid_tag_message_embeds_tag_and_value() {
        let err = DumpError::invalid_tag("EXT-X-VERSION", "x", "invalid digit found in string");
        assert_eq!(
            err.to_string(),
            "invalid EXT-X-VERSION tag with value 'x': invalid digit found in string"
        );
    }
}
