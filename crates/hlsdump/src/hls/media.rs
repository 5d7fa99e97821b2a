// HLS Media Playlist Parser: turns one fetch of a media playlist into header
// state updates and the list of segments not seen on earlier fetches.

use std::iter::Peekable;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::DumpError;
use crate::fetch::ByteRange;
use crate::hls::tags::{self, TagClassifier, is_comment, split_pair, split_tag};

/// One media segment discovered in a playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentDescriptor {
    pub sequence: u64,
    /// Whole seconds from EXTINF, fraction discarded
    pub duration: u64,
    pub uri: String,
    /// `Some(0)` means "record, but do not fetch"
    pub length: Option<u64>,
    pub offset: Option<u64>,
    /// Comment and tag lines that preceded the URI, echoed to the output
    pub comments: Vec<String>,
    pub title: String,
}

impl SegmentDescriptor {
    pub fn is_skipped(&self) -> bool {
        self.length == Some(0)
    }

    /// Range to request, when both length and offset are known.
    pub fn byte_range(&self) -> Option<ByteRange> {
        match (self.length, self.offset) {
            (Some(length), Some(offset)) if length > 0 => Some(ByteRange { offset, length }),
            _ => None,
        }
    }
}

/// Reload state of one rendition, carried across fetches.
#[derive(Debug, Clone)]
pub struct PlaylistState {
    /// Last seen EXT-X-VERSION, 0 before the first fetch
    pub version: u32,
    pub media_sequence: u64,
    pub target_duration: Duration,
    /// Reload interval: newest segment duration, or half the target duration
    pub last_duration: Duration,
    pub live: bool,
    /// Sequence number of the newest segment handed out
    pub last_enqueued: Option<u64>,
    preamble_captured: bool,
}

impl Default for PlaylistState {
    fn default() -> Self {
        Self {
            version: 0,
            media_sequence: 0,
            target_duration: Duration::ZERO,
            last_duration: Duration::ZERO,
            live: true,
            last_enqueued: None,
            preamble_captured: false,
        }
    }
}

pub struct MediaPlaylistParser {
    tags: TagClassifier,
    single_file: bool,
    titles: Vec<String>,
    state: PlaylistState,
}

fn parse_number<T>(tag: &str, value: &str, digits: &str) -> Result<T, DumpError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    digits
        .parse::<T>()
        .map_err(|e| DumpError::invalid_tag(tag, value, e))
}

impl MediaPlaylistParser {
    pub fn new(tags: TagClassifier, single_file: bool, titles: Vec<String>) -> Self {
        Self {
            tags,
            single_file,
            titles,
            state: PlaylistState::default(),
        }
    }

    pub fn state(&self) -> &PlaylistState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut PlaylistState {
        &mut self.state
    }

    /// Consumes header lines up to the first URI or segment tag.
    ///
    /// On the first call for a rendition every consumed line is pushed to
    /// `preamble`, so the caller can echo it to the output manifest even if
    /// this returns an error part-way through.
    pub fn parse_header<'a, I>(
        &mut self,
        lines: &mut Peekable<I>,
        preamble: &mut Vec<String>,
    ) -> Result<(), DumpError>
    where
        I: Iterator<Item = &'a str>,
    {
        let first = lines
            .by_ref()
            .find(|line| !line.is_empty())
            .ok_or(DumpError::EmptyPlaylist)?;
        if first != tags::PLAYLIST_HEADER {
            return Err(DumpError::MissingHeader {
                line: first.to_string(),
            });
        }

        let initial = !self.state.preamble_captured;
        if initial {
            self.state.preamble_captured = true;
            preamble.push(first.to_string());
        }

        let mut version = 1u32;
        let mut sequence = 0u64;
        let mut target_duration = Duration::ZERO;

        while let Some(&line) = lines.peek() {
            if line.is_empty() {
                lines.next();
                continue;
            }
            if !is_comment(line) {
                break;
            }

            let mut echo = line;
            if let Some((name, value)) = split_tag(line) {
                match name {
                    tags::EXT_X_VERSION => {
                        version = parse_number(name, value, value)?;
                        if self.single_file && version < 4 {
                            // Byte ranges need version 4
                            echo = "#EXT-X-VERSION:4";
                        }
                    }
                    tags::EXT_X_TARGETDURATION => {
                        let secs: u64 = parse_number(name, value, value)?;
                        target_duration = Duration::from_secs(secs);
                    }
                    tags::EXT_X_MEDIA_SEQUENCE => {
                        sequence = parse_number(name, value, value)?;
                    }
                    tags::EXT_X_PLAYLIST_TYPE => {
                        if !initial && value == "VOD" {
                            self.state.live = false;
                        }
                    }
                    _ if self.tags.is_segment_tag(name) => break,
                    _ => {}
                }
            }

            lines.next();
            if initial {
                preamble.push(echo.to_string());
            }
        }

        if self.state.version != version {
            if self.state.version > 0 {
                warn!(
                    from = self.state.version,
                    to = version,
                    "EXT-X-VERSION changed"
                );
            }
            self.state.version = version;
        }

        if self.state.target_duration.is_zero() {
            if target_duration.is_zero() {
                return Err(DumpError::MissingTargetDuration);
            }
            self.state.target_duration = target_duration;
        } else if self.state.target_duration != target_duration {
            warn!(
                from = ?self.state.target_duration,
                to = ?target_duration,
                "EXT-X-TARGETDURATION changed"
            );
            if !target_duration.is_zero() {
                self.state.target_duration = target_duration;
            }
        }

        if sequence < self.state.media_sequence {
            return Err(DumpError::SequenceDecreased {
                previous: self.state.media_sequence,
                current: sequence,
            });
        }
        self.state.media_sequence = sequence;

        Ok(())
    }

    /// Consumes the segment section and returns the segments newer than the
    /// last one handed out for this rendition, in playlist order.
    pub fn parse_segments<'a, I>(
        &mut self,
        lines: &mut Peekable<I>,
    ) -> Result<Vec<SegmentDescriptor>, DumpError>
    where
        I: Iterator<Item = &'a str>,
    {
        let mut segments = Vec::new();
        let mut sequence = self.state.media_sequence;

        // Running offset of the next sub-range, known once a fetch states one.
        let mut offset: Option<u64> = None;
        let mut length: Option<u64> = None;
        // End of the current sub-range, checked against overflow
        let mut end: Option<u64> = None;
        let mut duration = 0u64;
        let mut title = String::new();
        let mut comments = Vec::new();

        for line in lines {
            if line.is_empty() {
                continue;
            }

            if is_comment(line) {
                let mut keep = true;
                if let Some((name, value)) = split_tag(line) {
                    match name {
                        tags::EXTINF => {
                            let (secs, label) = split_pair(value, ',');
                            let (whole, _) = split_pair(secs, '.');
                            // -1 is used by live radio playlists for "unknown"
                            let signed: i64 = parse_number(name, value, whole)?;
                            duration = u64::try_from(signed).unwrap_or(0);
                            title = label.to_string();
                        }
                        tags::EXT_X_BYTERANGE => {
                            let (len, off) = split_pair(value, '@');
                            let len: u64 = parse_number(name, value, len)?;
                            if len == 0 {
                                warn!(line, "Empty segment (length 0)?");
                            }
                            if !off.is_empty() {
                                offset = Some(parse_number(name, value, off)?);
                            }
                            let Some(start) = offset else {
                                return Err(DumpError::invalid_tag(
                                    name,
                                    value,
                                    DumpError::OffsetFirstSegment,
                                ));
                            };
                            end = Some(start.checked_add(len).ok_or_else(|| {
                                DumpError::invalid_tag(name, value, "range end overflows")
                            })?);
                            length = Some(len);
                            // Recomputed from the bytes actually written
                            keep = false;
                        }
                        tags::EXT_X_GAP => length = Some(0),
                        tags::EXT_X_ENDLIST => self.state.live = false,
                        _ => {}
                    }
                }
                if keep {
                    comments.push(line.to_string());
                }
                continue;
            }

            if self.state.last_enqueued.is_none_or(|last| sequence > last) {
                let mut segment_length = length;
                if !self.titles.is_empty() && !self.titles.contains(&title) {
                    info!(sequence, title = %title, "Skipping segment with title");
                    segment_length = Some(0);
                }

                segments.push(SegmentDescriptor {
                    sequence,
                    duration,
                    uri: line.to_string(),
                    length: segment_length,
                    offset,
                    comments: std::mem::take(&mut comments),
                    title: std::mem::take(&mut title),
                });

                self.state.last_enqueued = Some(sequence);
                if duration > 0 {
                    self.state.last_duration = Duration::from_secs(duration);
                }
            }

            if length.is_some_and(|len| len > 0) {
                offset = end;
            }
            length = None;
            end = None;
            duration = 0;
            title.clear();
            comments.clear();
            sequence += 1;
        }

        debug!(count = segments.len(), "Found new segments");
        Ok(segments)
    }
}
