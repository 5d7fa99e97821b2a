// Static knowledge of which tags live in which section of a playlist.

pub const PLAYLIST_HEADER: &str = "#EXTM3U";
pub const TAG_PREFIX: &str = "#EXT";
pub const TAG_SEPARATOR: char = ':';

pub const EXT_X_VERSION: &str = "EXT-X-VERSION";
pub const EXT_X_TARGETDURATION: &str = "EXT-X-TARGETDURATION";
pub const EXT_X_MEDIA_SEQUENCE: &str = "EXT-X-MEDIA-SEQUENCE";
pub const EXT_X_PLAYLIST_TYPE: &str = "EXT-X-PLAYLIST-TYPE";
pub const EXTINF: &str = "EXTINF";
pub const EXT_X_BYTERANGE: &str = "EXT-X-BYTERANGE";
pub const EXT_X_GAP: &str = "EXT-X-GAP";
pub const EXT_X_ENDLIST: &str = "EXT-X-ENDLIST";
pub const EXT_X_MEDIA: &str = "EXT-X-MEDIA";
pub const EXT_X_STREAM_INF: &str = "EXT-X-STREAM-INF";

/// Tags that may only appear in a media playlist header.
pub static MEDIA_TAGS: &[&str] = &[
    EXT_X_TARGETDURATION,
    EXT_X_MEDIA_SEQUENCE,
    "EXT-X-DISCONTINUITY-SEQUENCE",
    EXT_X_PLAYLIST_TYPE,
    "EXT-X-I-FRAMES-ONLY",
];

/// Tags that belong to the segment section of a media playlist.
pub static SEGMENT_TAGS: &[&str] = &[
    EXTINF,
    EXT_X_BYTERANGE,
    "EXT-X-DISCONTINUITY",
    "EXT-X-KEY",
    "EXT-X-MAP",
    "EXT-X-PROGRAM-DATE-TIME",
    "EXT-X-DATERANGE",
    EXT_X_GAP,
    "EXT-X-BITRATE",
    // Not a segment tag, but it shows up after the segments
    EXT_X_ENDLIST,
];

/// The two tag vocabularies used to tell playlist sections apart.
#[derive(Debug, Clone, Copy)]
pub struct TagClassifier {
    media_tags: &'static [&'static str],
    segment_tags: &'static [&'static str],
}

impl Default for TagClassifier {
    fn default() -> Self {
        Self::new(MEDIA_TAGS, SEGMENT_TAGS)
    }
}

impl TagClassifier {
    pub fn new(
        media_tags: &'static [&'static str],
        segment_tags: &'static [&'static str],
    ) -> Self {
        Self {
            media_tags,
            segment_tags,
        }
    }

    pub fn is_media_tag(&self, name: &str) -> bool {
        self.media_tags.contains(&name)
    }

    pub fn is_segment_tag(&self, name: &str) -> bool {
        self.segment_tags.contains(&name)
    }

    /// Whether the tag only makes sense in a media playlist.
    pub fn is_media_playlist_tag(&self, name: &str) -> bool {
        self.is_media_tag(name) || self.is_segment_tag(name)
    }
}

/// Splits at the first `sep`. A separator at index 0 (or none) yields the
/// whole input and an empty value.
pub fn split_pair(s: &str, sep: char) -> (&str, &str) {
    match s.find(sep) {
        Some(i) if i > 0 => (&s[..i], &s[i + sep.len_utf8()..]),
        _ => (s, ""),
    }
}

/// Returns `(name, value)` for a `#EXT...` tag line, `None` for anything else.
pub fn split_tag(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(TAG_PREFIX) {
        Some(split_pair(&line[1..], TAG_SEPARATOR))
    } else {
        None
    }
}

/// Whether the line is a comment or tag rather than a URI.
pub fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_tag_separates_name_and_value() {
        assert_eq!(split_tag("#EXTINF:10.0,title"), Some(("EXTINF", "10.0,title")));
        assert_eq!(split_tag("#EXT-X-GAP"), Some(("EXT-X-GAP", "")));
        assert_eq!(split_tag("# plain comment"), None);
        assert_eq!(split_tag("segment.ts"), None);
    }

    #[test]
    fn split_pair_ignores_leading_separator() {
        assert_eq!(split_pair("100@200", '@'), ("100", "200"));
        assert_eq!(split_pair("@200", '@'), ("@200", ""));
        assert_eq!(split_pair("100", '@'), ("100", ""));
    }

    #[test]
    fn classifier_knows_both_vocabularies() {
        let tags = TagClassifier::default();
        assert!(tags.is_media_tag("EXT-X-TARGETDURATION"));
        assert!(!tags.is_segment_tag("EXT-X-TARGETDURATION"));
        assert!(tags.is_segment_tag("EXT-X-ENDLIST"));
        assert!(tags.is_media_playlist_tag("EXTINF"));
        assert!(!tags.is_media_playlist_tag("EXT-X-STREAM-INF"));
        assert!(!tags.is_media_playlist_tag("EXT-X-VERSION"));
    }
}
