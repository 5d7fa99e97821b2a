use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static ATTRIBUTE_LIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Z0-9-]+)=([^",]+|"[^"]*")(?:,|$)"#).expect("attribute list pattern")
});

/// Parsed `KEY=value` pairs of a tag such as `EXT-X-STREAM-INF`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeList {
    attributes: HashMap<String, String>,
}

impl AttributeList {
    /// Parses a comma separated attribute list. Quoted values are unquoted.
    ///
    /// Returns `None` when no attribute can be recognized at all.
    pub fn parse(value: &str) -> Option<Self> {
        let attributes: HashMap<String, String> = ATTRIBUTE_LIST
            .captures_iter(value)
            .map(|caps| {
                let raw = &caps[2];
                let unquoted = raw
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(raw);
                (caps[1].to_string(), unquoted.to_string())
            })
            .collect();

        if attributes.is_empty() {
            None
        } else {
            Some(Self { attributes })
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_and_unquoted_values() {
        let attrs = AttributeList::parse(
            r#"BANDWIDTH=1280000,CODECS="avc1.4d401f,mp4a.40.2",AUDIO="aac",RESOLUTION=1280x720"#,
        )
        .unwrap();

        assert_eq!(attrs.len(), 4);
        assert_eq!(attrs.get("BANDWIDTH"), Some("1280000"));
        assert_eq!(attrs.get("CODECS"), Some("avc1.4d401f,mp4a.40.2"));
        assert_eq!(attrs.get("AUDIO"), Some("aac"));
        assert_eq!(attrs.get("RESOLUTION"), Some("1280x720"));
        assert_eq!(attrs.get("VIDEO"), None);
    }

    #[test]
    fn empty_quoted_value_is_kept() {
        let attrs = AttributeList::parse(r#"NAME="",DEFAULT=YES"#).unwrap();
        assert_eq!(attrs.get("NAME"), Some(""));
        assert_eq!(attrs.get("DEFAULT"), Some("YES"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(AttributeList::parse("not an attribute list"), None);
        assert_eq!(AttributeList::parse(""), None);
    }
}
