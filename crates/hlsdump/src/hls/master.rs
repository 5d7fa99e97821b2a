// HLS Master Playlist Resolver: picks the renditions to capture from the
// top-level playlist.

use tracing::{debug, info};
use url::Url;

use crate::DumpError;
use crate::hls::attributes::AttributeList;
use crate::hls::tags::{self, TagClassifier, is_comment, split_tag};

/// Group attributes of EXT-X-STREAM-INF matched against the group filter.
const GROUP_ATTRIBUTES: [&str; 4] = ["VIDEO", "AUDIO", "SUBTITLES", "CLOSED-CAPTIONS"];

/// One media playlist selected for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionJob {
    pub name: String,
    pub url: Url,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedPlaylist {
    pub jobs: Vec<RenditionJob>,
    /// EXT-X-MEDIA entries. Parsed for validation, not captured yet.
    pub alternates: Vec<AttributeList>,
}

pub struct MasterPlaylistResolver<'a> {
    tags: TagClassifier,
    groups: &'a [String],
    base_name: &'a str,
}

impl<'a> MasterPlaylistResolver<'a> {
    pub fn new(tags: TagClassifier, groups: &'a [String], base_name: &'a str) -> Self {
        Self {
            tags,
            groups,
            base_name,
        }
    }

    fn matches(&self, attributes: &AttributeList) -> bool {
        self.groups.is_empty()
            || GROUP_ATTRIBUTES.iter().any(|key| {
                attributes
                    .get(key)
                    .is_some_and(|group| self.groups.iter().any(|g| g == group))
            })
    }

    /// Resolves `body`, fetched from `url`, into rendition jobs.
    ///
    /// If `body` turns out to be a media playlist, the result is a single job
    /// for `url` itself, named after the base name. Renditions of a master
    /// playlist are named `<base>-<n>`, numbered from 1 in playlist order.
    pub fn resolve(&self, body: &str, url: &Url) -> Result<ResolvedPlaylist, DumpError> {
        let mut lines = body.lines().filter(|line| !line.is_empty());

        let first = lines.next().ok_or(DumpError::EmptyPlaylist)?;
        if first != tags::PLAYLIST_HEADER {
            return Err(DumpError::MissingHeader {
                line: first.to_string(),
            });
        }

        let mut resolved = ResolvedPlaylist::default();
        let mut matched_stream = false;

        for line in lines {
            if is_comment(line) {
                let Some((name, value)) = split_tag(line) else {
                    continue;
                };

                match name {
                    tags::EXT_X_MEDIA => {
                        let attributes = AttributeList::parse(value).ok_or_else(|| {
                            DumpError::invalid_tag(name, value, "invalid attribute list")
                        })?;
                        debug!(
                            group = attributes.get("GROUP-ID").unwrap_or_default(),
                            kind = attributes.get("TYPE").unwrap_or_default(),
                            "Found alternate rendition"
                        );
                        resolved.alternates.push(attributes);
                    }
                    tags::EXT_X_STREAM_INF => {
                        let attributes = AttributeList::parse(value).ok_or_else(|| {
                            DumpError::invalid_tag(name, value, "invalid attribute list")
                        })?;
                        if self.matches(&attributes) {
                            matched_stream = true;
                        }
                    }
                    _ if self.tags.is_media_playlist_tag(name) => {
                        if !resolved.jobs.is_empty() {
                            return Err(DumpError::MixedPlaylist);
                        }
                        debug!(tag = name, "Playlist is a media playlist");
                        resolved.jobs = vec![RenditionJob {
                            name: self.base_name.to_string(),
                            url: url.clone(),
                        }];
                        return Ok(resolved);
                    }
                    _ => {}
                }
                continue;
            }

            if matched_stream {
                matched_stream = false;
                let stream_url = url
                    .join(line)
                    .map_err(|e| DumpError::invalid_url(line, e))?;
                info!(url = %stream_url, "Downloading stream");
                resolved.jobs.push(RenditionJob {
                    name: format!("{}-{}", self.base_name, resolved.jobs.len() + 1),
                    url: stream_url,
                });
            }
        }

        Ok(resolved)
    }
}
