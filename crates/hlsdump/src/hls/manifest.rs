// Append-only writer for the reconstructed per-rendition playlist.

use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::DumpError;
use crate::hls::media::SegmentDescriptor;
use crate::hls::tags::EXT_X_ENDLIST;

const SKIP_PREFIX: &str = "# SKIP: ";

/// Manifest writer shared by a rendition's poller (preamble) and downloader.
pub type SharedManifest = Arc<Mutex<ManifestWriter>>;

pub struct ManifestWriter {
    writer: BufWriter<Box<dyn Write + Send>>,
    label: String,
    /// Sequence of the last segment recorded, downloaded or skipped
    last_sequence: Option<u64>,
}

impl ManifestWriter {
    /// Creates (or truncates) the manifest file at `path`.
    pub fn create(path: &Path) -> Result<Self, DumpError> {
        let file = File::create(path).map_err(|e| DumpError::io(path, e))?;
        Ok(Self::from_writer(file, path.display().to_string()))
    }

    pub fn from_writer(writer: impl Write + Send + 'static, label: impl Into<String>) -> Self {
        Self {
            writer: BufWriter::new(Box::new(writer)),
            label: label.into(),
            last_sequence: None,
        }
    }

    pub fn into_shared(self) -> SharedManifest {
        Arc::new(Mutex::new(self))
    }

    fn io_error(&self, source: std::io::Error) -> DumpError {
        DumpError::Io {
            path: self.label.clone(),
            source,
        }
    }

    /// Writes `line` followed by a newline. Empty lines are dropped.
    pub fn write_line(&mut self, line: &str) -> Result<(), DumpError> {
        if line.is_empty() {
            return Ok(());
        }
        writeln!(self.writer, "{line}").map_err(|e| self.io_error(e))
    }

    /// Blocking std I/O: each call appends a few short lines under a lock
    /// held only for the write.
    pub fn write_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<(), DumpError> {
        for line in lines {
            self.write_line(line.as_ref())?;
        }
        self.flush()
    }

    pub fn flush(&mut self) -> Result<(), DumpError> {
        self.writer.flush().map_err(|e| self.io_error(e))
    }

    /// Records `sequence` and writes a warning comment if sequences were
    /// jumped since the previous record.
    fn check_missing(&mut self, sequence: u64) -> Result<(), DumpError> {
        if let Some(last) = self.last_sequence {
            let expected = last + 1;
            if expected != sequence {
                let last_missing = sequence.saturating_sub(1);
                warn!(
                    manifest = %self.label,
                    "Missing sequence {expected}-{last_missing}"
                );
                self.write_line(&format!(
                    "# WARNING: Missing sequence {expected}-{last_missing}"
                ))?;
            }
        }
        self.last_sequence = Some(sequence);
        Ok(())
    }

    /// Records a segment that was not downloaded as a commented-out block.
    ///
    /// Segments without any preceding lines leave no trace.
    pub fn write_skipped(&mut self, segment: &SegmentDescriptor) -> Result<(), DumpError> {
        if segment.comments.is_empty() {
            return Ok(());
        }

        self.check_missing(segment.sequence)?;
        for line in &segment.comments {
            self.write_line(&format!("{SKIP_PREFIX}{line}"))?;
        }
        self.flush()
    }

    /// Records a downloaded segment: its preceding lines, its sub-range in
    /// the output file when appending to one file, and the local file name.
    pub fn write_segment(
        &mut self,
        segment: &SegmentDescriptor,
        byte_range: Option<(u64, u64)>,
        file_name: &str,
    ) -> Result<(), DumpError> {
        self.check_missing(segment.sequence)?;
        for line in &segment.comments {
            self.write_line(line)?;
        }
        if let Some((size, start)) = byte_range {
            self.write_line(&format!("#EXT-X-BYTERANGE:{size}@{start}"))?;
        }
        self.write_line(file_name)?;
        self.flush()
    }

    pub fn write_comment(&mut self, comment: &str) -> Result<(), DumpError> {
        self.write_line(&format!("# {comment}"))?;
        self.flush()
    }

    /// Terminates the playlist so it can be played back as a finished stream.
    pub fn finish(&mut self) -> Result<(), DumpError> {
        self.write_line(&format!("#{EXT_X_ENDLIST}"))?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(sequence: u64, comments: &[&str]) -> SegmentDescriptor {
        SegmentDescriptor {
            sequence,
            duration: 4,
            uri: format!("s{sequence}.ts"),
            length: None,
            offset: None,
            comments: comments.iter().map(|c| c.to_string()).collect(),
            title: String::new(),
        }
    }

    fn written(dir: &tempfile::TempDir) -> String {
        std::fs::read_to_string(dir.path().join("out.m3u8")).unwrap()
    }

    #[test]
    fn segments_and_gaps_are_recorded_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ManifestWriter::create(&dir.path().join("out.m3u8")).unwrap();

        writer.write_lines(&["#EXTM3U", "", "#EXT-X-TARGETDURATION:4"]).unwrap();
        writer
            .write_segment(&segment(5, &["#EXTINF:4,"]), Some((100, 0)), "out.ts")
            .unwrap();
        writer
            .write_segment(&segment(8, &["#EXTINF:4,"]), Some((50, 100)), "out.ts")
            .unwrap();
        writer.finish().unwrap();

        assert_eq!(
            written(&dir),
            "#EXTM3U
#EXT-X-TARGETDURATION:4
#EXTINF:4,
#EXT-X-BYTERANGE:100@0
out.ts
# WARNING: Missing sequence 6-7
#EXTINF:4,
#EXT-X-BYTERANGE:50@100
out.ts
#EXT-X-ENDLIST
"
        );
    }

    #[test]
    fn skipped_segments_are_commented_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ManifestWriter::create(&dir.path().join("out.m3u8")).unwrap();

        writer
            .write_segment(&segment(0, &["#EXTINF:4,"]), None, "out-0.ts")
            .unwrap();
        writer
            .write_skipped(&segment(1, &["#EXT-X-GAP", "#EXTINF:4,"]))
            .unwrap();
        writer.write_skipped(&segment(2, &[])).unwrap();
        writer
            .write_segment(&segment(3, &["#EXTINF:4,"]), None, "out-3.ts")
            .unwrap();

        assert_eq!(
            written(&dir),
            "#EXTINF:4,
out-0.ts
# SKIP: #EXT-X-GAP
# SKIP: #EXTINF:4,
# WARNING: Missing sequence 2-2
#EXTINF:4,
out-3.ts
"
        );
    }
}
