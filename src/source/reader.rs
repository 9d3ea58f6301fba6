use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

const UTF8_BOM: &str = "\u{feff}";

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// One complete, non-blank line and the byte offset just past its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailLine {
    pub text: String,
    pub end_offset: u64,
}

/// Everything that was appended since `start_offset`, cut at the last newline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailBatch {
    pub start_offset: u64,
    /// Byte position right after the last complete line, blank ones included
    pub end_offset: u64,
    pub lines: Vec<TailLine>,
    pub blank_lines: usize,
    /// Bytes of an unterminated trailing line left for a later read
    pub pending_bytes: u64,
}

impl TailBatch {
    pub fn consumed_bytes(&self) -> u64 {
        self.end_offset - self.start_offset
    }

    pub fn is_empty(&self) -> bool {
        self.end_offset == self.start_offset
    }
}

/// Reads newly appended complete lines from a transcript.
///
/// Offsets are counted from the raw bytes of each line, terminator included,
/// so they stay exact whatever the text encoding of the content.
#[derive(Debug, Default)]
pub struct TailReader {
    buf: Vec<u8>,
}

impl TailReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read complete lines from `from_offset` to the current end of file.
    ///
    /// Returns `Ok(None)` if the file no longer exists. An unterminated last
    /// line is not consumed: `end_offset` stops right before it so the next
    /// read picks it up once it is complete.
    pub fn read_new(&mut self, path: &Path, from_offset: u64) -> Result<Option<TailBatch>, ReaderError> {
        let io_err = |source: io::Error| ReaderError::Io {
            path: path.display().to_string(),
            source,
        };

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(e)),
        };

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(from_offset)).map_err(io_err)?;

        let mut batch = TailBatch {
            start_offset: from_offset,
            end_offset: from_offset,
            lines: Vec::new(),
            blank_lines: 0,
            pending_bytes: 0,
        };

        loop {
            self.buf.clear();
            let bytes_read = reader.read_until(b'\n', &mut self.buf).map_err(io_err)?;
            if bytes_read == 0 {
                break;
            }

            if self.buf.last() != Some(&b'\n') {
                // Writer is mid-line; leave it for a later read
                batch.pending_bytes = bytes_read as u64;
                break;
            }

            let line_start = batch.end_offset;
            batch.end_offset += bytes_read as u64;

            let text = String::from_utf8_lossy(&self.buf);
            let mut text = text.trim();
            if line_start == 0 {
                text = text.trim_start_matches(UTF8_BOM).trim_start();
            }

            if text.is_empty() {
                batch.blank_lines += 1;
                continue;
            }

            batch.lines.push(TailLine {
                text: text.to_string(),
                end_offset: batch.end_offset,
            });
        }

        Ok(Some(batch))
    }
}
