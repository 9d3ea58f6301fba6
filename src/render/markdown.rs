use super::{RenderError, Renderer};
use crate::record::ParsedRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Appends records to one markdown file per day, named `YYYY-MM-DD.md`.
///
/// The day comes from the record's own timestamp, so a message written just
/// before midnight lands in that day's file even if it is processed later.
#[derive(Debug, Clone)]
pub struct MarkdownRenderer {
    dir: PathBuf,
}

impl MarkdownRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, record: &ParsedRecord) -> PathBuf {
        self.dir
            .join(format!("{}.md", record.timestamp.format("%Y-%m-%d")))
    }
}

pub fn format_entry(record: &ParsedRecord) -> String {
    format!(
        "## {} - [{}]\n{}\n\n",
        record.timestamp.format("%H:%M"),
        record.role_label,
        record.content
    )
}

/// True when the file has content that does not end in a newline.
fn needs_separator(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl Renderer for MarkdownRenderer {
    fn append(&mut self, record: &ParsedRecord) -> Result<PathBuf, RenderError> {
        let target = self.path_for(record);
        let io_err = |source: io::Error| RenderError::Io {
            path: target.clone(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(|source| RenderError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&target)
            .map_err(io_err)?;

        let mut entry = String::new();
        if needs_separator(&mut file).map_err(io_err)? {
            entry.push('\n');
        }
        entry.push_str(&format_entry(record));

        // One write per entry so an entry is never split by another appender
        file.write_all(entry.as_bytes()).map_err(io_err)?;

        info!(
            file = %target.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
            role = %record.role_label,
            time = %record.timestamp.format("%H:%M"),
            "Logged entry"
        );

        Ok(target)
    }
}
