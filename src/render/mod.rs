pub mod markdown;

use crate::record::ParsedRecord;
use std::path::PathBuf;
use thiserror::Error;

pub use markdown::MarkdownRenderer;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for parsed records.
pub trait Renderer {
    /// Append one record and return where it was written.
    fn append(&mut self, record: &ParsedRecord) -> Result<PathBuf, RenderError>;
}
