//! Document reading: turns PDF bytes into text for the extraction pipeline.

mod reader;

pub use reader::PdfReader;

use crate::error::PdfError;

/// Result type for document reading.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Source of report text.
pub trait DocumentReader {
    /// Read the text content of a document.
    fn read_text(&self, data: &[u8]) -> Result<String>;
}
