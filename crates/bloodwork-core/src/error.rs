//! Error types for the bloodwork-core library.

use thiserror::Error;

/// Main error type for the bloodwork library.
#[derive(Error, Debug)]
pub enum BloodworkError {
    /// Rule catalog loading or compilation error.
    #[error("rule catalog error: {0}")]
    Rules(#[from] RuleError),

    /// Whole-document extraction failure.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Document reader error.
    #[cfg(feature = "pdf")]
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors raised while loading or compiling a rule catalog.
#[derive(Error, Debug)]
pub enum RuleError {
    /// Catalog file could not be read.
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog is not valid JSON for the expected schema.
    #[error("invalid catalog JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A configured regular expression failed to compile.
    #[error("invalid pattern in {context}: {source}")]
    Pattern {
        context: String,
        #[source]
        source: regex::Error,
    },

    /// Two markers share a canonical name.
    #[error("duplicate marker name: {0}")]
    DuplicateMarker(String),

    /// An alias resolves to more than one marker.
    #[error("alias '{alias}' is claimed by both '{first}' and '{second}'")]
    AliasCollision {
        alias: String,
        first: String,
        second: String,
    },

    /// A marker's plausible range is inverted.
    #[error("marker '{0}' has min greater than max")]
    InvertedRange(String),

    /// A categorical marker without any allowed values.
    #[error("categorical marker '{0}' lists no allowed values")]
    EmptyCategories(String),

    /// Two format profiles share an id, or a profile uses the reserved id.
    #[error("invalid format id: {0}")]
    InvalidFormatId(String),

    /// A profile names a strategy it has no templates for.
    #[error("format '{format}' uses strategy '{strategy}' without templates")]
    MissingTemplates { format: String, strategy: String },

    /// A template lacks a required capture group.
    #[error("template in format '{format}' lacks the '{group}' capture group")]
    MissingGroup { format: String, group: String },
}

/// Errors that fail a whole document.
///
/// Per-candidate problems are never errors; they are counted in the result
/// diagnostics instead.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Input bytes are not valid UTF-8 text.
    #[error("input is not decodable as UTF-8 text (invalid byte at offset {0})")]
    Undecodable(usize),

    /// Input decodes but is mostly control or binary characters.
    #[error("input looks like binary data (control character ratio {0:.2})")]
    Unreadable(f64),

    /// The caller forced a format that the catalog does not define.
    #[error("unknown format profile: {0}")]
    UnknownFormat(String),
}

/// Errors related to PDF text reading.
#[cfg(feature = "pdf")]
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Result type for the bloodwork library.
pub type Result<T> = std::result::Result<T, BloodworkError>;
