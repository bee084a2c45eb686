//! Core library for lab report biomarker extraction.
//!
//! This crate provides:
//! - Rule catalogs: markers, aliases, plausible ranges, vendor format profiles
//! - Text normalization for noisy PDF and OCR text
//! - Format classification and multi-strategy marker/value matching
//! - Value validation and test-date inference
//! - PDF text reading (`pdf` feature)

pub mod error;
pub mod extract;
pub mod models;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod rules;

pub use error::{BloodworkError, ExtractionError, Result, RuleError};
#[cfg(feature = "pdf")]
pub use error::PdfError;
pub use extract::{Classification, LabReportParser, ReportParser};
pub use models::{
    BloodworkConfig, ExtractedRecord, ExtractionConfig, ExtractionResult, ExtractionStatus, MarkerValue,
    TestDate,
};
#[cfg(feature = "pdf")]
pub use pdf::{DocumentReader, PdfReader};
pub use rules::{FormatId, RuleStore, DEFAULT_CATALOG};
