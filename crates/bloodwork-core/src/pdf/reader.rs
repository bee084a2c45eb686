//! PDF text reading using pdf-extract, with lopdf as the fallback reader.

use std::panic::{self, AssertUnwindSafe};

use lopdf::Document;
use tracing::{debug, warn};

use super::{DocumentReader, Result};
use crate::error::PdfError;
use crate::models::InputConfig;

/// Reads text layers from PDF lab reports.
///
/// pdf-extract keeps the reading order of most vendor layouts, so it runs
/// first. When it fails or yields too little text, lopdf's per-page text
/// extraction is tried instead and the longer of the two results is kept.
#[derive(Debug, Clone)]
pub struct PdfReader {
    min_text_length: usize,
    enable_fallback: bool,
}

impl PdfReader {
    pub fn new() -> Self {
        Self::from_config(&InputConfig::default())
    }

    pub fn from_config(config: &InputConfig) -> Self {
        Self {
            min_text_length: config.min_text_length,
            enable_fallback: config.enable_fallback_reader,
        }
    }

    /// Load the document, decrypting empty-password PDFs.
    ///
    /// Returns the document and the bytes pdf-extract should read.
    fn load(&self, data: &[u8]) -> Result<(Document, Vec<u8>)> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        let bytes = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        if doc.get_pages().is_empty() {
            return Err(PdfError::NoPages);
        }
        debug!("Loaded PDF with {} pages", doc.get_pages().len());
        Ok((doc, bytes))
    }

    fn primary_text(bytes: &[u8]) -> Result<String> {
        // pdf-extract panics on some malformed font programs
        panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
            .map_err(|_| PdfError::TextExtraction("pdf-extract panicked".to_string()))?
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }

    fn page_text(doc: &Document) -> Result<String> {
        let pages: Vec<u32> = doc.get_pages().keys().copied().collect();
        doc.extract_text(&pages)
            .map_err(|e| PdfError::TextExtraction(e.to_string()))
    }
}

impl Default for PdfReader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentReader for PdfReader {
    fn read_text(&self, data: &[u8]) -> Result<String> {
        let (doc, bytes) = self.load(data)?;

        let primary = Self::primary_text(&bytes);
        if !self.enable_fallback {
            return primary;
        }

        match primary {
            Ok(text) if meaningful_len(&text) >= self.min_text_length => Ok(text),
            Ok(text) => {
                debug!(
                    chars = meaningful_len(&text),
                    min = self.min_text_length,
                    "primary text too short, trying page text"
                );
                match Self::page_text(&doc) {
                    Ok(fallback) if meaningful_len(&fallback) > meaningful_len(&text) => Ok(fallback),
                    _ => Ok(text),
                }
            }
            Err(e) => {
                warn!("Primary text extraction failed: {}", e);
                Self::page_text(&doc)
            }
        }
    }
}

/// Non-whitespace character count.
fn meaningful_len(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};

    fn sample_pdf(lines: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
        ];
        for line in lines {
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
        }
        operations.push(Operation::new("ET", vec![]));

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn test_rejects_non_pdf_bytes() {
        let err = PdfReader::new().read_text(b"Glucose 95 mg/dL").unwrap_err();
        assert!(matches!(err, PdfError::Parse(_)));
    }

    #[test]
    fn test_short_primary_text_uses_fallback_reader() {
        let reader = PdfReader::from_config(&InputConfig {
            min_text_length: 10_000,
            enable_fallback_reader: true,
        });
        let text = reader.read_text(&sample_pdf(&["Glucose 95 mg/dL", "Sodium 140 mmol/L"])).unwrap();
        assert!(text.contains("Glucose"));
    }

    #[test]
    fn test_meaningful_len_ignores_whitespace() {
        assert_eq!(meaningful_len(" a b\n\tc "), 3);
    }
}
