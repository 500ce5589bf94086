use std::sync::Arc;

use crate::document::{Document, Page};

/// Pattern for Identity-H Unimplemented errors (common with CID fonts).
const IDENTITY_H_PATTERN: &str = "?Identity-H Unimplemented?";

/// Text shorter than this is not put through the alphanumeric ratio check.
const MIN_TOTAL_CHARS: usize = 50;

const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Decodes a PDF into pages.
///
/// A file lopdf cannot parse still yields a page document with no pages, so
/// the text-recovery path gets a chance at it.
pub fn decode(filename: &str, bytes: &[u8]) -> Document {
    let _span = tracing::debug_span!("decode_pdf").entered();
    let raw: Arc<[u8]> = Arc::from(bytes);

    let pages = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => extract_pages(&doc),
        Err(e) => {
            tracing::warn!(
                "lopdf failed to parse {}: {}. Treating as a scan.",
                filename,
                e
            );
            Vec::new()
        }
    };

    Document::pages(filename, pages, Some(raw))
}

fn extract_pages(doc: &lopdf::Document) -> Vec<Page> {
    doc.get_pages()
        .into_keys()
        .map(|number| Page {
            number,
            text: doc.extract_text(&[number]).unwrap_or_default(),
        })
        .collect()
}

/// True when extracted text is empty, only font-encoding error markers, or
/// mostly non-alphanumeric noise.
pub fn needs_text_recovery(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }

    let cleaned = trimmed
        .replace(IDENTITY_H_PATTERN, "")
        .replace(['\n', ' '], "");
    if cleaned.is_empty() {
        return true;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT
}
