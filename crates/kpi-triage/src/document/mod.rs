//! Documents submitted to suitability scoring.
//!
//! A document is either a message body or one decoded attachment. Content is a
//! tagged variant so the classifier and extractor stay format-agnostic: every
//! variant renders to line-oriented text with tab-separated cells.

pub mod decode;
pub mod pdf;
pub mod xlsx;

use std::fmt;
use std::sync::Arc;

pub use decode::decode_attachment;

#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// One line per row, cells joined with tabs, trailing empty cells dropped.
    pub fn text(&self) -> String {
        self.rows
            .iter()
            .map(|row| {
                let end = row
                    .iter()
                    .rposition(|c| !c.trim().is_empty())
                    .map_or(0, |i| i + 1);
                row[..end].join("\t")
            })
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    PlainText(String),
    Sheets(Vec<Sheet>),
    Pages(Vec<Page>),
}

/// Where a document came from; also fixes the order documents are merged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOrigin {
    Attachment { filename: String },
    Sheet { filename: String, sheet: String },
    Body,
}

impl DocumentOrigin {
    /// Attachments first, then individual sheets, then the body.
    pub fn rank(&self) -> u8 {
        match self {
            DocumentOrigin::Attachment { .. } => 0,
            DocumentOrigin::Sheet { .. } => 1,
            DocumentOrigin::Body => 2,
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            DocumentOrigin::Attachment { filename } | DocumentOrigin::Sheet { filename, .. } => {
                Some(filename)
            }
            DocumentOrigin::Body => None,
        }
    }
}

impl fmt::Display for DocumentOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentOrigin::Attachment { filename } => write!(f, "{}", filename),
            DocumentOrigin::Sheet { filename, sheet } => write!(f, "{}#{}", filename, sheet),
            DocumentOrigin::Body => f.write_str("body"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub origin: DocumentOrigin,
    pub media_type: Option<String>,
    pub content: DocumentContent,
    /// Original bytes of a page document, kept for text recovery.
    pub raw: Option<Arc<[u8]>>,
}

impl Document {
    pub fn body(text: impl Into<String>) -> Self {
        Self {
            origin: DocumentOrigin::Body,
            media_type: Some("text/plain".to_string()),
            content: DocumentContent::PlainText(text.into()),
            raw: None,
        }
    }

    pub fn plain(filename: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            origin: DocumentOrigin::Attachment {
                filename: filename.into(),
            },
            media_type: Some("text/plain".to_string()),
            content: DocumentContent::PlainText(text.into()),
            raw: None,
        }
    }

    pub fn sheets(filename: impl Into<String>, sheets: Vec<Sheet>) -> Self {
        Self {
            origin: DocumentOrigin::Attachment {
                filename: filename.into(),
            },
            media_type: Some(xlsx::MEDIA_TYPE.to_string()),
            content: DocumentContent::Sheets(sheets),
            raw: None,
        }
    }

    pub fn pages(filename: impl Into<String>, pages: Vec<Page>, raw: Option<Arc<[u8]>>) -> Self {
        Self {
            origin: DocumentOrigin::Attachment {
                filename: filename.into(),
            },
            media_type: Some("application/pdf".to_string()),
            content: DocumentContent::Pages(pages),
            raw,
        }
    }

    pub fn label(&self) -> String {
        self.origin.to_string()
    }

    pub fn filename(&self) -> Option<&str> {
        self.origin.filename()
    }

    pub fn text(&self) -> String {
        match &self.content {
            DocumentContent::PlainText(text) => text.clone(),
            DocumentContent::Sheets(sheets) => sheets
                .iter()
                .map(Sheet::text)
                .collect::<Vec<_>>()
                .join("\n"),
            DocumentContent::Pages(pages) => pages
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        match &self.content {
            DocumentContent::Sheets(sheets) => sheets.iter().map(|s| s.name.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_pages(&self) -> bool {
        matches!(self.content, DocumentContent::Pages(_))
    }

    /// A workbook becomes one document per sheet so a rejected sheet cannot
    /// veto or feed values into its siblings. Other documents pass through.
    pub fn split_sheets(self) -> Vec<Document> {
        match self.content {
            DocumentContent::Sheets(sheets) if !sheets.is_empty() => {
                let filename = self.origin.filename().unwrap_or("workbook").to_string();
                sheets
                    .into_iter()
                    .map(|sheet| Document {
                        origin: DocumentOrigin::Sheet {
                            filename: filename.clone(),
                            sheet: sheet.name.clone(),
                        },
                        media_type: self.media_type.clone(),
                        content: DocumentContent::Sheets(vec![sheet]),
                        raw: None,
                    })
                    .collect()
            }
            content => vec![Document { content, ..self }],
        }
    }

    /// False for page documents whose extracted text is too thin or garbled
    /// to score, i.e. scans.
    pub fn has_text_layer(&self, min_chars: usize) -> bool {
        match &self.content {
            DocumentContent::Pages(_) => {
                let text = self.text();
                text.split_whitespace().map(str::len).sum::<usize>() >= min_chars
                    && !pdf::needs_text_recovery(&text)
            }
            _ => true,
        }
    }

    /// Replaces a scan's content with recovered text.
    pub fn with_recovered_text(self, text: String) -> Self {
        Self {
            content: DocumentContent::PlainText(text),
            raw: None,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workbook() -> Document {
        Document::sheets(
            "cash.xlsx",
            vec![
                Sheet::new(
                    "Summary",
                    vec![
                        vec!["Cash Balance".into(), "45,000".into(), "".into()],
                        vec!["".into(), "".into()],
                    ],
                ),
                Sheet::new("Proforma Model", vec![vec!["IRR".into(), "14%".into()]]),
            ],
        )
    }

    #[test]
    fn test_sheet_text_drops_empty_rows_and_trailing_cells() {
        let doc = workbook();
        assert_eq!(doc.text(), "Cash Balance\t45,000\nIRR\t14%");
    }

    #[test]
    fn test_split_sheets() {
        let parts = workbook().split_sheets();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].label(), "cash.xlsx#Summary");
        assert_eq!(parts[1].sheet_names(), vec!["Proforma Model"]);
        assert_eq!(parts[0].filename(), Some("cash.xlsx"));
    }

    #[test]
    fn test_split_passes_plain_through() {
        let parts = Document::body("hello").split_sheets();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].origin, DocumentOrigin::Body);
    }

    #[test]
    fn test_text_layer() {
        let scan = Document::pages(
            "scan.pdf",
            vec![Page {
                number: 1,
                text: "  \n".into(),
            }],
            None,
        );
        assert!(!scan.has_text_layer(200));
        assert!(Document::body("").has_text_layer(200));

        let recovered = scan.with_recovered_text("Cash 1".into());
        assert!(!recovered.is_pages());
        assert_eq!(recovered.text(), "Cash 1");
    }

    #[test]
    fn test_origin_rank() {
        assert!(
            DocumentOrigin::Attachment {
                filename: "a".into()
            }
            .rank()
                < DocumentOrigin::Body.rank()
        );
    }
}
