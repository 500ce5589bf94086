use crate::document::{pdf, xlsx, Document};
use crate::error::DecodeError;
use crate::message::{Attachment, AttachmentContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Pdf,
    Xlsx,
    Csv,
    Text,
}

fn detect(attachment: &Attachment) -> Option<Format> {
    let ext = attachment.extension();
    let media = attachment.media_type.to_ascii_lowercase();
    match ext.as_deref() {
        Some("pdf") => return Some(Format::Pdf),
        Some("xlsx") | Some("xlsm") => return Some(Format::Xlsx),
        Some("csv") => return Some(Format::Csv),
        Some("txt") | Some("tsv") => return Some(Format::Text),
        _ => {}
    }
    match media.as_str() {
        "application/pdf" => Some(Format::Pdf),
        xlsx::MEDIA_TYPE => Some(Format::Xlsx),
        "text/csv" => Some(Format::Csv),
        m if m.starts_with("text/") => Some(Format::Text),
        _ => None,
    }
}

/// Turns an attachment into a document.
///
/// Text a mail source already extracted is used as-is. Unsupported formats
/// and broken files are input defects for the caller to log and skip.
pub fn decode_attachment(attachment: &Attachment) -> Result<Document, DecodeError> {
    let bytes = match &attachment.content {
        AttachmentContent::Text(text) => {
            return Ok(Document::plain(&attachment.filename, text.clone()))
        }
        AttachmentContent::Bytes(bytes) => bytes,
    };

    let format = detect(attachment).ok_or_else(|| {
        DecodeError::UnsupportedFormat(format!(
            "{} ({})",
            attachment.extension().unwrap_or_default(),
            attachment.media_type
        ))
    })?;

    let mut document = match format {
        Format::Pdf => pdf::decode(&attachment.filename, bytes),
        Format::Xlsx => xlsx::decode(&attachment.filename, bytes)?,
        Format::Csv => Document::plain(&attachment.filename, csv_to_text(bytes)?),
        Format::Text => Document::plain(
            &attachment.filename,
            String::from_utf8_lossy(bytes).into_owned(),
        ),
    };
    document.media_type = Some(attachment.media_type.clone());
    Ok(document)
}

/// Normalises quoting and renders one tab-separated line per record.
fn csv_to_text(bytes: &[u8]) -> Result<String, DecodeError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut lines = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| DecodeError::Text(format!("Malformed CSV: {}", e)))?;
        let cells: Vec<String> = record
            .iter()
            .map(|c| String::from_utf8_lossy(c).trim().to_string())
            .collect();
        lines.push(cells.join("\t"));
    }
    Ok(lines.join("\n"))
}
