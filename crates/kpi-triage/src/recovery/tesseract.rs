//! Tesseract-backed recovery: pages are rendered with `pdftoppm` and read with
//! leptess. Requires poppler-utils and tesseract on the host.

use std::io::Cursor;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use async_trait::async_trait;

use crate::document::Document;

use super::{RecoveryOutcome, TextRecovery};

#[derive(Clone)]
pub struct TesseractRecovery {
    languages: String,
    dpi: u32,
}

impl TesseractRecovery {
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };
        Self { languages, dpi }
    }

    fn recover_blocking(&self, bytes: &[u8]) -> Result<String, String> {
        let page_count = lopdf::Document::load_mem(bytes)
            .map(|doc| doc.get_pages().len())
            .unwrap_or(1)
            .max(1);

        let workdir = std::env::temp_dir().join(format!("kpi_triage_ocr_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&workdir).map_err(|e| format!("temp dir: {}", e))?;
        let result = self.recover_pages(bytes, page_count, &workdir);
        let _ = std::fs::remove_dir_all(&workdir);
        result
    }

    fn recover_pages(&self, bytes: &[u8], page_count: usize, workdir: &Path) -> Result<String, String> {
        let pdf_path = workdir.join("input.pdf");
        std::fs::write(&pdf_path, bytes).map_err(|e| format!("write temp PDF: {}", e))?;

        let mut text = String::new();
        for page in 1..=page_count {
            match self.render_page(&pdf_path, page as u32, workdir) {
                Ok(png) => match self.read_image(&png) {
                    Ok(page_text) => {
                        text.push_str(&page_text);
                        text.push('\n');
                    }
                    Err(e) => tracing::debug!(page, error = %e, "OCR failed for page"),
                },
                Err(e) => tracing::debug!(page, error = %e, "Page render failed"),
            }
        }
        Ok(text)
    }

    fn render_page(&self, pdf_path: &Path, page: u32, workdir: &Path) -> Result<Vec<u8>, String> {
        let prefix = workdir.join(format!("page_{}", page));
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-f")
            .arg(page.to_string())
            .arg("-l")
            .arg(page.to_string())
            .arg("-singlefile")
            .arg(pdf_path)
            .arg(&prefix)
            .output()
            .map_err(|e| format!("pdftoppm unavailable: {}", e))?;
        if !output.status.success() {
            return Err(format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        let png_path = prefix.with_extension("png");
        std::fs::read(&png_path).map_err(|e| format!("read rendered page: {}", e))
    }

    fn read_image(&self, image_data: &[u8]) -> Result<String, String> {
        let img = image::load_from_memory(image_data)
            .map_err(|e| format!("Failed to load image: {}", e))?;
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| format!("Failed to convert image: {}", e))?;

        let mut lt = leptess::LepTess::new(None, &self.languages)
            .map_err(|e| format!("Failed to initialize Tesseract: {}", e))?;
        lt.set_image_from_mem(&png)
            .map_err(|e| format!("Failed to set image for OCR: {}", e))?;
        lt.get_utf8_text().map_err(|e| format!("OCR failed: {}", e))
    }
}

#[async_trait]
impl TextRecovery for TesseractRecovery {
    async fn recover(&self, document: &Document) -> RecoveryOutcome {
        let Some(raw) = document.raw.clone() else {
            return RecoveryOutcome::Unavailable("no raw bytes to recover from".to_string());
        };
        let engine = self.clone();
        let raw: Arc<[u8]> = raw;
        match tokio::task::spawn_blocking(move || engine.recover_blocking(&raw)).await {
            Ok(Ok(text)) => RecoveryOutcome::Recovered(text),
            Ok(Err(reason)) => RecoveryOutcome::Unavailable(reason),
            Err(e) => RecoveryOutcome::Unavailable(format!("recovery task failed: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_join() {
        let engine = TesseractRecovery::new(&["eng".to_string(), "deu".to_string()], 300);
        assert_eq!(engine.languages, "eng+deu");
        assert_eq!(TesseractRecovery::new(&[], 150).languages, "eng");
    }

    #[test]
    fn test_invalid_image_is_error() {
        let engine = TesseractRecovery::new(&[], 300);
        let err = engine.read_image(b"not an image").unwrap_err();
        assert!(err.contains("Failed to load image"));
    }

    #[tokio::test]
    async fn test_missing_raw_bytes() {
        let engine = TesseractRecovery::new(&[], 300);
        let doc = Document::pages("scan.pdf", vec![], None);
        assert!(matches!(
            engine.recover(&doc).await,
            RecoveryOutcome::Unavailable(_)
        ));
    }
}
