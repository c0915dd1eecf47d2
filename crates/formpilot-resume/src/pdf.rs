//! PDF upload validation and text extraction.

use tracing::{debug, info};

use crate::{Error, Result};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Reject anything that is not named `*.pdf` or does not start with the PDF header.
pub fn ensure_pdf(file_name: &str, bytes: &[u8]) -> Result<()> {
    if !file_name.to_ascii_lowercase().ends_with(".pdf") {
        return Err(Error::NotAPdf(format!(
            "only PDF files are accepted, got '{}'",
            file_name
        )));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(Error::NotAPdf(format!(
            "'{}' does not look like a PDF document",
            file_name
        )));
    }
    Ok(())
}

/// Validate an upload and extract its plain text.
///
/// Extraction runs on a blocking thread. An empty or whitespace-only result is
/// `ExtractionFailed`.
pub async fn extract_text(file_name: &str, bytes: Vec<u8>) -> Result<String> {
    ensure_pdf(file_name, &bytes)?;

    let started = std::time::Instant::now();
    let size = bytes.len();
    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| Error::ExtractionFailed(format!("extraction task failed: {}", e)))?
        .map_err(|e| Error::ExtractionFailed(e.to_string()))?;
    debug!("Extracted {} chars from {} bytes", text.len(), size);

    if text.trim().is_empty() {
        return Err(Error::ExtractionFailed(format!(
            "no text could be extracted from '{}'",
            file_name
        )));
    }
    info!(
        "Converted {} in {:.2}s",
        file_name,
        started.elapsed().as_secs_f64()
    );
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_check_is_case_insensitive() {
        assert!(ensure_pdf("CV.PDF", b"%PDF-1.7\n").is_ok());
        assert!(ensure_pdf("resume.pdf", b"%PDF-1.4\n").is_ok());
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let err = ensure_pdf("resume.docx", b"%PDF-1.4").unwrap_err();
        assert!(matches!(err, Error::NotAPdf(_)));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let err = ensure_pdf("resume.pdf", b"PK\x03\x04").unwrap_err();
        assert!(matches!(err, Error::NotAPdf(_)));
    }

    #[tokio::test]
    async fn test_garbage_pdf_fails_extraction() {
        let err = extract_text("resume.pdf", b"%PDF-1.4\nnot really".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExtractionFailed(_)), "{err}");
    }
}
