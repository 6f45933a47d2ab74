//! Turning uploaded bytes into page documents

use super::RagError;
use std::io::Write;
use std::path::Path;

/// Text of one page (plain-text uploads are a single page)
#[derive(Debug, Clone, PartialEq)]
pub struct PageDocument {
    /// 1-based
    pub page: usize,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn from_filename(filename: &str) -> Result<Self, RagError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match ext.as_str() {
            "pdf" => Ok(Self::Pdf),
            "txt" | "md" | "markdown" => Ok(Self::Text),
            "" => Err(RagError::Ingestion(format!(
                "Cannot determine file type of '{filename}'"
            ))),
            other => Err(RagError::Ingestion(format!(
                "Unsupported file type: .{other}"
            ))),
        }
    }
}

/// Parse `bytes` according to the file extension of `filename`
pub async fn load_documents(bytes: &[u8], filename: &str) -> Result<Vec<PageDocument>, RagError> {
    match DocumentKind::from_filename(filename)? {
        DocumentKind::Text => Ok(vec![PageDocument {
            page: 1,
            text: String::from_utf8_lossy(bytes).into_owned(),
        }]),
        DocumentKind::Pdf => load_pdf(bytes, &std::env::temp_dir()).await,
    }
}

/// The PDF is staged in a temporary file under `staging_dir` that is removed
/// when the blocking task finishes, even if extraction fails or panics.
async fn load_pdf(bytes: &[u8], staging_dir: &Path) -> Result<Vec<PageDocument>, RagError> {
    let mut file = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(".pdf")
        .tempfile_in(staging_dir)
        .map_err(|e| RagError::Ingestion(format!("Failed to stage upload: {e}")))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| RagError::Ingestion(format!("Failed to stage upload: {e}")))?;

    let pages = tokio::task::spawn_blocking(move || {
        let result = pdf_extract::extract_text_by_pages(file.path());
        drop(file);
        result
    })
    .await
    .map_err(|e| RagError::Ingestion(format!("PDF parser crashed: {e}")))?
    .map_err(|e| RagError::Ingestion(format!("PDF parse error: {e}")))?;

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageDocument { page: i + 1, text })
        .collect())
}
