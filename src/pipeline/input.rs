//! Upload intake: turn a user-supplied path or URL into named PDF bytes.
//!
//! The workspace keeps raw bytes for the lifetime of a document (previews
//! re-decode them on demand), so intake reads the whole file into memory.
//! No magic-byte check happens here: a file that is not a PDF is still
//! ingested and settles as `Error` with a parse message, like any other
//! undecodable upload.

use crate::error::PdfCiteError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Fallback file name when a URL has no usable last path segment.
pub const DEFAULT_DOWNLOAD_NAME: &str = "downloaded.pdf";

/// One file selected for ingestion.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Display name; citations resolve against it.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve a local path or an HTTP(S) URL to an [`Upload`].
pub async fn resolve_upload(input: &str, timeout_secs: u64) -> Result<Upload, PdfCiteError> {
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

async fn read_local(path: &Path) -> Result<Upload, PdfCiteError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => PdfCiteError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => PdfCiteError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => PdfCiteError::Internal(format!("Failed to read {}: {}", path.display(), e)),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    debug!("Read local upload {} ({} bytes)", path.display(), bytes.len());
    Ok(Upload { name, bytes })
}

async fn download_url(url: &str, timeout_secs: u64) -> Result<Upload, PdfCiteError> {
    info!("Downloading PDF from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| PdfCiteError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let map_send_error = |e: reqwest::Error| {
        if e.is_timeout() {
            PdfCiteError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            PdfCiteError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let response = client.get(url).send().await.map_err(map_send_error)?;

    if !response.status().is_success() {
        return Err(PdfCiteError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let bytes = response.bytes().await.map_err(map_send_error)?;
    let name = filename_from_url(url);
    info!("Downloaded {} ({} bytes)", name, bytes.len());

    Ok(Upload {
        name,
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty path segment containing a dot, else [`DEFAULT_DOWNLOAD_NAME`].
pub fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }
    DEFAULT_DOWNLOAD_NAME.to_string()
}

/// Expand directories to the PDFs directly inside them, sorted by name.
///
/// Other inputs (files, URLs) pass through unchanged.
pub fn expand_inputs(inputs: &[String]) -> Result<Vec<String>, PdfCiteError> {
    let mut out = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if is_url(input) || !path.is_dir() {
            out.push(input.clone());
            continue;
        }
        let entries = std::fs::read_dir(&path).map_err(|e| {
            PdfCiteError::Internal(format!("Failed to list {}: {}", path.display(), e))
        })?;
        let mut pdfs: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        pdfs.sort();
        out.extend(pdfs.into_iter().map(|p| p.display().to_string()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn url_file_names() {
        assert_eq!(filename_from_url("https://x.org/a/Master.pdf"), "Master.pdf");
        assert_eq!(filename_from_url("https://x.org/a/Master.pdf?dl=1"), "Master.pdf");
        assert_eq!(filename_from_url("https://x.org/download"), DEFAULT_DOWNLOAD_NAME);
        assert_eq!(filename_from_url("https://x.org/"), DEFAULT_DOWNLOAD_NAME);
    }

    #[tokio::test]
    async fn reads_local_file_with_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Lease.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let upload = resolve_upload(path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(upload.name, "Lease.pdf");
        assert_eq!(upload.bytes, b"%PDF-1.4 body");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let err = resolve_upload("/definitely/not/here.pdf", 5).await.unwrap_err();
        assert!(matches!(err, PdfCiteError::FileNotFound { .. }));
    }

    #[test]
    fn expands_directories_to_sorted_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.pdf", "a.PDF", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let dir_str = dir.path().display().to_string();
        let expanded = expand_inputs(&[dir_str, "https://x.org/c.pdf".into()]).unwrap();
        assert_eq!(expanded.len(), 3);
        assert!(expanded[0].ends_with("a.PDF"));
        assert!(expanded[1].ends_with("b.pdf"));
        assert_eq!(expanded[2], "https://x.org/c.pdf");
    }
}
