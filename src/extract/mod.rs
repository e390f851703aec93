
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

use crate::{RagError, Result};

const PAGE_BREAK: char = '\u{000C}';

/// Raw text of one PDF page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    pub text: String,
    /// Path of the file the page was read from
    pub source: String,
    /// Zero-based page number
    pub page: u32,
}

/// Loads a document as a sequence of page text units.
pub trait DocumentLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<DocumentPage>>;
}

/// Extracts page text by running poppler's `pdftotext`
#[derive(Debug, Clone)]
pub struct PdfToTextLoader {
    program: PathBuf,
}

impl Default for PdfToTextLoader {
    #[inline]
    fn default() -> Self {
        Self {
            program: PathBuf::from("pdftotext"),
        }
    }
}

impl PdfToTextLoader {
    #[inline]
    pub fn with_program<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl DocumentLoader for PdfToTextLoader {
    fn load(&self, path: &Path) -> Result<Vec<DocumentPage>> {
        debug!("Extracting text from {}", path.display());

        let output = Command::new(&self.program)
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| {
                RagError::Extraction(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(RagError::Extraction(format!(
                "{} exited with {:?} for {}: {}",
                self.program.display(),
                output.status.code(),
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        let pages = split_pages(&text, &path.to_string_lossy());
        debug!("Loaded {} pages from {}", pages.len(), path.display());
        Ok(pages)
    }
}

/// Split form-feed separated text into pages. Blank pages are skipped but
/// still advance the page counter.
pub fn split_pages(text: &str, source: &str) -> Vec<DocumentPage> {
    let body = text.strip_suffix(PAGE_BREAK).unwrap_or(text);

    body.split(PAGE_BREAK)
        .zip(0_u32..)
        .filter(|(page_text, _)| !page_text.trim().is_empty())
        .map(|(page_text, page)| DocumentPage {
            text: page_text.to_string(),
            source: source.to_string(),
            page,
        })
        .collect()
}

/// PDF files directly inside `folder`, sorted by path
pub fn discover_pdfs(folder: &Path) -> Result<Vec<PathBuf>> {
    let mut pdfs = Vec::new();

    for entry in std::fs::read_dir(folder)? {
        let entry = entry?;
        let path = entry.path();

        if !entry.file_type()?.is_file() {
            continue;
        }

        if path.extension().is_some_and(|ext| ext == "pdf") {
            pdfs.push(path);
        } else {
            debug!("Skipping non-PDF file {}", path.display());
        }
    }

    pdfs.sort();
    if pdfs.is_empty() {
        warn!("No PDF files in {}", folder.display());
    }
    Ok(pdfs)
}
