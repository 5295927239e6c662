//! Extension-driven loader selection and format parsers.
//!
//! [`get_document_loader`] is a pure dispatch table from file extension to a [`DocumentLoader`].
//! Loaders read the file from disk and return ordered text segments; they are synchronous and
//! expected to run on the blocking pool.

use super::types::{Document, DocumentSegment, FileType, LoaderError, SegmentMetadata};
use std::path::Path;

/// Parses a file on disk into a [`Document`].
pub trait DocumentLoader: Send + Sync {
    /// Format handled by this loader.
    fn file_type(&self) -> FileType;

    /// Load the file at `path`, labeling segments with `source`.
    fn load(&self, path: &Path, source: &str) -> Result<Document, LoaderError>;
}

/// Return the loader for `path`'s extension, or `UnsupportedFileType` carrying the extension.
pub fn get_document_loader(path: &Path) -> Result<Box<dyn DocumentLoader>, LoaderError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    match FileType::from_extension(extension) {
        Some(FileType::Pdf) => Ok(Box::new(PdfLoader)),
        Some(FileType::Txt) => Ok(Box::new(TextLoader)),
        Some(FileType::Docx) => Ok(Box::new(DocxLoader)),
        None if extension.is_empty() => Err(LoaderError::UnsupportedFileType(
            "(no extension)".to_string(),
        )),
        None => Err(LoaderError::UnsupportedFileType(format!(
            ".{}",
            extension.to_lowercase()
        ))),
    }
}

fn single_segment(source: &str, file_type: FileType, text: String) -> Document {
    Document {
        name: source.to_string(),
        file_type,
        segments: vec![DocumentSegment {
            text,
            metadata: SegmentMetadata {
                source: source.to_string(),
                page: None,
            },
        }],
    }
}

/// Plain text loader; invalid UTF-8 sequences are replaced rather than rejected.
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn file_type(&self) -> FileType {
        FileType::Txt
    }

    fn load(&self, path: &Path, source: &str) -> Result<Document, LoaderError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(single_segment(source, FileType::Txt, text))
    }
}

/// PDF loader producing one segment per page.
pub struct PdfLoader;

impl PdfLoader {
    fn parse_error(message: impl ToString) -> LoaderError {
        LoaderError::Parse {
            format: FileType::Pdf,
            message: message.to_string(),
        }
    }
}

impl DocumentLoader for PdfLoader {
    fn file_type(&self) -> FileType {
        FileType::Pdf
    }

    fn load(&self, path: &Path, source: &str) -> Result<Document, LoaderError> {
        let bytes = std::fs::read(path)?;
        let pdf = lopdf::Document::load_mem(&bytes).map_err(Self::parse_error)?;

        let mut segments = Vec::new();
        for page_number in pdf.get_pages().keys().copied() {
            match pdf.extract_text(&[page_number]) {
                Ok(text) if !text.trim().is_empty() => segments.push(DocumentSegment {
                    text,
                    metadata: SegmentMetadata {
                        source: source.to_string(),
                        page: Some(page_number),
                    },
                }),
                Ok(_) => {}
                Err(error) => {
                    tracing::debug!(source, page = page_number, error = %error, "Page text extraction failed");
                }
            }
        }

        if segments.is_empty() {
            tracing::debug!(source, "Per-page extraction empty; falling back to whole-document text");
            let text = pdf_extract::extract_text_from_mem(&bytes).map_err(Self::parse_error)?;
            return Ok(single_segment(source, FileType::Pdf, text));
        }

        Ok(Document {
            name: source.to_string(),
            file_type: FileType::Pdf,
            segments,
        })
    }
}

/// DOCX loader emitting paragraph text, one line per paragraph.
pub struct DocxLoader;

impl DocumentLoader for DocxLoader {
    fn file_type(&self) -> FileType {
        FileType::Docx
    }

    fn load(&self, path: &Path, source: &str) -> Result<Document, LoaderError> {
        let bytes = std::fs::read(path)?;
        let docx = docx_rs::read_docx(&bytes).map_err(|error| LoaderError::Parse {
            format: FileType::Docx,
            message: error.to_string(),
        })?;

        let mut text = String::new();
        for child in docx.document.children {
            if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
                for child in paragraph.children {
                    if let docx_rs::ParagraphChild::Run(run) = child {
                        for child in run.children {
                            if let docx_rs::RunChild::Text(t) = child {
                                text.push_str(&t.text);
                            }
                        }
                    }
                }
                text.push('\n');
            }
        }

        Ok(single_segment(source, FileType::Docx, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn supported_extensions_resolve_to_loaders() {
        for (name, expected) in [
            ("report.pdf", FileType::Pdf),
            ("notes.txt", FileType::Txt),
            ("memo.docx", FileType::Docx),
            ("SHOUTING.PDF", FileType::Pdf),
        ] {
            let loader = get_document_loader(Path::new(name)).expect("loader");
            assert_eq!(loader.file_type(), expected, "{name}");
        }
    }

    #[test]
    fn unsupported_extensions_carry_the_extension() {
        let error = get_document_loader(Path::new("table.csv")).err().expect("error");
        assert!(matches!(error, LoaderError::UnsupportedFileType(ref ext) if ext == ".csv"));

        let error = get_document_loader(Path::new("README")).err().expect("error");
        assert!(matches!(error, LoaderError::UnsupportedFileType(_)));
    }

    #[test]
    fn text_loader_reads_single_segment() {
        let mut file = tempfile::Builder::new()
            .suffix(".txt")
            .tempfile()
            .expect("temp file");
        file.write_all("héllo\nworld".as_bytes()).expect("write");

        let document = TextLoader.load(file.path(), "notes.txt").expect("load");
        assert_eq!(document.name, "notes.txt");
        assert_eq!(document.segments.len(), 1);
        assert_eq!(document.segments[0].text, "héllo\nworld");
        assert_eq!(document.segments[0].metadata.source, "notes.txt");
        assert_eq!(document.segments[0].metadata.page, None);
    }

    #[test]
    fn text_loader_replaces_invalid_utf8() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&[b'o', b'k', 0xff, b'!']).expect("write");

        let document = TextLoader.load(file.path(), "bin.txt").expect("load");
        assert_eq!(document.segments[0].text, "ok\u{fffd}!");
    }

    #[test]
    fn pdf_loader_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"definitely not a pdf").expect("write");

        let error = PdfLoader.load(file.path(), "broken.pdf").unwrap_err();
        assert!(matches!(error, LoaderError::Parse { format: FileType::Pdf, .. }));
    }

    #[test]
    fn docx_loader_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"PK not really a zip").expect("write");

        let error = DocxLoader.load(file.path(), "broken.docx").unwrap_err();
        assert!(matches!(error, LoaderError::Parse { format: FileType::Docx, .. }));
    }

    #[test]
    fn missing_files_surface_io_errors() {
        let error = TextLoader
            .load(Path::new("/nonexistent/docqa/missing.txt"), "missing.txt")
            .unwrap_err();
        assert!(matches!(error, LoaderError::Io(_)));
    }
}
