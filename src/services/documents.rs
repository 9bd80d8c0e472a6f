use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use thiserror::Error;
use zip::ZipArchive;

const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub(crate) enum DocumentError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
    #[error("Failed to extract PDF text: {0}")]
    Pdf(String),
    #[error("Failed to open DOCX archive: {0}")]
    DocxArchive(#[from] zip::result::ZipError),
    #[error("Failed to read DOCX body: {0}")]
    DocxRead(#[from] std::io::Error),
    #[error("Failed to parse DOCX XML: {0}")]
    DocxXml(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    /// Picks the extractor from the filename extension, case-insensitively.
    pub(crate) fn from_filename(filename: &str) -> Result<Self, DocumentError> {
        let lower = filename.trim().to_ascii_lowercase();
        if lower.ends_with(".pdf") {
            Ok(Self::Pdf)
        } else if lower.ends_with(".docx") {
            Ok(Self::Docx)
        } else {
            Err(DocumentError::UnsupportedType(filename.to_string()))
        }
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
        }
    }
}

/// Blocking; run on the blocking pool from async code.
pub(crate) fn extract_text(kind: DocumentKind, data: &[u8]) -> Result<String, DocumentError> {
    match kind {
        DocumentKind::Pdf => extract_pdf_text(data),
        DocumentKind::Docx => extract_docx_text(data),
    }
}

fn extract_pdf_text(data: &[u8]) -> Result<String, DocumentError> {
    pdf_extract::extract_text_from_mem(data)
        .map(|text| text.trim().to_string())
        .map_err(|err| DocumentError::Pdf(err.to_string()))
}

/// Paragraph text joined by newlines; tabs and line breaks are preserved.
fn extract_docx_text(data: &[u8]) -> Result<String, DocumentError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut xml = String::new();
    archive.by_name(DOCX_BODY_PART)?.read_to_string(&mut xml)?;

    let mut reader = XmlReader::from_str(&xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_text_node = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"w:t" {
                    in_text_node = true;
                }
            }
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:tab" => current.push('\t'),
                b"w:br" | b"w:cr" => current.push('\n'),
                b"w:p" => paragraphs.push(String::new()),
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_text_node {
                    let value =
                        e.unescape().map_err(|err| DocumentError::DocxXml(err.to_string()))?;
                    current.push_str(&value);
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text_node = false,
                b"w:p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => return Err(DocumentError::DocxXml(err.to_string())),
            _ => {}
        }
        buf.clear();
    }

    if !current.is_empty() {
        paragraphs.push(current);
    }

    Ok(paragraphs.join("\n").trim().to_string())
}
