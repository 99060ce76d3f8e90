use std::io::{Cursor, Read};
use std::path::Path;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tracing::warn;

use crate::pipeline::types::ResumeUpload;

/// Turns an uploaded resume into plain text.
///
/// Extraction never fails the intake: an unsupported or unreadable file
/// yields empty text.
#[async_trait]
pub trait ResumeExtractor: Send + Sync {
    async fn extract(&self, upload: &ResumeUpload) -> String;
}

/// Extracts PDF, DOCX and plain-text uploads by file extension.
#[derive(Debug, Default)]
pub struct FileResumeExtractor;

#[async_trait]
impl ResumeExtractor for FileResumeExtractor {
    async fn extract(&self, upload: &ResumeUpload) -> String {
        let ext = Path::new(&upload.filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let bytes = upload.bytes.clone();
        let result = match ext.as_str() {
            "pdf" => tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
                .await
                .unwrap_or_else(|e| Err(anyhow::anyhow!("PDF extraction task failed: {}", e))),
            "docx" => extract_docx_text(&bytes),
            "txt" | "md" | "text" => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            other => {
                warn!(filename = %upload.filename, "Unsupported resume file type '{}'", other);
                return String::new();
            }
        };

        match result {
            Ok(text) => {
                if text.trim().is_empty() {
                    warn!(filename = %upload.filename, "No text extracted from resume");
                }
                text
            }
            Err(e) => {
                warn!(filename = %upload.filename, "Failed to extract resume text: {:#}", e);
                String::new()
            }
        }
    }
}

pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| anyhow::anyhow!("Failed to extract PDF text: {}", e))
}

/// Paragraph text of a DOCX document, one paragraph per line.
pub fn extract_docx_text(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).context("Failed to read DOCX archive")?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .context("DOCX has no word/document.xml")?
        .read_to_string(&mut xml)
        .context("Failed to read word/document.xml")?;
    Ok(docx_paragraphs(&xml).join("\n"))
}

fn docx_paragraphs(xml: &str) -> Vec<String> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut in_paragraph = false;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"w:p" => {
                    in_paragraph = true;
                    current.clear();
                }
                b"w:t" => in_text = true,
                b"w:tab" if in_paragraph => current.push('\t'),
                b"w:br" if in_paragraph => current.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(String::new()),
                b"w:tab" if in_paragraph => current.push('\t'),
                b"w:br" if in_paragraph => current.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_text {
                    current.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Ok(Event::GeneralRef(ref e)) => {
                if in_text {
                    let resolved = match &**e {
                        b"amp" => Some('&'),
                        b"lt" => Some('<'),
                        b"gt" => Some('>'),
                        b"quot" => Some('"'),
                        b"apos" => Some('\''),
                        _ => e.resolve_char_ref().ok().flatten(),
                    };
                    if let Some(c) = resolved {
                        current.push(c);
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => {
                    in_paragraph = false;
                    paragraphs.push(std::mem::take(&mut current));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docx_paragraph_text() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Ada Lovelace</w:t></w:r></w:p>
            <w:p/>
            <w:p><w:r><w:t>Python</w:t></w:r><w:r><w:tab/><w:t xml:space="preserve"> &amp; Rust</w:t></w:r></w:p>
        </w:body></w:document>"#;
        assert_eq!(docx_paragraphs(xml), vec!["Ada Lovelace", "", "Python\t & Rust"]);
    }
}
