//! Text extraction for downloaded regulation documents (PDF, DOCX, plain text).
//!
//! The format is chosen from the file extension, falling back to content
//! sniffing (`%PDF` magic, ZIP header, valid UTF-8). Extracted text is then
//! normalized by [`clean_text`].

use std::io::Read;
use std::path::Path;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Document formats the extractor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
    Text,
}

/// Extraction failure. Callers treat any of these as "unreadable".
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported document format: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Read a file from disk and return its cleaned text.
pub async fn read_document_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let name = path.to_string_lossy().to_string();
    // pdf-extract is CPU-bound; keep it off the async workers.
    tokio::task::spawn_blocking(move || extract_text(&name, &bytes))
        .await
        .map_err(|e| ExtractError::Pdf(e.to_string()))?
}

/// Detect the format of `name` / `bytes` and extract cleaned text.
pub fn extract_text(name: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let raw = match detect_format(name, bytes)? {
        Format::Pdf => extract_pdf(bytes)?,
        Format::Docx => extract_docx(bytes)?,
        Format::Text => String::from_utf8_lossy(bytes).into_owned(),
    };
    Ok(clean_text(&raw))
}

pub fn detect_format(name: &str, bytes: &[u8]) -> Result<Format, ExtractError> {
    let ext = name
        .rsplit_once('.')
        .map(|(_, e)| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => return Ok(Format::Pdf),
        "docx" => return Ok(Format::Docx),
        "txt" | "md" | "text" => return Ok(Format::Text),
        _ => {}
    }

    if bytes.starts_with(b"%PDF") {
        Ok(Format::Pdf)
    } else if bytes.starts_with(b"PK\x03\x04") {
        Ok(Format::Docx)
    } else if std::str::from_utf8(bytes).is_ok() {
        Ok(Format::Text)
    } else {
        Err(ExtractError::Unsupported(name.to_string()))
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Docx("word/document.xml not found".to_string()))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one output line per `<w:p>` paragraph.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                out.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push_str("\n\n"),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

/// Normalize extracted text.
///
/// Lines that hold only a page number are dropped, runs of whitespace inside
/// a line collapse to one space, consecutive lines are joined into a
/// paragraph, and paragraphs are separated by a blank line.
pub fn clean_text(text: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        let page_number = !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit());
        if page_number {
            continue;
        }
        if trimmed.is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        current.push(trimmed.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
    }

    paragraphs.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        writer
            .start_file(
                "word/document.xml",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn clean_text_drops_page_numbers_and_keeps_paragraphs() {
        let raw = "Article 1\n  The insurer   must\ninform the client.\n\n12\n\nArticle 2\n";
        assert_eq!(
            clean_text(raw),
            "Article 1 The insurer must inform the client.\n\nArticle 2"
        );
    }

    #[test]
    fn clean_text_of_blank_input_is_empty() {
        assert_eq!(clean_text("  \n\n 3 \n"), "");
    }

    #[test]
    fn detect_format_by_extension_then_content() {
        assert_eq!(detect_format("a.PDF", b"").unwrap(), Format::Pdf);
        assert_eq!(detect_format("a.docx", b"").unwrap(), Format::Docx);
        assert_eq!(detect_format("temp_x", b"%PDF-1.7").unwrap(), Format::Pdf);
        assert_eq!(detect_format("notes", b"plain words").unwrap(), Format::Text);
        assert!(matches!(
            detect_format("blob", &[0xff, 0xfe, 0x00, 0x81]),
            Err(ExtractError::Unsupported(_))
        ));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text("bad.pdf", b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_text("bad.docx", b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn docx_paragraphs_are_extracted() {
        let bytes = build_docx(&["Code des assurances", "Article L211-1 &amp; suivants"]);
        let text = extract_text("code.docx", &bytes).unwrap();
        assert_eq!(text, "Code des assurances\n\nArticle L211-1 & suivants");
    }

    #[test]
    fn plain_text_is_cleaned() {
        let text = extract_text("notes.txt", b"  Premium   due\n\n\n7\n").unwrap();
        assert_eq!(text, "Premium due");
    }
}
