use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::Event;
use thiserror::Error;
use zip::ZipArchive;

/// Wrap width used when rendering HTML to text.
const HTML_TEXT_WIDTH: usize = 100;

/// Main body part of a WordprocessingML package.
const DOCX_BODY_PART: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unsupported document type '{0}' (expected .docx, .txt, .md or .html)")]
    Unsupported(String),
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error("HTML document could not be converted: {0}")]
    Html(String),
    #[error("DOCX document could not be read: {0}")]
    Docx(String),
    #[error("document contains no text")]
    Empty,
}

/// Extracts requirement text from an uploaded document.
///
/// Lines are trimmed and blank lines dropped.
pub fn read_document(file_name: &str, bytes: &[u8]) -> Result<String, DocumentError> {
    let extension = Path::new(file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let raw = match extension.as_str() {
        "" | "txt" | "text" | "md" | "markdown" => String::from_utf8(bytes.to_vec())?,
        "html" | "htm" => html2text::from_read(bytes, HTML_TEXT_WIDTH)
            .map_err(|e| DocumentError::Html(e.to_string()))?,
        "docx" => read_docx(bytes)?,
        other => return Err(DocumentError::Unsupported(other.to_string())),
    };

    let text = normalize(&raw);
    if text.is_empty() {
        return Err(DocumentError::Empty);
    }
    Ok(text)
}

/// Non-blank paragraphs of a `.docx` file, one per line.
fn read_docx(bytes: &[u8]) -> Result<String, DocumentError> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| DocumentError::Docx(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY_PART)
        .map_err(|e| DocumentError::Docx(format!("{}: {}", DOCX_BODY_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| DocumentError::Docx(e.to_string()))?;

    let mut reader = Reader::from_str(&xml);
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" | b"cr" => current.push(' '),
                _ => {}
            },
            Ok(Event::Text(text)) if in_text => {
                let text = text.unescape().map_err(|e| DocumentError::Docx(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DocumentError::Docx(format!(
                    "malformed {} at byte {}: {}",
                    DOCX_BODY_PART,
                    reader.buffer_position(),
                    e
                )));
            }
        }
    }
    Ok(paragraphs.join("\n"))
}

fn normalize(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx(paragraphs: &[&str]) -> Vec<u8> {
        let body: String = paragraphs
            .iter()
            .map(|runs| format!("<w:p><w:pPr><w:jc w:val=\"left\"/></w:pPr>{}</w:p>", runs))
            .collect();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
            body
        );
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("[Content_Types].xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"<Types/>").unwrap();
        writer
            .start_file(DOCX_BODY_PART, zip::write::SimpleFileOptions::default())
            .unwrap();
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_docx_paragraphs_are_joined() {
        let bytes = docx(&[
            "<w:r><w:t>Shop requirements</w:t></w:r>",
            "<w:r><w:t xml:space=\"preserve\">   </w:t></w:r>",
            "",
            "<w:r><w:t>GET /items &amp; filters</w:t></w:r>",
            "<w:r><w:t>Only signed</w:t></w:r><w:r><w:t>-in users</w:t></w:r>",
        ]);
        let text = read_document("SRS.docx", &bytes).unwrap();
        assert_eq!(text, "Shop requirements\nGET /items & filters\nOnly signed-in users");
    }

    #[test]
    fn test_docx_without_body_is_rejected() {
        assert!(matches!(
            read_document("srs.docx", b"PK.."),
            Err(DocumentError::Docx(_))
        ));
        let empty = docx(&[]);
        assert!(matches!(
            read_document("srs.docx", &empty),
            Err(DocumentError::Empty)
        ));
    }

    #[test]
    fn test_plain_text_is_normalized() {
        let text = read_document("srs.md", b"  # Requirements \n\n\n - GET /items  \n").unwrap();
        assert_eq!(text, "# Requirements\n- GET /items");
    }

    #[test]
    fn test_html_is_converted() {
        let html = b"<html><body><h1>Shop</h1><p>Users can list items.</p></body></html>";
        let text = read_document("srs.HTML", html).unwrap();
        assert!(text.contains("Shop"));
        assert!(text.contains("Users can list items."));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            read_document("srs.pdf", b"%PDF"),
            Err(DocumentError::Unsupported(ext)) if ext == "pdf"
        ));
        assert!(matches!(
            read_document("srs.txt", &[0xff, 0xfe]),
            Err(DocumentError::Encoding(_))
        ));
        assert!(matches!(
            read_document("srs.txt", b" \n\t\n"),
            Err(DocumentError::Empty)
        ));
    }
}
