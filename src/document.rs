use crate::error::{Error, Result};
use crate::models::Requirement;
use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, info};

/// Extensions accepted for requirement uploads
pub const SUPPORTED_EXTENSIONS: [&str; 5] = ["txt", "md", "pdf", "docx", "doc"];

const DEFAULT_MAX_FILE_SIZE: u64 = 25 * 1024 * 1024;

/// Extracts plain text from uploaded requirement documents
#[derive(Debug, Clone)]
pub struct DocumentParser {
    /// Uploads larger than this are rejected
    max_file_size: u64,
}

impl Default for DocumentParser {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

impl DocumentParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    pub fn extension(filename: &str) -> String {
        Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    pub fn is_supported(filename: &str) -> bool {
        SUPPORTED_EXTENSIONS.contains(&Self::extension(filename).as_str())
    }

    /// Reads and parses a file from disk
    pub async fn parse_file(&self, path: &Path) -> Result<Requirement> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::DocumentParse(format!("not a file: {}", path.display())))?;

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| Error::DocumentParse(format!("cannot read {}: {}", path.display(), e)))?;
        if metadata.len() > self.max_file_size {
            return Err(Error::DocumentParse(format!(
                "{} is {} bytes, larger than the {} byte limit",
                filename,
                metadata.len(),
                self.max_file_size
            )));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::DocumentParse(format!("cannot read {}: {}", path.display(), e)))?;

        self.parse_bytes(&filename, &bytes)
    }

    /// Parses uploaded bytes according to the filename's extension
    pub fn parse_bytes(&self, filename: &str, bytes: &[u8]) -> Result<Requirement> {
        let file_type = Self::extension(filename);
        if bytes.len() as u64 > self.max_file_size {
            return Err(Error::DocumentParse(format!(
                "{} is larger than the {} byte limit",
                filename, self.max_file_size
            )));
        }

        let (content, pages) = match file_type.as_str() {
            "txt" | "md" => (decode_text(bytes), None),
            "pdf" => {
                let (text, pages) = extract_pdf(bytes)?;
                (text, Some(pages))
            }
            "docx" | "doc" => (extract_docx(bytes)?, None),
            other => {
                return Err(Error::DocumentParse(format!(
                    "unsupported file type '{}' ({})",
                    other, filename
                )))
            }
        };

        let content = normalize_whitespace(&content);
        if content.trim().is_empty() {
            return Err(Error::DocumentParse(format!("{} contains no text", filename)));
        }

        let mut requirement = Requirement::new(filename, content, file_type);
        if let Some(pages) = pages {
            requirement = requirement.with_page_count(pages);
        }

        info!(
            "📄 Parsed {} ({} words)",
            requirement.filename, requirement.word_count
        );
        Ok(requirement)
    }
}

/// UTF-8 (BOM stripped), UTF-16 with BOM, then Latin-1
fn decode_text(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }

    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return decode_utf16(rest, u16::from_le_bytes);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return decode_utf16(rest, u16::from_be_bytes);
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            debug!("Input is not UTF-8, decoding as Latin-1");
            bytes.iter().map(|&b| b as char).collect()
        }
    }
}

fn decode_utf16(bytes: &[u8], to_unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| to_unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

fn extract_pdf(bytes: &[u8]) -> Result<(String, usize)> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| Error::DocumentParse(format!("failed to read PDF: {}", e)))?;
    let pages = text.matches('\u{c}').count().max(1);
    Ok((text.replace('\u{c}', "\n\n"), pages))
}

/// Paragraph text from `word/document.xml`; table rows become `cell | cell` lines
fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::DocumentParse(format!("failed to read DOCX as ZIP: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| Error::DocumentParse("invalid DOCX: missing word/document.xml".to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| Error::DocumentParse(format!("failed to read document.xml: {}", e)))?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut buf = Vec::new();

    let mut output: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut in_text = false;
    let mut table_depth = 0usize;
    let mut row_cells: Vec<String> = Vec::new();
    let mut cell_text: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => paragraph.clear(),
                b"tbl" => table_depth += 1,
                b"tr" => row_cells.clear(),
                b"tc" => cell_text.clear(),
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"tab" => paragraph.push('\t'),
                b"br" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim().to_string();
                    if !text.is_empty() {
                        if table_depth > 0 {
                            cell_text.push(text);
                        } else {
                            output.push(text);
                        }
                    }
                    paragraph.clear();
                }
                b"tc" => row_cells.push(cell_text.join(" ")),
                b"tr" => {
                    if row_cells.iter().any(|c| !c.is_empty()) {
                        output.push(row_cells.join(" | "));
                    }
                    row_cells.clear();
                }
                b"tbl" => table_depth = table_depth.saturating_sub(1),
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_text {
                    if let Ok(text) = e.unescape() {
                        paragraph.push_str(&text);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::DocumentParse(format!("DOCX XML parse error: {}", e)));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(output.join("\n\n"))
}

/// Normalizes line endings and collapses runs of blank lines
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(body: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        writer.start_file("word/document.xml", options).unwrap();
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
            body
        );
        writer.write_all(xml.as_bytes()).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_parse_file_reads_from_disk() {
        tokio_test::block_on(async {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("checkout.md");
            std::fs::write(&path, "# Checkout\n\nGuests can pay by card.").unwrap();

            let req = DocumentParser::new().parse_file(&path).await.unwrap();
            assert_eq!(req.filename, "checkout.md");
            assert!(req.content.contains("Guests can pay by card."));

            let missing = DocumentParser::new()
                .parse_file(&dir.path().join("missing.txt"))
                .await;
            assert!(matches!(missing, Err(Error::DocumentParse(_))));
        });
    }

    #[test]
    fn test_parse_txt_utf8_bom() {
        let parser = DocumentParser::new();
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Users can reset passwords.".as_bytes());
        let req = parser.parse_bytes("reqs.txt", &bytes).unwrap();
        assert_eq!(req.content, "Users can reset passwords.");
        assert_eq!(req.file_type, "txt");
        assert_eq!(req.word_count, 4);
    }

    #[test]
    fn test_parse_txt_utf16_and_latin1() {
        let parser = DocumentParser::new();
        let mut utf16 = vec![0xFF, 0xFE];
        for unit in "Login".encode_utf16() {
            utf16.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(parser.parse_bytes("a.txt", &utf16).unwrap().content, "Login");

        let latin1 = [b'c', b'a', b'f', 0xE9];
        assert_eq!(parser.parse_bytes("b.txt", &latin1).unwrap().content, "café");
    }

    #[test]
    fn test_parse_docx_paragraphs_and_tables() {
        let body = concat!(
            "<w:p><w:r><w:t>Login requirements</w:t></w:r></w:p>",
            "<w:tbl><w:tr>",
            "<w:tc><w:p><w:r><w:t>Field</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:p><w:r><w:t>Rule</w:t></w:r></w:p></w:tc>",
            "</w:tr><w:tr>",
            "<w:tc><w:p><w:r><w:t>Password</w:t></w:r></w:p></w:tc>",
            "<w:tc><w:p><w:r><w:t>8 &amp; more chars</w:t></w:r></w:p></w:tc>",
            "</w:tr></w:tbl>"
        );
        let parser = DocumentParser::new();
        let req = parser.parse_bytes("signup.docx", &docx_bytes(body)).unwrap();
        assert_eq!(
            req.content,
            "Login requirements\n\nField | Rule\n\nPassword | 8 & more chars"
        );
    }

    #[test]
    fn test_unsupported_and_empty_documents() {
        let parser = DocumentParser::new();
        assert!(matches!(
            parser.parse_bytes("image.png", b"data"),
            Err(Error::DocumentParse(_))
        ));
        assert!(matches!(
            parser.parse_bytes("empty.txt", b"  \n\n "),
            Err(Error::DocumentParse(_))
        ));
        assert!(matches!(
            parser.parse_bytes("broken.docx", b"not a zip"),
            Err(Error::DocumentParse(_))
        ));
    }

    #[test]
    fn test_size_limit() {
        let parser = DocumentParser::new().with_max_file_size(4);
        assert!(parser.parse_bytes("big.txt", b"hello").is_err());
    }

    #[test]
    fn test_is_supported() {
        assert!(DocumentParser::is_supported("Requirements.PDF"));
        assert!(!DocumentParser::is_supported("notes.rtf"));
    }
}
