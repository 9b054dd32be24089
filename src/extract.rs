//! Built-in Markdown extraction for common document formats.
//!
//! PDF goes through `pdf-extract`; DOCX, PPTX and XLSX are read straight from
//! their OOXML parts. CSV becomes a Markdown table, JSON and XML a fenced
//! block, HTML is rendered with `html2md`. Formats without a backend here
//! (images, audio, legacy binary Office) return [`ConvertError::Unsupported`]
//! so the batch records a failure for them; use the command converter to
//! cover those.

use std::io::Read;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::convert::Converter;
use crate::error::ConvertError;

/// Maximum sheets to process in an xlsx.
const XLSX_MAX_SHEETS: usize = 100;
/// Maximum rows rendered per sheet (avoids unbounded memory).
const XLSX_MAX_ROWS_PER_SHEET: usize = 100_000;
/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const HANDLED: &[&str] = &[
    "pdf", "docx", "pptx", "xlsx", "csv", "json", "xml", "html", "htm", "md", "txt",
];

type OoxmlArchive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

/// In-process converter for the formats listed above.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinConverter;

impl Converter for BuiltinConverter {
    fn name(&self) -> &str {
        "builtin"
    }

    fn handles(&self, extension: &str) -> bool {
        HANDLED.contains(&extension)
    }

    fn convert(&self, path: &Path) -> Result<String, ConvertError> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        if !self.handles(&ext) {
            return Err(ConvertError::Unsupported(ext));
        }
        let bytes = std::fs::read(path)?;
        extract_markdown(&bytes, &ext)
    }
}

/// Converts `bytes` of the given extension into Markdown.
pub fn extract_markdown(bytes: &[u8], extension: &str) -> Result<String, ConvertError> {
    match extension {
        "pdf" => extract_pdf(bytes),
        "docx" => extract_docx(bytes),
        "pptx" => extract_pptx(bytes),
        "xlsx" => extract_xlsx(bytes),
        "csv" => extract_csv(bytes),
        "json" => extract_json(bytes),
        "xml" => Ok(fenced("xml", as_utf8(bytes)?)),
        "html" | "htm" => Ok(html2md::parse_html(as_utf8(bytes)?).trim().to_string()),
        "md" | "txt" => Ok(as_utf8(bytes)?.to_string()),
        other => Err(ConvertError::Unsupported(other.to_string())),
    }
}

fn as_utf8(bytes: &[u8]) -> Result<&str, ConvertError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    std::str::from_utf8(bytes).map_err(|_| ConvertError::NotUtf8)
}

fn fenced(lang: &str, body: &str) -> String {
    format!("```{}\n{}\n```\n", lang, body.trim_end())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ConvertError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ConvertError::Pdf(e.to_string()))
}

fn open_ooxml(bytes: &[u8]) -> Result<OoxmlArchive<'_>, ConvertError> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| ConvertError::Ooxml(e.to_string()))
}

fn read_zip_entry_bounded(
    archive: &mut OoxmlArchive<'_>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ConvertError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ConvertError::Ooxml(format!("{}: {}", name, e)))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| ConvertError::Ooxml(e.to_string()))?;
    if out.len() as u64 > max_bytes {
        return Err(ConvertError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

/// Part names matching `prefix<N>.xml`, ordered by `N`.
fn numbered_parts(archive: &OoxmlArchive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String, ConvertError> {
    let mut archive = open_ooxml(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml", MAX_XML_ENTRY_BYTES)?;
    let paragraphs = collect_paragraphs(&xml, b"p")?;
    Ok(paragraphs
        .into_iter()
        .map(|p| match p.style {
            Some(level) => format!("{} {}", "#".repeat(level), p.text),
            None => p.text,
        })
        .collect::<Vec<_>>()
        .join("\n\n"))
}

struct Paragraph {
    text: String,
    /// Heading level from a `HeadingN` / `Title` paragraph style.
    style: Option<usize>,
}

/// Collects non-empty `<*:p>` paragraphs, joining their `<*:t>` runs.
fn collect_paragraphs(xml: &[u8], para_tag: &[u8]) -> Result<Vec<Paragraph>, ConvertError> {
    let mut out = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut current: Option<Paragraph> = None;
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                n if n == para_tag => {
                    current = Some(Paragraph {
                        text: String::new(),
                        style: None,
                    })
                }
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"pStyle" {
                    let level = e
                        .attributes()
                        .flatten()
                        .find(|a| a.key.local_name().as_ref() == b"val")
                        .and_then(|a| heading_level(&String::from_utf8_lossy(&a.value)));
                    if let Some(p) = current.as_mut() {
                        p.style = level;
                    }
                } else if e.local_name().as_ref() == b"tab" {
                    if let Some(p) = current.as_mut() {
                        p.text.push('\t');
                    }
                }
            }
            Ok(Event::Text(te)) if in_text => {
                if let Some(p) = current.as_mut() {
                    p.text.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                n if n == para_tag => {
                    if let Some(p) = current.take() {
                        if !p.text.trim().is_empty() {
                            out.push(Paragraph {
                                text: p.text.trim().to_string(),
                                style: p.style,
                            });
                        }
                    }
                }
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConvertError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn heading_level(style: &str) -> Option<usize> {
    let lower = style.to_ascii_lowercase();
    if lower == "title" {
        return Some(1);
    }
    lower
        .strip_prefix("heading")
        .and_then(|n| n.trim().parse::<usize>().ok())
        .map(|n| n.clamp(1, 6))
}

fn extract_pptx(bytes: &[u8]) -> Result<String, ConvertError> {
    let mut archive = open_ooxml(bytes)?;
    let slide_names = numbered_parts(&archive, "ppt/slides/slide");
    let mut sections = Vec::new();
    for (idx, name) in slide_names.iter().enumerate() {
        let xml = read_zip_entry_bounded(&mut archive, name, MAX_XML_ENTRY_BYTES)?;
        let paragraphs = collect_paragraphs(&xml, b"p")?;
        let mut section = format!("## Slide {}", idx + 1);
        for p in paragraphs {
            section.push_str("\n\n");
            section.push_str(&p.text);
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}

fn extract_xlsx(bytes: &[u8]) -> Result<String, ConvertError> {
    let mut archive = open_ooxml(bytes)?;
    let shared_strings = if archive.file_names().any(|n| n == "xl/sharedStrings.xml") {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheet_names = numbered_parts(&archive, "xl/worksheets/sheet");
    let mut sections = Vec::new();
    for (idx, name) in sheet_names.into_iter().take(XLSX_MAX_SHEETS).enumerate() {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name, MAX_XML_ENTRY_BYTES)?;
        let rows = extract_xlsx_rows(&sheet_xml, &shared_strings)?;
        let mut section = format!("## Sheet {}", idx + 1);
        if !rows.is_empty() {
            section.push_str("\n\n");
            section.push_str(&markdown_table(&rows));
        }
        sections.push(section);
    }
    Ok(sections.join("\n\n"))
}

fn read_shared_strings(archive: &mut OoxmlArchive<'_>) -> Result<Vec<String>, ConvertError> {
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml", MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = Reader::from_reader(xml.as_slice());
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConvertError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Reads `<row>`/`<c>` cells into rows of display strings.
///
/// Shared-string cells (`t="s"`) are resolved, inline strings read from
/// `<is><t>`, and everything else is taken verbatim from `<v>`.
fn extract_xlsx_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<Vec<String>>, ConvertError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell_is_shared_str = false;
    let mut in_value = false;
    loop {
        if rows.len() >= XLSX_MAX_ROWS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                    if let Some(r) = row.as_mut() {
                        r.push(String::new());
                    }
                }
                b"v" | b"t" => in_value = true,
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"c" => {
                if let Some(r) = row.as_mut() {
                    r.push(String::new());
                }
            }
            Ok(Event::Text(te)) if in_value => {
                let v = te.unescape().unwrap_or_default();
                let text = if cell_is_shared_str {
                    v.trim()
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| shared_strings.get(i).cloned())
                        .unwrap_or_default()
                } else {
                    v.into_owned()
                };
                if let Some(cell) = row.as_mut().and_then(|r| r.last_mut()) {
                    cell.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => in_value = false,
                b"c" => cell_is_shared_str = false,
                b"row" => {
                    if let Some(r) = row.take() {
                        if r.iter().any(|c| !c.is_empty()) {
                            rows.push(r);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ConvertError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}

fn extract_csv(bytes: &[u8]) -> Result<String, ConvertError> {
    let text = as_utf8(bytes)?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_reader(text.as_bytes());
    let rows = reader
        .records()
        .map(|r| r.map(|rec| rec.iter().map(str::to_string).collect::<Vec<_>>()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConvertError::Csv(e.to_string()))?;
    Ok(markdown_table(&rows))
}

fn extract_json(bytes: &[u8]) -> Result<String, ConvertError> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| ConvertError::Json(e.to_string()))?;
    let pretty = serde_json::to_string_pretty(&value).map_err(|e| ConvertError::Json(e.to_string()))?;
    Ok(fenced("json", &pretty))
}

/// Renders rows as a GitHub-flavored Markdown table; the first row is the header.
fn markdown_table(rows: &[Vec<String>]) -> String {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }
    let render = |row: &[String]| {
        let cells: Vec<String> = (0..width)
            .map(|i| {
                row.get(i)
                    .map(|c| c.replace('|', "\\|").replace(['\r', '\n'], " "))
                    .unwrap_or_default()
            })
            .collect();
        format!("| {} |", cells.join(" | "))
    };
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(render(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(width)));
    for row in &rows[1..] {
        lines.push(render(row));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ooxml(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            for (name, body) in parts {
                zip.start_file(*name, zip::write::SimpleFileOptions::default())
                    .unwrap();
                zip.write_all(body.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn bounded_read_accepts_exactly_the_limit() {
        let bytes = ooxml(&[("five.xml", "12345"), ("six.xml", "123456")]);
        let mut archive = open_ooxml(&bytes).unwrap();
        assert_eq!(read_zip_entry_bounded(&mut archive, "five.xml", 5).unwrap(), b"12345");
        assert!(matches!(
            read_zip_entry_bounded(&mut archive, "six.xml", 5),
            Err(ConvertError::Ooxml(_))
        ));
    }

    #[test]
    fn unsupported_extension_returns_error() {
        let err = extract_markdown(b"foo", "png").unwrap_err();
        assert!(matches!(err, ConvertError::Unsupported(ref e) if *e == "png"));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_markdown(b"not a pdf", "pdf").unwrap_err();
        assert!(matches!(err, ConvertError::Pdf(_)));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = extract_markdown(b"not a zip", "docx").unwrap_err();
        assert!(matches!(err, ConvertError::Ooxml(_)));
    }

    #[test]
    fn docx_paragraphs_and_headings() {
        let xml = r#"<?xml version="1.0"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:pPr><w:pStyle w:val="Heading1"/></w:pPr><w:r><w:t>Title</w:t></w:r></w:p><w:p><w:r><w:t xml:space="preserve">Hello </w:t></w:r><w:r><w:t>world</w:t></w:r></w:p></w:body></w:document>"#;
        let bytes = ooxml(&[("word/document.xml", xml)]);
        assert_eq!(extract_markdown(&bytes, "docx").unwrap(), "# Title\n\nHello world");
    }

    #[test]
    fn docx_without_document_part_fails() {
        let bytes = ooxml(&[("word/other.xml", "<x/>")]);
        assert!(matches!(
            extract_markdown(&bytes, "docx"),
            Err(ConvertError::Ooxml(_))
        ));
    }

    #[test]
    fn pptx_slides_in_numeric_order() {
        let slide = |t: &str| {
            format!(
                r#"<p:sld xmlns:p="p" xmlns:a="a"><p:txBody><a:p><a:r><a:t>{}</a:t></a:r></a:p></p:txBody></p:sld>"#,
                t
            )
        };
        let s10 = slide("ten");
        let s2 = slide("two");
        let bytes = ooxml(&[
            ("ppt/slides/slide10.xml", s10.as_str()),
            ("ppt/slides/slide2.xml", s2.as_str()),
        ]);
        assert_eq!(
            extract_markdown(&bytes, "pptx").unwrap(),
            "## Slide 1\n\ntwo\n\n## Slide 2\n\nten"
        );
    }

    #[test]
    fn xlsx_renders_table_with_shared_strings() {
        let shared = r#"<sst><si><t>name</t></si><si><t>qty</t></si><si><t>apple</t></si></sst>"#;
        let sheet = r#"<worksheet><sheetData><row r="1"><c t="s"><v>0</v></c><c t="s"><v>1</v></c></row><row r="2"><c t="s"><v>2</v></c><c><v>3</v></c></row></sheetData></worksheet>"#;
        let bytes = ooxml(&[
            ("xl/sharedStrings.xml", shared),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        assert_eq!(
            extract_markdown(&bytes, "xlsx").unwrap(),
            "## Sheet 1\n\n| name | qty |\n| --- | --- |\n| apple | 3 |"
        );
    }

    #[test]
    fn csv_becomes_table() {
        let md = extract_markdown(b"a,b\n1,x|y\n2\n", "csv").unwrap();
        assert_eq!(md, "| a | b |\n| --- | --- |\n| 1 | x\\|y |\n| 2 |  |");
    }

    #[test]
    fn json_is_pretty_fenced() {
        let md = extract_markdown(br#"{"k":[1,2]}"#, "json").unwrap();
        assert!(md.starts_with("```json\n{\n"));
        assert!(md.ends_with("\n```\n"));
        assert!(matches!(
            extract_markdown(b"{oops", "json"),
            Err(ConvertError::Json(_))
        ));
    }

    #[test]
    fn html_converted_to_markdown() {
        let md = extract_markdown(b"<h1>Hi</h1><p>there</p>", "html").unwrap();
        assert!(md.contains("Hi"));
        assert!(md.contains("there"));
    }

    #[test]
    fn non_utf8_text_rejected() {
        assert!(matches!(
            extract_markdown(&[0xff, 0xfe, 0x00], "xml"),
            Err(ConvertError::NotUtf8)
        ));
    }

    #[test]
    fn handles_reports_backends() {
        let c = BuiltinConverter;
        assert!(c.handles("docx"));
        assert!(!c.handles("mp3"));
    }
}
