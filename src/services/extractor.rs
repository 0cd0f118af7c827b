//! Turns an uploaded file into text (or an image descriptor) for the generator.
//!
//! Extraction never fails outright: problems with a file are reported inside
//! the returned text as `Error reading <type>: <message>`, and the pipeline
//! decides what to do with that.

use crate::models::ExtractedContent;
use crate::utils::decode_utf8_lossy;
use calamine::{Data, Reader, open_workbook_auto};
use regex::Regex;
use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

const IMAGE_EXTENSIONS: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".bmp", ".webp"];
const WORD_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
];
const SHEET_MIME_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Image,
    Pdf,
    Word,
    Spreadsheet,
    Text,
}

/// Picks the extraction route from the declared media type, falling back to
/// the file extension.
pub fn detect_format(path: &Path, mime_type: &str) -> DocumentFormat {
    let name = path.to_string_lossy().to_lowercase();
    let has_ext = |exts: &[&str]| exts.iter().any(|ext| name.ends_with(ext));

    if mime_type.starts_with("image/") || has_ext(IMAGE_EXTENSIONS) {
        DocumentFormat::Image
    } else if mime_type == "application/pdf" || has_ext(&[".pdf"]) {
        DocumentFormat::Pdf
    } else if WORD_MIME_TYPES.contains(&mime_type) || has_ext(&[".docx", ".doc"]) {
        DocumentFormat::Word
    } else if SHEET_MIME_TYPES.contains(&mime_type) || has_ext(&[".xlsx", ".xls"]) {
        DocumentFormat::Spreadsheet
    } else {
        DocumentFormat::Text
    }
}

pub fn extract(path: &Path, mime_type: &str) -> ExtractedContent {
    let format = detect_format(path, mime_type);
    debug!(path = %path.display(), mime_type, ?format, "Extracting document content");

    match format {
        DocumentFormat::Image => match describe_image(path) {
            Ok(descriptor) => ExtractedContent::Image(descriptor),
            Err(e) => read_error("image", e),
        },
        DocumentFormat::Pdf => pdf_text(path)
            .map(ExtractedContent::Text)
            .unwrap_or_else(|e| read_error("PDF", e)),
        DocumentFormat::Word => word_text(path)
            .map(ExtractedContent::Text)
            .unwrap_or_else(|e| read_error("Word document", e)),
        DocumentFormat::Spreadsheet => spreadsheet_text(path)
            .map(ExtractedContent::Text)
            .unwrap_or_else(|e| read_error("Excel file", e)),
        DocumentFormat::Text => std::fs::read(path)
            .map(|bytes| ExtractedContent::Text(decode_utf8_lossy(&bytes)))
            .unwrap_or_else(|e| read_error("file", e)),
    }
}

fn read_error(kind: &str, err: impl Display) -> ExtractedContent {
    ExtractedContent::Text(format!("Error reading {}: {}", kind, err))
}

fn describe_image(path: &Path) -> anyhow::Result<String> {
    let reader = image::ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| anyhow::anyhow!("cannot identify image file {}", path.display()))?;
    let (width, height) = reader.into_dimensions()?;
    let format_name = format!("{:?}", format).to_uppercase();
    Ok(format!(
        "[Image file: {}, Size: ({}, {})]",
        format_name, width, height
    ))
}

fn pdf_text(path: &Path) -> anyhow::Result<String> {
    let document = lopdf::Document::load(path)?;
    let mut text = String::new();
    for page_number in document.get_pages().keys() {
        text.push_str(&document.extract_text(&[*page_number])?);
        text.push('\n');
    }
    Ok(text)
}

fn word_text(path: &Path) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(File::open(path)?)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")?
        .read_to_string(&mut xml)?;
    Ok(document_paragraphs(&xml).join("\n"))
}

fn paragraph_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<w:p\b[^>]*?(?:/>|>(.*?)</w:p>)").expect("paragraph pattern is valid")
    })
}

fn run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|<w:(tab|br|cr)\b[^>]*/>")
            .expect("run pattern is valid")
    })
}

/// Paragraph texts of a WordprocessingML body, in document order.
pub fn document_paragraphs(xml: &str) -> Vec<String> {
    paragraph_regex()
        .captures_iter(xml)
        .map(|paragraph| {
            let inner = paragraph.get(1).map_or("", |m| m.as_str());
            let mut text = String::new();
            for run in run_regex().captures_iter(inner) {
                if let Some(t) = run.get(1) {
                    text.push_str(&html_escape::decode_html_entities(t.as_str()));
                } else if let Some(tag) = run.get(2) {
                    text.push(if tag.as_str() == "tab" { '\t' } else { '\n' });
                }
            }
            text
        })
        .collect()
}

fn spreadsheet_text(path: &Path) -> anyhow::Result<String> {
    let mut workbook = open_workbook_auto(path)?;
    let mut text = String::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&sheet_name)?;
        // Ranges begin at the first used cell; pad so columns line up from A.
        let leading = range.start().map_or(0, |(_, col)| col as usize);
        let rows = range.rows().map(|row| {
            std::iter::repeat(String::new())
                .take(leading)
                .chain(row.iter().map(cell_text))
                .collect::<Vec<_>>()
        });
        render_sheet(&mut text, &sheet_name, rows);
    }
    Ok(text)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Appends a sheet header and its non-blank rows, cells joined by `" | "`.
pub fn render_sheet<I>(out: &mut String, sheet_name: &str, rows: I)
where
    I: IntoIterator<Item = Vec<String>>,
{
    out.push_str(&format!("\n=== Sheet: {} ===\n", sheet_name));
    for row in rows {
        let line = row.join(" | ");
        if !line.trim().is_empty() {
            out.push_str(&line);
            out.push('\n');
        }
    }
}
