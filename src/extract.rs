//! PDF loading: page-level text plus document metadata.
//!
//! Text comes from `pdf-extract`, one string per page. The document Info
//! dictionary (title, author, producer, dates) is read separately with
//! `lopdf` and attached to every page, keys lower-cased. Empty values are
//! kept here; the ingestion pipeline filters them when it builds chunks.

use std::path::Path;

use lopdf::Object;
use serde_json::json;

use crate::error::RagError;
use crate::models::{Metadata, PageDocument};

/// Load a PDF from disk into one [`PageDocument`] per page.
pub fn load_pdf(path: &Path) -> Result<Vec<PageDocument>, RagError> {
    let bytes = std::fs::read(path)
        .map_err(|e| RagError::Load(format!("{}: {}", path.display(), e)))?;
    load_pdf_bytes(&bytes, &path.display().to_string())
}

/// Load PDF bytes; `source` is recorded in every page's metadata.
pub fn load_pdf_bytes(bytes: &[u8], source: &str) -> Result<Vec<PageDocument>, RagError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| RagError::Load(format!("PDF extraction failed: {}", e)))?;

    if pages.is_empty() {
        return Err(RagError::Load("PDF has no pages".to_string()));
    }

    let info = read_document_info(bytes);
    let total_pages = pages.len();

    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(index, text)| {
            let mut metadata = info.clone();
            metadata.insert("source".to_string(), json!(source));
            metadata.insert("total_pages".to_string(), json!(total_pages));
            metadata.insert("page".to_string(), json!(index));
            metadata.insert("page_label".to_string(), json!((index + 1).to_string()));
            PageDocument { text, metadata }
        })
        .collect())
}

/// Read the trailer's Info dictionary. Unreadable or missing info yields
/// an empty map rather than an error.
fn read_document_info(bytes: &[u8]) -> Metadata {
    let mut metadata = Metadata::new();

    let doc = match lopdf::Document::load_mem(bytes) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::debug!("could not read PDF info dictionary: {}", e);
            return metadata;
        }
    };

    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => match doc.get_dictionary(*id) {
            Ok(dict) => dict,
            Err(_) => return metadata,
        },
        Ok(Object::Dictionary(dict)) => dict,
        _ => return metadata,
    };

    for (key, value) in info.iter() {
        let name = String::from_utf8_lossy(key).to_lowercase();
        let value = match value {
            Object::String(raw, _) => json!(decode_pdf_string(raw)),
            Object::Name(raw) => json!(String::from_utf8_lossy(raw)),
            Object::Integer(i) => json!(i),
            Object::Real(r) => json!(r),
            Object::Boolean(b) => json!(b),
            Object::Null => serde_json::Value::Null,
            _ => continue,
        };
        metadata.insert(name, value);
    }

    metadata
}

/// Decode a PDF text string: UTF-16BE when it carries a BOM, otherwise
/// PDFDocEncoding, which matches Latin-1 for printable characters.
fn decode_pdf_string(raw: &[u8]) -> String {
    if let Some(utf16) = raw.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    raw.iter().map(|&b| b as char).collect()
}
