use anyhow::{bail, Context, Result};
use doc_chat_core::SourceText;
use lopdf::Document as PdfDocument;
use std::fs;
use std::path::Path;

/// Turns a source file into text plus a page count. PDFs get one canonical
/// `[Page N]` line per extracted page, so downstream attribution works from
/// real page boundaries; plain text passes through and leans on marker
/// synthesis instead.
pub fn load_source(path: &Path, pages_hint: Option<u32>) -> Result<SourceText> {
    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    if is_pdf {
        return extract_pdf(path);
    }

    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(SourceText {
        text,
        total_pages: pages_hint.unwrap_or(1),
    })
}

fn extract_pdf(path: &Path) -> Result<SourceText> {
    let document =
        PdfDocument::load(path).with_context(|| format!("parsing {}", path.display()))?;

    let pages = document.get_pages();
    let total_pages = pages.len() as u32;

    let mut text = String::new();
    for (page_no, _object_id) in pages {
        let page_text = document
            .extract_text(&[page_no])
            .with_context(|| format!("extracting page {page_no} of {}", path.display()))?;

        if page_text.trim().is_empty() {
            continue;
        }
        text.push_str(&format!("[Page {page_no}]\n"));
        text.push_str(page_text.trim());
        text.push('\n');
    }

    if text.trim().is_empty() {
        bail!("no readable text in {}", path.display());
    }

    Ok(SourceText { text, total_pages })
}
