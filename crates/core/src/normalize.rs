use crate::error::IngestError;
use regex::Regex;
use std::collections::BTreeSet;

/// Canonical page marker pattern. The chunker's pre-scan uses the same
/// pattern, so anything this module emits is attributable later.
pub const PAGE_MARKER_PATTERN: &str = r"\[Page (\d+)\]";

const BARE_PAGE_LINE_PATTERN: &str = r"^Page (\d+)$";
const MARKER_LINE_PATTERN: &str = r"^\[Page (\d+)\]$";

/// Collapse runs of three or more newlines, trim every line, drop the empty
/// ones. PDF extractors leave ragged gutters behind; chunk windows should not
/// be spent on them.
pub fn clean_whitespace(text: &str) -> String {
    let mut collapsed = String::with_capacity(text.len());
    let mut newline_run = 0usize;

    for ch in text.chars() {
        if ch == '\n' {
            newline_run += 1;
            if newline_run <= 2 {
                collapsed.push(ch);
            }
        } else {
            newline_run = 0;
            collapsed.push(ch);
        }
    }

    collapsed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Guarantees the text carries reliable `[Page N]` markers before chunking.
///
/// Text whose existing markers already cover at least half of `total_pages`
/// passes through with whitespace cleanup only; bare `Page N` lines (a common
/// extraction artifact) are canonicalized into `[Page N]`. Anything sparser is
/// treated as unmarked: the cleaned text is split into `total_pages` roughly
/// equal character segments, each introduced by its own synthesized marker.
///
/// A zero page count or effectively empty text is returned unchanged.
pub fn ensure_page_markers(text: &str, total_pages: u32) -> Result<String, IngestError> {
    if total_pages == 0 || text.trim().is_empty() {
        return Ok(text.to_string());
    }

    let marker_re = Regex::new(PAGE_MARKER_PATTERN)?;
    let bare_line_re = Regex::new(BARE_PAGE_LINE_PATTERN)?;
    let marker_line_re = Regex::new(MARKER_LINE_PATTERN)?;

    let cleaned = clean_whitespace(text);

    let mut covered = BTreeSet::new();
    for captures in marker_re.captures_iter(&cleaned) {
        if let Ok(page) = captures[1].parse::<u32>() {
            covered.insert(page);
        }
    }
    for line in cleaned.lines() {
        if let Some(captures) = bare_line_re.captures(line) {
            if let Ok(page) = captures[1].parse::<u32>() {
                covered.insert(page);
            }
        }
    }

    if covered.len() as u32 * 2 >= total_pages {
        let repaired = cleaned
            .lines()
            .map(|line| match bare_line_re.captures(line) {
                Some(captures) => format!("[Page {}]", &captures[1]),
                None => line.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n");
        return Ok(repaired);
    }

    Ok(synthesize_markers(&cleaned, total_pages, &bare_line_re, &marker_line_re))
}

/// Splits the text into `total_pages` roughly equal character segments and
/// plants a marker line before each. Existing marker-ish lines are stripped
/// first: coverage was too sparse to trust them, and leaving them in would
/// fight the synthesized set.
fn synthesize_markers(
    cleaned: &str,
    total_pages: u32,
    bare_line_re: &Regex,
    marker_line_re: &Regex,
) -> String {
    let body = cleaned
        .lines()
        .filter(|line| !bare_line_re.is_match(line) && !marker_line_re.is_match(line))
        .collect::<Vec<_>>()
        .join("\n");

    let chars: Vec<char> = body.chars().collect();
    let total_pages = total_pages as usize;
    let segment = (chars.len() / total_pages).max(1);

    let mut result = String::with_capacity(body.len() + total_pages * 12);
    for page in 1..=total_pages {
        let start = (page - 1) * segment;
        if start >= chars.len() && page > 1 {
            break;
        }
        let end = if page == total_pages {
            chars.len()
        } else {
            (page * segment).min(chars.len())
        };

        if !result.is_empty() {
            result.push('\n');
        }
        result.push_str(&format!("[Page {page}]\n"));
        result.extend(&chars[start.min(chars.len())..end]);
    }

    result
}
