use crate::error::IngestError;
use crate::models::{ChunkCandidate, PageMarker};
use crate::normalize::PAGE_MARKER_PATTERN;
use regex::Regex;

pub const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy)]
pub struct ChunkerConfig {
    pub chunk_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: 500,
            overlap_tokens: 100,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_tokens == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_tokens must be positive".to_string(),
            ));
        }
        if self.overlap_tokens >= self.chunk_tokens {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap_tokens ({}) must be smaller than chunk_tokens ({})",
                self.overlap_tokens, self.chunk_tokens
            )));
        }
        Ok(())
    }

    pub fn window_chars(&self) -> usize {
        self.chunk_tokens * CHARS_PER_TOKEN
    }

    pub fn stride_chars(&self) -> usize {
        (self.chunk_tokens - self.overlap_tokens) * CHARS_PER_TOKEN
    }
}

/// Position-sorted `[Page N]` markers, offsets counted in characters to match
/// the chunker's windows.
pub fn scan_page_markers(text: &str) -> Result<Vec<PageMarker>, IngestError> {
    let marker_re = Regex::new(PAGE_MARKER_PATTERN)?;

    let mut markers = Vec::new();
    let mut char_offset = 0usize;
    let mut last_byte = 0usize;

    for captures in marker_re.captures_iter(text) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let Ok(page) = captures[1].parse::<u32>() else {
            continue;
        };

        char_offset += text[last_byte..whole.start()].chars().count();
        last_byte = whole.start();
        markers.push(PageMarker {
            page,
            offset: char_offset,
        });
    }

    Ok(markers)
}

/// Slides an overlapping character window across the text, one candidate per
/// non-empty window, attributing each window to a page via the marker pre-scan.
pub fn build_candidates(
    text: &str,
    total_pages: u32,
    config: &ChunkerConfig,
) -> Result<Vec<ChunkCandidate>, IngestError> {
    config.validate()?;

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let markers = scan_page_markers(text)?;
    let chars: Vec<char> = text.chars().collect();
    let window = config.window_chars();
    let stride = config.stride_chars();

    let mut candidates = Vec::new();
    let mut start = 0usize;
    let mut index = 0usize;
    let mut last_page = 1u32;

    while start < chars.len() {
        let end = (start + window).min(chars.len());
        let content: String = chars[start..end].iter().collect();

        if !content.trim().is_empty() {
            // Pages are reported as monotonically non-decreasing even when
            // the source carries out-of-order markers.
            let page = page_for_window(&markers, start, end, total_pages).max(last_page);
            last_page = page;

            candidates.push(ChunkCandidate {
                index,
                text: content,
                char_start: start,
                char_end: end,
                page,
                token_estimate: (end - start).div_ceil(CHARS_PER_TOKEN),
            });
            index += 1;
        }

        if end == chars.len() {
            break;
        }
        start += stride;
    }

    Ok(candidates)
}

/// Nearest marker preceding the window midpoint wins; page 1 before the first
/// marker, the last marker's page past the last one. Best-effort by nature,
/// so the result is clamped into `[1, total_pages]`.
fn page_for_window(markers: &[PageMarker], start: usize, end: usize, total_pages: u32) -> u32 {
    let midpoint = start + (end - start) / 2;
    let page = markers
        .iter()
        .take_while(|marker| marker.offset <= midpoint)
        .last()
        .map(|marker| marker.page)
        .unwrap_or(1);
    page.clamp(1, total_pages.max(1))
}
