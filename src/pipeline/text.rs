//! Text extraction and line classification.
//!
//! Blocks hold text as `lines[] → spans[] → content`. Rendering wants one
//! string per visual line, so spans are joined with a single space and line
//! boundaries are kept. Two small heuristics ride along:
//!
//! - **Footnote detection**: a `text` block that starts in the bottom fifth
//!   of the page *and* opens with `<digits><space><letter>` ("1 Literary
//!   scholar…", not "1. Discuss…") is a footnote the OCR service missed.
//! - **Discarded-line classification**: short numeric furniture is a page
//!   number, anything wordier is a footnote/running text.
//!
//! The flow helpers at the bottom decide where vertical whitespace goes when
//! content is reflowed: a spacer for large gaps between blocks, and a shrink
//! factor when a page's spacing would overflow the frame.

use crate::layout::{BBox, Block, Line};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Share of the page height above which a footnote may start.
const FOOTNOTE_ZONE: f64 = 0.80;

/// Digits, whitespace, then a letter in any script.
static RE_FOOTNOTE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s+\p{L}").unwrap());

/// Text of one line: non-empty span contents joined with a space.
pub fn line_text(line: &Line) -> String {
    line.spans
        .iter()
        .map(|s| s.content.as_str())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One string per non-empty direct line of `block`.
pub fn block_text_lines(block: &Block) -> Vec<String> {
    block
        .lines()
        .iter()
        .map(line_text)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Whether `block` looks like a footnote on a page `page_height_px` tall.
///
/// Both signals are required to keep numbered lists out.
pub fn is_footnote_block(block: &Block, page_height_px: f64) -> bool {
    let Some(bbox) = block.bbox else {
        return false;
    };
    if bbox.y0 <= page_height_px * FOOTNOTE_ZONE {
        return false;
    }
    let first = block
        .lines()
        .first()
        .and_then(|l| l.spans.first())
        .map(|s| s.content.as_str())
        .unwrap_or("");
    RE_FOOTNOTE_MARKER.is_match(first)
}

/// Role of a line taken from a discarded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardedRole {
    PageNumber,
    Footnote,
}

/// Classify a discarded line as a page number or footnote text.
pub fn classify_discarded_line(text: &str) -> DiscardedRole {
    let trimmed = text.trim();
    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '-' | '—' | ' ' | '.'))
        .collect();
    let numeric = cleaned.chars().all(|c| c.is_ascii_digit()) || cleaned.chars().count() <= 3;
    if numeric && trimmed.chars().count() < 20 {
        DiscardedRole::PageNumber
    } else {
        DiscardedRole::Footnote
    }
}

// ── Flow helpers ─────────────────────────────────────────────────────────

/// Lower bound for [`spacing_multiplier`].
pub const MIN_SPACING_MULTIPLIER: f64 = 0.4;

/// Whether the vertical gap between two consecutive blocks (pixels) is large
/// enough to carry over into flow layout as a spacer.
pub fn needs_gap_spacer(previous: &BBox, next: &BBox, threshold_px: f64) -> bool {
    next.y0 - previous.y1 > threshold_px
}

/// Factor to scale inter-item spacing by so content plus spacing fits in
/// `available` points.
///
/// `1.0` when it already fits; otherwise the proportional shrink, never
/// below [`MIN_SPACING_MULTIPLIER`].
pub fn spacing_multiplier(content: f64, spacing: f64, available: f64) -> f64 {
    let total = content + spacing;
    if total <= available || total <= 0.0 {
        return 1.0;
    }
    (available / total).max(MIN_SPACING_MULTIPLIER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BBox, BlockType, Span};

    fn span(text: &str) -> Span {
        Span {
            content: text.to_string(),
            ..Default::default()
        }
    }

    fn block_at(y0: f64, first: &str) -> Block {
        Block::with_lines(
            BlockType::Text,
            Some(BBox::new(100.0, y0, 900.0, y0 + 30.0)),
            vec![Line {
                bbox: Some(BBox::new(100.0, y0, 900.0, y0 + 30.0)),
                spans: vec![span(first)],
                ..Default::default()
            }],
        )
    }

    #[test]
    fn joins_spans_and_skips_empty() {
        let line = Line {
            spans: vec![span("Hello"), span(""), span("world")],
            ..Default::default()
        };
        assert_eq!(line_text(&line), "Hello world");
    }

    #[test]
    fn block_lines_drop_empty_lines() {
        let block = Block::with_lines(
            BlockType::Text,
            None,
            vec![
                Line {
                    spans: vec![span("a")],
                    ..Default::default()
                },
                Line::default(),
                Line {
                    spans: vec![span("b")],
                    ..Default::default()
                },
            ],
        );
        assert_eq!(block_text_lines(&block), vec!["a", "b"]);
    }

    #[test]
    fn footnote_needs_position_and_marker() {
        assert!(is_footnote_block(&block_at(1500.0, "1 Литературовед"), 1650.0));
        assert!(is_footnote_block(&block_at(1500.0, "12 Scholar"), 1650.0));
        assert!(!is_footnote_block(&block_at(1500.0, "1. Расскажите"), 1650.0));
        assert!(!is_footnote_block(&block_at(200.0, "1 Scholar"), 1650.0));
    }

    #[test]
    fn gap_spacer_threshold_is_strict() {
        let a = BBox::new(0.0, 0.0, 10.0, 100.0);
        assert!(needs_gap_spacer(&a, &BBox::new(0.0, 131.0, 10.0, 150.0), 30.0));
        assert!(!needs_gap_spacer(&a, &BBox::new(0.0, 130.0, 10.0, 150.0), 30.0));
        // Overlapping blocks never get a spacer.
        assert!(!needs_gap_spacer(&a, &BBox::new(0.0, 90.0, 10.0, 150.0), 30.0));
    }

    #[test]
    fn spacing_multiplier_fits_shrinks_and_floors() {
        assert_eq!(spacing_multiplier(500.0, 100.0, 700.0), 1.0);
        assert!((spacing_multiplier(500.0, 100.0, 540.0) - 0.9).abs() < 1e-9);
        assert_eq!(spacing_multiplier(2000.0, 100.0, 700.0), MIN_SPACING_MULTIPLIER);
    }

    #[test]
    fn discarded_classification() {
        assert_eq!(classify_discarded_line("17"), DiscardedRole::PageNumber);
        assert_eq!(classify_discarded_line("— 17 —"), DiscardedRole::PageNumber);
        assert_eq!(classify_discarded_line("xiv"), DiscardedRole::PageNumber);
        assert_eq!(
            classify_discarded_line("Chapter one: the beginning"),
            DiscardedRole::Footnote
        );
    }
}
