//! Span Locator/Patcher: surface low-confidence OCR spans and write
//! human corrections back into the tree.
//!
//! ## Workflow
//!
//! ```text
//! flatten_low_confidence ──▶ ReviewFile (JSON) ──▶ human edits `correction`
//!                                                        │
//!          tree' ◀── apply_edits ◀── SpanEdit batch ◀────┘
//! ```
//!
//! Spans are located by positional [`SpanAddress`]. Positions are only valid
//! against the tree they were taken from, so every edit may carry the span
//! text it expects to find; an edit whose address now points at different
//! text is rejected instead of corrupting an unrelated span.
//!
//! Deleting a span (blank correction) shifts its siblings. A batch is
//! therefore resolved against the pre-batch tree in full, replacements are
//! written next, and deletions run last in descending address order so no
//! captured address moves before it is used.

use crate::backup::BackupSink;
use crate::config::validate_quality_cutoff;
use crate::error::{AddressResolutionError, LayoutError};
use crate::layout::{BlockContent, BlockType, LayoutTree, Span, SpanAddress};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

// ── Locating ─────────────────────────────────────────────────────────────

/// One low-confidence span queued for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    /// Sequential, in flatten order.
    pub id: usize,
    pub address: SpanAddress,
    /// The page's own `page_idx`, falling back to its position.
    pub page_idx: usize,
    pub score: f64,
    pub block_type: String,
    /// OCR text as found.
    pub content: String,
    /// Pre-filled with `content`; blank means delete.
    pub correction: String,
}

/// Serialised review queue exchanged between `review` and `patch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFile {
    pub quality_cutoff: f64,
    pub items: Vec<ReviewItem>,
}

impl ReviewFile {
    /// One edit per item, guarded by the item's original content.
    pub fn edits(&self) -> Vec<SpanEdit> {
        self.items.iter().map(SpanEdit::from).collect()
    }
}

/// Block types whose spans are offered for review.
fn is_reviewable(block_type: &BlockType) -> bool {
    matches!(
        block_type,
        BlockType::Text
            | BlockType::Title
            | BlockType::List
            | BlockType::Index
            | BlockType::Discarded
    )
}

/// Every reviewable text span scoring strictly below `quality_cutoff`.
///
/// Walks page → block (content, then discarded) → line → span. The order,
/// and so every `id`, is deterministic for a given tree.
///
/// # Errors
/// [`LayoutError::InvalidConfig`] when `quality_cutoff` is outside `0.0..=1.0`.
pub fn flatten_low_confidence(
    tree: &LayoutTree,
    quality_cutoff: f64,
) -> Result<Vec<ReviewItem>, LayoutError> {
    validate_quality_cutoff(quality_cutoff)?;

    let mut items = Vec::new();
    for (p, page) in tree.pages.iter().enumerate() {
        let page_idx = page.page_idx.unwrap_or(p);
        for (b, block) in page.all_blocks().enumerate() {
            if !is_reviewable(&block.block_type) {
                continue;
            }
            for (l, line) in block.lines().iter().enumerate() {
                for (s, span) in line.spans.iter().enumerate() {
                    let score = span.score_or_default();
                    if !span.is_text() || span.content.trim().is_empty() || score >= quality_cutoff
                    {
                        continue;
                    }
                    items.push(ReviewItem {
                        id: items.len(),
                        address: SpanAddress::new(p, b, l, s),
                        page_idx,
                        score,
                        block_type: block.block_type.to_string(),
                        content: span.content.clone(),
                        correction: span.content.clone(),
                    });
                }
            }
        }
    }

    info!(
        spans = items.len(),
        quality_cutoff, "Low-confidence spans located"
    );
    Ok(items)
}

/// Resolve `address` to its span, or say which index failed.
pub fn resolve<'a>(
    tree: &'a LayoutTree,
    address: &SpanAddress,
) -> Result<&'a Span, AddressResolutionError> {
    let address = *address;
    let page = tree
        .pages
        .get(address.page)
        .ok_or(AddressResolutionError::PageOutOfRange {
            address,
            pages: tree.pages.len(),
        })?;
    let block = page
        .block(address.block)
        .ok_or(AddressResolutionError::BlockOutOfRange {
            address,
            blocks: page.block_count(),
        })?;
    if !matches!(block.content, BlockContent::Lines(_)) {
        return Err(AddressResolutionError::LinesUnavailable {
            address,
            block_type: block.block_type.to_string(),
        });
    }
    let line = block
        .lines()
        .get(address.line)
        .ok_or(AddressResolutionError::LineOutOfRange {
            address,
            lines: block.lines().len(),
        })?;
    line.spans
        .get(address.span)
        .ok_or(AddressResolutionError::SpanOutOfRange {
            address,
            spans: line.spans.len(),
        })
}

fn resolve_mut<'a>(tree: &'a mut LayoutTree, address: &SpanAddress) -> Option<&'a mut Vec<Span>> {
    let block = tree.pages.get_mut(address.page)?.block_mut(address.block)?;
    Some(&mut block.lines_mut()?.get_mut(address.line)?.spans)
}

// ── Patching ─────────────────────────────────────────────────────────────

/// A correction to one span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEdit {
    pub address: SpanAddress,
    /// Content the span must still hold for the edit to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    /// New content; blank (after trimming) deletes the span.
    pub replacement: String,
}

impl SpanEdit {
    /// An unguarded edit.
    pub fn new(address: SpanAddress, replacement: impl Into<String>) -> Self {
        Self {
            address,
            expected: None,
            replacement: replacement.into(),
        }
    }

    /// Require the span to still hold `content`.
    pub fn expecting(mut self, content: impl Into<String>) -> Self {
        self.expected = Some(content.into());
        self
    }
}

impl From<&ReviewItem> for SpanEdit {
    fn from(item: &ReviewItem) -> Self {
        SpanEdit::new(item.address, item.correction.clone()).expecting(item.content.clone())
    }
}

/// Outcome of one [`apply_edits`] batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchReport {
    /// Spans whose content was replaced.
    pub applied: usize,
    /// Spans removed by a blank correction.
    pub deleted: usize,
    /// Edits whose replacement matched the current content.
    pub unchanged: usize,
    /// Edits that could not be resolved; the rest of the batch still applied.
    pub rejected: Vec<AddressResolutionError>,
    /// Whether the backup sink was invoked.
    pub backed_up: bool,
}

impl PatchReport {
    /// Spans mutated.
    pub fn changed(&self) -> usize {
        self.applied + self.deleted
    }

    pub fn summary(&self) -> String {
        format!(
            "Applied {} corrections, deleted {} spans, {} unchanged, {} rejected",
            self.applied,
            self.deleted,
            self.unchanged,
            self.rejected.len()
        )
    }
}

/// Apply a batch of span edits to `tree`.
///
/// The batch is validated against the tree as it stands; rejected edits are
/// collected in the report and never abort the batch. If at least one edit
/// will change the tree, `backup` receives the untouched tree first, exactly
/// once.
///
/// # Errors
/// Only a failing backup, in which case the tree is left unmodified.
pub fn apply_edits(
    tree: &mut LayoutTree,
    edits: &[SpanEdit],
    backup: &mut dyn BackupSink,
) -> Result<PatchReport, LayoutError> {
    let mut report = PatchReport::default();
    let mut seen = BTreeSet::new();
    let mut replacements: Vec<(SpanAddress, String)> = Vec::new();
    let mut deletions: Vec<SpanAddress> = Vec::new();

    for edit in edits {
        let address = edit.address;
        if !seen.insert(address) {
            report
                .rejected
                .push(AddressResolutionError::Duplicate { address });
            continue;
        }
        let span = match resolve(tree, &address) {
            Ok(span) => span,
            Err(e) => {
                report.rejected.push(e);
                continue;
            }
        };
        if let Some(expected) = &edit.expected {
            if span.content != *expected {
                report.rejected.push(AddressResolutionError::ContentMismatch {
                    address,
                    expected: expected.clone(),
                    found: span.content.clone(),
                });
                continue;
            }
        }
        // Surrounding whitespace alone never counts as a correction.
        let replacement = edit.replacement.trim();
        if edit.replacement == span.content || replacement == span.content.trim() {
            report.unchanged += 1;
        } else if replacement.is_empty() {
            deletions.push(address);
        } else {
            replacements.push((address, replacement.to_string()));
        }
    }

    for rejected in &report.rejected {
        warn!("Edit rejected: {rejected}");
    }

    if replacements.is_empty() && deletions.is_empty() {
        info!("{}", report.summary());
        return Ok(report);
    }

    backup.store(tree)?;
    report.backed_up = true;

    for (address, replacement) in replacements {
        if let Some(span) = resolve_mut(tree, &address).and_then(|s| s.get_mut(address.span)) {
            debug!(%address, from = %span.content, to = %replacement, "span replaced");
            span.content = replacement;
            report.applied += 1;
        }
    }

    deletions.sort_unstable_by(|a, b| b.cmp(a));
    for address in deletions {
        if let Some(spans) = resolve_mut(tree, &address) {
            if address.span < spans.len() {
                let removed = spans.remove(address.span);
                debug!(%address, content = %removed.content, "span deleted");
                report.deleted += 1;
            }
        }
    }

    info!("{}", report.summary());
    Ok(report)
}
