//! Margin/Content-Width Preserver.
//!
//! When content is reflowed onto a new page size, the margin is chosen so the
//! text column keeps the width it had on the scan:
//!
//! ```text
//! content_width_pt = (max_right_px − min_left_px) / dpi · 72
//! margin_pt        = clamp((target_width_pt − content_width_pt) / 2, min, max)
//! ```
//!
//! The result is a single [`FlowFrame`]. Wrap width and page template are
//! both read from it, so the two can never be computed from different
//! margins.

use crate::config::{EngineConfig, MarginBounds};
use crate::error::LayoutError;
use crate::layout::{BBox, LayoutTree};
use crate::pipeline::transform::px_to_pt;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Horizontal extent of all content blocks, in pixels.
///
/// Discarded blocks are excluded: page numbers and running heads sit in the
/// margins being measured.
///
/// # Errors
/// - [`LayoutError::MissingField`] for a content block without a bbox.
/// - [`LayoutError::EmptyDocument`] when there are no content blocks.
pub fn content_envelope(tree: &LayoutTree) -> Result<BBox, LayoutError> {
    let mut envelope: Option<BBox> = None;
    for (p, page) in tree.pages.iter().enumerate() {
        for (b, block) in page.blocks.iter().enumerate() {
            let bbox = block.bbox.ok_or_else(|| LayoutError::MissingField {
                page: p,
                block: b,
                block_type: block.block_type.to_string(),
                field: "bbox",
            })?;
            envelope = Some(envelope.map_or(bbox, |e| e.union(&bbox)));
        }
    }
    envelope.ok_or(LayoutError::EmptyDocument {
        what: "content blocks",
    })
}

/// Margin derivation for one document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginReport {
    pub min_left_px: f64,
    pub max_right_px: f64,
    pub content_width_pt: f64,
    /// Before clamping; may be negative when the content is wider than the target.
    pub unclamped_margin_pt: f64,
    pub margin_pt: f64,
}

/// Margin that keeps `content_width_pt` on a `target_width_pt` page.
pub fn margin_for_width(content_width_pt: f64, target_width_pt: f64, bounds: &MarginBounds) -> (f64, f64) {
    let unclamped = (target_width_pt - content_width_pt) / 2.0;
    (unclamped, bounds.clamp(unclamped))
}

/// Compute the flow margin for `tree` scanned at `dpi`.
///
/// # Errors
/// [`LayoutError::InvalidConfig`] for a non-positive or non-finite `dpi`, or
/// an invalid `config`; otherwise as [`content_envelope`].
pub fn compute_margin(
    tree: &LayoutTree,
    dpi: f64,
    config: &EngineConfig,
) -> Result<MarginReport, LayoutError> {
    if !(dpi.is_finite() && dpi > 0.0) {
        return Err(LayoutError::InvalidConfig(format!(
            "DPI must be a positive number, got {dpi}"
        )));
    }
    config.validate()?;
    let envelope = content_envelope(tree)?;
    let content_width_pt = px_to_pt(envelope.width(), dpi);
    let (unclamped_margin_pt, margin_pt) = margin_for_width(
        content_width_pt,
        config.target_page_width_pt,
        &config.margin_bounds,
    );
    info!(
        content_width_pt,
        unclamped_margin_pt, margin_pt, "Flow margin computed"
    );
    Ok(MarginReport {
        min_left_px: envelope.x0,
        max_right_px: envelope.x1,
        content_width_pt,
        unclamped_margin_pt,
        margin_pt,
    })
}

/// Page template for reflowed output: page size plus one uniform margin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowFrame {
    pub page_width_pt: f64,
    pub page_height_pt: f64,
    pub margin_pt: f64,
}

/// The page template a renderer lays out: a frame inset by the margin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageTemplate {
    pub page_width_pt: f64,
    pub page_height_pt: f64,
    pub left_margin_pt: f64,
    pub right_margin_pt: f64,
    pub top_margin_pt: f64,
    pub bottom_margin_pt: f64,
    pub frame_width_pt: f64,
    pub frame_height_pt: f64,
}

impl FlowFrame {
    pub fn new(config: &EngineConfig, margin: &MarginReport) -> Self {
        Self {
            page_width_pt: config.target_page_width_pt,
            page_height_pt: config.target_page_height_pt,
            margin_pt: margin.margin_pt,
        }
    }

    /// Width available to wrapped text.
    pub fn wrap_width(&self) -> f64 {
        self.page_width_pt - 2.0 * self.margin_pt
    }

    /// Height available to flowed content on one page.
    pub fn content_height(&self) -> f64 {
        self.page_height_pt - 2.0 * self.margin_pt
    }

    pub fn template(&self) -> PageTemplate {
        PageTemplate {
            page_width_pt: self.page_width_pt,
            page_height_pt: self.page_height_pt,
            left_margin_pt: self.margin_pt,
            right_margin_pt: self.margin_pt,
            top_margin_pt: self.margin_pt,
            bottom_margin_pt: self.margin_pt,
            frame_width_pt: self.wrap_width(),
            frame_height_pt: self.content_height(),
        }
    }
}
