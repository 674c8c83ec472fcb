//! Font selection from measured block geometry.
//!
//! A block's representative height is the **median** of its line heights:
//! one superscript or stray mark should not drag a whole paragraph's size
//! around the way it would with a mean. The median is converted to points
//! and looked up in the [`FontBucketTable`](crate::config::FontBucketTable).
//!
//! Structural blocks skip measurement entirely: titles and discarded page
//! furniture get fixed sizes so they stay consistent despite scan noise.

use crate::config::EngineConfig;
use crate::error::{LayoutError, StructuralIssue};
use crate::layout::{Block, BlockType};
use crate::pipeline::{text, transform};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Leading as a multiple of the font size.
pub const LEADING_FACTOR: f64 = 1.2;

/// Median of `values`; the mean of the middle pair for even lengths.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Heights of every line of `block` that has a bbox, in pixels.
pub fn line_heights_px(block: &Block) -> Vec<f64> {
    block.all_lines().filter_map(|l| l.height()).collect()
}

/// Why a block got the size it got.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FontSource {
    /// Looked up from the median line height.
    Measured { median_px: f64, median_pt: f64 },
    /// Fixed size for a structural block type.
    Fixed,
    /// Detected footnote.
    Footnote,
    /// No usable geometry; configured fallback.
    Fallback,
}

/// Font decision for one block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontChoice {
    pub size_pt: f64,
    pub leading_pt: f64,
    pub bold: bool,
    #[serde(flatten)]
    pub source: FontSource,
}

impl FontChoice {
    fn new(size_pt: f64, bold: bool, source: FontSource) -> Self {
        Self {
            size_pt,
            leading_pt: size_pt * LEADING_FACTOR,
            bold,
            source,
        }
    }
}

/// Where a block sits, for diagnostics and position-dependent rules.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext {
    pub page: usize,
    pub block: usize,
    pub dpi: f64,
    pub page_height_px: f64,
    /// The block came from the page's discarded section.
    pub discarded: bool,
}

/// Maps blocks to font sizes under one validated configuration.
#[derive(Debug, Clone, Copy)]
pub struct FontMapper<'a> {
    config: &'a EngineConfig,
}

impl<'a> FontMapper<'a> {
    /// Validate the bucket table and sizes, then build a mapper.
    pub fn new(config: &'a EngineConfig) -> Result<Self, LayoutError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Font size for a measured `text` height in points.
    pub fn size_for_height(&self, height_pt: f64) -> f64 {
        self.config.font_buckets.lookup(height_pt)
    }

    /// Choose the font for `block`, or `None` for non-text payloads.
    ///
    /// Blocks that should be measured but have no line geometry fall back to
    /// `fallback_font_pt` and record a [`StructuralIssue`].
    pub fn choose(
        &self,
        block: &Block,
        ctx: BlockContext,
        issues: &mut Vec<StructuralIssue>,
    ) -> Option<FontChoice> {
        let c = self.config;
        let choice = match &block.block_type {
            BlockType::Title => FontChoice::new(c.title_font_pt, true, FontSource::Fixed),
            BlockType::Discarded => FontChoice::new(c.discarded_font_pt, false, FontSource::Fixed),
            t if ctx.discarded && t.is_text_bearing() => {
                FontChoice::new(c.discarded_font_pt, false, FontSource::Fixed)
            }
            BlockType::Text
                if c.footnote_detection && text::is_footnote_block(block, ctx.page_height_px) =>
            {
                FontChoice::new(c.footnote_font_pt, false, FontSource::Footnote)
            }
            t if t.is_measured() => match median(&line_heights_px(block)) {
                Some(median_px) => {
                    let median_pt = transform::px_to_pt(median_px, ctx.dpi);
                    FontChoice::new(
                        self.size_for_height(median_pt),
                        false,
                        FontSource::Measured {
                            median_px,
                            median_pt,
                        },
                    )
                }
                None => {
                    let issue = StructuralIssue {
                        page: ctx.page,
                        block: ctx.block,
                        block_type: block.block_type.to_string(),
                        detail: "no line bboxes to measure; using fallback font size".into(),
                    };
                    warn!("{issue}");
                    issues.push(issue);
                    FontChoice::new(c.fallback_font_pt, false, FontSource::Fallback)
                }
            },
            _ => return None,
        };
        debug!(
            page = ctx.page,
            block = ctx.block,
            block_type = %block.block_type,
            size_pt = choice.size_pt,
            "font chosen"
        );
        Some(choice)
    }
}
