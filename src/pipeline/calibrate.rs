//! Line Calibrator: shrink over-tall lines before rendering.
//!
//! OCR line boxes on dense scans often include ascenders and descenders of
//! the neighbouring lines, so consecutive boxes overlap and a renderer that
//! honours them prints text on top of text. When a block's median line
//! height exceeds the target, every line is shrunk by `target / median` with
//! its top edge held fixed, and the block bbox is rebuilt from the new lines.
//!
//! ```text
//!  before                 after (factor 0.85)
//!  ┌────────┐ y0          ┌────────┐ y0
//!  │ line 0 │             │ line 0 │
//!  │┌───────┴┐ ← overlap  └────────┘ y0 + h·0.85
//!  └┤ line 1 │            ┌────────┐
//!   └────────┘            │ line 1 │ …
//! ```
//!
//! Thresholds are raw scan pixels; they are not normalised by DPI.

use crate::config::CalibrationSettings;
use crate::error::LayoutError;
use crate::layout::{BBox, Block, BlockContent, LayoutTree, Line};
use crate::pipeline::fonts::median;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Per-block outcome of a calibration pass. Derived, never stored in the tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDecision {
    pub page: usize,
    pub block: usize,
    pub block_type: String,
    pub median_line_height_px: f64,
    /// Most negative gap between consecutive lines (`next.y0 − prev.y1`),
    /// `None` for single-line blocks.
    pub max_overlap_px: Option<f64>,
    pub fixed: bool,
    /// Scale applied to line heights; `1.0` when not fixed.
    pub factor: f64,
}

/// Summary of a calibration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub decisions: Vec<CalibrationDecision>,
}

impl CalibrationReport {
    pub fn examined(&self) -> usize {
        self.decisions.len()
    }

    pub fn fixed(&self) -> usize {
        self.decisions.iter().filter(|d| d.fixed).count()
    }
}

/// Most negative vertical gap between consecutive lines with bboxes.
pub fn max_overlap_px(lines: &[Line]) -> Option<f64> {
    let boxes: Vec<&BBox> = lines.iter().filter_map(|l| l.bbox.as_ref()).collect();
    boxes
        .windows(2)
        .map(|w| w[1].y0 - w[0].y1)
        .min_by(f64::total_cmp)
}

/// Decide whether a block's lines need shrinking, without touching them.
///
/// Returns `None` when there is nothing to measure.
pub fn assess(lines: &[Line], settings: &CalibrationSettings) -> Option<(f64, Option<f64>, bool)> {
    let heights: Vec<f64> = lines.iter().filter_map(Line::height).collect();
    let median_px = median(&heights)?;
    let overlap = max_overlap_px(lines);

    let too_tall = median_px > settings.target_line_height_px;
    let gate_open = !settings.overlap_gate_enabled()
        || overlap.is_some_and(|o| o <= settings.overlap_threshold_px);
    Some((median_px, overlap, too_tall && gate_open))
}

/// Scale every line's height by `factor`, keeping its top edge.
///
/// Spans are scaled about their line's top so they stay inside it.
fn shrink_lines(lines: &mut [Line], factor: f64) {
    for line in lines.iter_mut() {
        let Some(bbox) = line.bbox.as_mut() else {
            continue;
        };
        let top = bbox.y0;
        bbox.y1 = top + bbox.height() * factor;
        for span in line.spans.iter_mut() {
            if let Some(sb) = span.bbox.as_mut() {
                sb.y0 = top + (sb.y0 - top) * factor;
                sb.y1 = top + (sb.y1 - top) * factor;
            }
        }
    }
}

/// Calibrate one block in place, returning the decision.
///
/// `page`/`block` only label the decision.
pub fn calibrate_block(
    block: &mut Block,
    page: usize,
    index: usize,
    settings: &CalibrationSettings,
) -> Option<CalibrationDecision> {
    if !block.block_type.is_text_bearing() {
        return None;
    }
    let block_type = block.block_type.to_string();
    let BlockContent::Lines(lines) = &mut block.content else {
        return None;
    };
    let (median_px, overlap, fix) = assess(lines, settings)?;

    let factor = if fix {
        settings.target_line_height_px / median_px
    } else {
        1.0
    };
    if fix {
        shrink_lines(lines, factor);
        if let Some(envelope) = BBox::union_all(lines.iter().filter_map(|l| l.bbox.as_ref())) {
            block.bbox = Some(envelope);
        }
    }

    debug!(
        page,
        block = index,
        block_type = %block_type,
        median_px,
        max_overlap_px = ?overlap,
        fixed = fix,
        factor,
        "calibration decision"
    );
    Some(CalibrationDecision {
        page,
        block: index,
        block_type,
        median_line_height_px: median_px,
        max_overlap_px: overlap,
        fixed: fix,
        factor,
    })
}

/// Run the Line Calibrator over every block of `tree`.
///
/// Blocks that do not trigger are left bit-for-bit unchanged.
///
/// # Errors
/// [`LayoutError::InvalidConfig`] for invalid `settings`; the tree is not
/// touched in that case.
pub fn calibrate(
    tree: &mut LayoutTree,
    settings: &CalibrationSettings,
) -> Result<CalibrationReport, LayoutError> {
    settings.validate()?;

    let mut report = CalibrationReport::default();
    for (p, page) in tree.pages.iter_mut().enumerate() {
        for (b, block) in page.all_blocks_mut().enumerate() {
            if let Some(decision) = calibrate_block(block, p, b, settings) {
                report.decisions.push(decision);
            }
        }
    }

    info!(
        examined = report.examined(),
        fixed = report.fixed(),
        target_px = settings.target_line_height_px,
        overlap_threshold_px = settings.overlap_threshold_px,
        "Line calibration complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{BlockType, Page, Span};

    /// A block with lines of the given heights, each `gap` px below the last.
    fn block(heights: &[f64], gap: f64) -> Block {
        let mut y = 100.0;
        let mut lines = Vec::new();
        for h in heights {
            lines.push(Line {
                bbox: Some(BBox::new(100.0, y, 900.0, y + h)),
                spans: vec![Span {
                    bbox: Some(BBox::new(100.0, y, 500.0, y + h)),
                    content: "word".into(),
                    ..Default::default()
                }],
                ..Default::default()
            });
            y += h + gap;
        }
        let bbox = BBox::union_all(lines.iter().filter_map(|l: &Line| l.bbox.as_ref()));
        Block::with_lines(BlockType::Text, bbox, lines)
    }

    fn tree(blocks: Vec<Block>) -> LayoutTree {
        LayoutTree::new(vec![Page {
            blocks,
            ..Default::default()
        }])
    }

    fn no_gate() -> CalibrationSettings {
        CalibrationSettings {
            target_line_height_px: 34.0,
            overlap_threshold_px: 0.0,
        }
    }

    #[test]
    fn shrinks_with_top_edges_fixed() {
        let mut b = block(&[40.0, 42.0, 38.0], -12.0);
        let before = b.clone();
        let d = calibrate_block(&mut b, 0, 0, &CalibrationSettings::default()).unwrap();
        assert!(d.fixed);
        assert_eq!(d.median_line_height_px, 40.0);
        assert!((d.factor - 0.85).abs() < 1e-12);

        for (old, new) in before.lines().iter().zip(b.lines()) {
            let (o, n) = (old.bbox.unwrap(), new.bbox.unwrap());
            assert_eq!(n.y0, o.y0);
            assert!((n.height() - o.height() * 0.85).abs() < 1e-9);
            // spans stay inside their line
            let s = new.spans[0].bbox.unwrap();
            assert!(s.y0 >= n.y0 && s.y1 <= n.y1 + 1e-9);
        }
    }

    #[test]
    fn block_bbox_is_union_of_lines_after_fix() {
        let mut t = tree(vec![block(&[40.0, 42.0, 38.0], -12.0)]);
        calibrate(&mut t, &CalibrationSettings::default()).unwrap();
        let b = &t.pages[0].blocks[0];
        assert_eq!(b.bbox, b.lines_envelope());
    }

    #[test]
    fn no_trigger_leaves_tree_identical() {
        let mut t = tree(vec![block(&[30.0, 32.0, 31.0], 2.0)]);
        let before = serde_json::to_string(&t).unwrap();
        let report = calibrate(&mut t, &no_gate()).unwrap();
        assert_eq!(report.fixed(), 0);
        assert_eq!(report.examined(), 1);
        assert_eq!(serde_json::to_string(&t).unwrap(), before);
    }

    #[test]
    fn median_equal_to_target_does_not_trigger() {
        let mut t = tree(vec![block(&[34.0, 34.0, 34.0], -20.0)]);
        let report = calibrate(&mut t, &no_gate()).unwrap();
        assert_eq!(report.fixed(), 0);
    }

    #[test]
    fn overlap_gate() {
        let settings = CalibrationSettings::default();
        // gap −5 is not bad enough at threshold −10
        let mut mild = tree(vec![block(&[40.0, 42.0, 38.0], -5.0)]);
        let before = mild.clone();
        let r = calibrate(&mut mild, &settings).unwrap();
        assert_eq!(r.fixed(), 0);
        assert_eq!(r.decisions[0].max_overlap_px, Some(-5.0));
        assert_eq!(mild, before);

        // gap −15 is
        let mut severe = tree(vec![block(&[40.0, 42.0, 38.0], -15.0)]);
        let r = calibrate(&mut severe, &settings).unwrap();
        assert_eq!(r.fixed(), 1);
    }

    #[test]
    fn gate_disabled_fixes_without_overlap() {
        let mut t = tree(vec![block(&[40.0, 42.0, 38.0], 10.0)]);
        assert_eq!(calibrate(&mut t, &no_gate()).unwrap().fixed(), 1);
    }

    #[test]
    fn single_line_block_needs_disabled_gate() {
        let mut gated = tree(vec![block(&[60.0], 0.0)]);
        assert_eq!(
            calibrate(&mut gated, &CalibrationSettings::default()).unwrap().fixed(),
            0
        );
        let mut open = tree(vec![block(&[60.0], 0.0)]);
        assert_eq!(calibrate(&mut open, &no_gate()).unwrap().fixed(), 1);
    }

    #[test]
    fn nested_payload_blocks_skipped() {
        let body = block(&[400.0, 400.0], -50.0);
        let image = Block::with_children(BlockType::Image, body.bbox, vec![body]);
        let mut t = tree(vec![image]);
        let before = t.clone();
        let r = calibrate(&mut t, &no_gate()).unwrap();
        assert_eq!(r.examined(), 0);
        assert_eq!(t, before);
    }

    #[test]
    fn discarded_blocks_are_calibrated_too() {
        let mut t = tree(vec![]);
        let mut d = block(&[50.0, 50.0], -20.0);
        d.block_type = BlockType::Discarded;
        t.pages[0].discarded_blocks.push(d);
        let r = calibrate(&mut t, &CalibrationSettings::default()).unwrap();
        assert_eq!(r.fixed(), 1);
        assert_eq!(r.decisions[0].block, 0);
    }

    #[test]
    fn invalid_settings_rejected_before_mutation() {
        let mut t = tree(vec![block(&[40.0, 42.0, 38.0], -15.0)]);
        let before = t.clone();
        let bad = CalibrationSettings {
            target_line_height_px: -1.0,
            overlap_threshold_px: -10.0,
        };
        assert!(calibrate(&mut t, &bad).is_err());
        assert_eq!(t, before);
    }
}
