//! Render plans: the stages combined into something a PDF writer can draw.
//!
//! Drawing itself is out of scope. A plan is a serialisable description of
//! what goes where, in rendering space (points, bottom-left origin), in one
//! of two modes:
//!
//! * [`plan_exact`]: every block and line at its transformed position on a
//!   page the size of the original scan, with a font per block. Best when the
//!   scan's layout must be preserved.
//! * [`plan_flow`]: content reflowed line by line onto the target page (A4 by
//!   default) inside a [`FlowFrame`] whose margin keeps the original content
//!   width. Best for reading.
//!
//! Both modes infer the DPI once, from the first page, and convert every
//! page with it.

use crate::config::{EngineConfig, CM_PT};
use crate::error::{LayoutError, StructuralIssue};
use crate::layout::{BBox, Block, BlockType, LayoutTree, Page};
use crate::pipeline::dpi::{self, DpiEstimate};
use crate::pipeline::fonts::{BlockContext, FontChoice, FontMapper};
use crate::pipeline::margin::{self, FlowFrame, MarginReport, PageTemplate};
use crate::pipeline::text::{self, DiscardedRole};
use crate::pipeline::transform::{px_to_pt, PageGeometry, RenderRect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// First `image`-typed span's `image_path`, searching nested sub-blocks too.
pub fn image_path(block: &Block) -> Option<String> {
    block
        .all_lines()
        .flat_map(|l| l.spans.iter())
        .filter(|s| s.kind.as_deref() == Some("image"))
        .find_map(|s| s.extra.get("image_path")?.as_str().map(str::to_string))
}

// ── Exact layout ─────────────────────────────────────────────────────────

/// One line placed at its original position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedLine {
    pub rect: RenderRect,
    pub text: String,
}

/// One block placed at its original position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedBlock {
    /// Address index of the block on its page (content, then discarded).
    pub index: usize,
    pub block_type: String,
    pub discarded: bool,
    pub rect: RenderRect,
    /// `None` for payload blocks (images, tables, equations).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<FontChoice>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<PlacedLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    /// Sub-blocks of a payload block (body, caption).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlacedBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactPage {
    pub page_idx: usize,
    pub geometry: PageGeometry,
    pub blocks: Vec<PlacedBlock>,
}

/// Plan for reproducing each scanned page at its original geometry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExactPlan {
    pub dpi: DpiEstimate,
    pub pages: Vec<ExactPage>,
    /// Blocks that were skipped or degraded.
    pub issues: Vec<StructuralIssue>,
}

fn place_block(
    block: &Block,
    geometry: &PageGeometry,
    mapper: &FontMapper<'_>,
    ctx: BlockContext,
    issues: &mut Vec<StructuralIssue>,
) -> Option<PlacedBlock> {
    let Some(bbox) = block.bbox else {
        let issue = StructuralIssue {
            page: ctx.page,
            block: ctx.block,
            block_type: block.block_type.to_string(),
            detail: "no bbox; block not placed".into(),
        };
        warn!("{issue}");
        issues.push(issue);
        return None;
    };

    if block.type_inferred {
        let issue = StructuralIssue {
            page: ctx.page,
            block: ctx.block,
            block_type: block.block_type.to_string(),
            detail: "no type; placed as text".into(),
        };
        warn!("{issue}");
        issues.push(issue);
    }

    let font = mapper.choose(block, ctx, issues);
    let lines = if font.is_some() {
        block
            .lines()
            .iter()
            .filter_map(|line| {
                let text = text::line_text(line);
                if text.is_empty() {
                    return None;
                }
                // A line without its own box inherits the block's.
                let rect = geometry.rect(line.bbox.as_ref().unwrap_or(&bbox));
                Some(PlacedLine { rect, text })
            })
            .collect()
    } else {
        Vec::new()
    };
    let children = block
        .children()
        .iter()
        .filter_map(|child| place_block(child, geometry, mapper, ctx, issues))
        .collect();
    let image_path = if block.block_type == BlockType::Image {
        image_path(block)
    } else {
        None
    };

    Some(PlacedBlock {
        index: ctx.block,
        block_type: block.block_type.to_string(),
        discarded: ctx.discarded,
        rect: geometry.rect(&bbox),
        font,
        lines,
        image_path,
        children,
    })
}

/// Plan every page at its original size.
///
/// # Errors
/// - Configuration errors from `config` or the first page's size.
/// - [`LayoutError::DegeneratePageSize`] for any page without a usable size.
pub fn plan_exact(tree: &LayoutTree, config: &EngineConfig) -> Result<ExactPlan, LayoutError> {
    let mapper = FontMapper::new(config)?;
    let estimate = dpi::document_dpi(tree)?;
    info!(
        dpi = estimate.dpi,
        paper = estimate.paper.name,
        "Exact layout: DPI inferred"
    );

    let mut issues = Vec::new();
    let mut pages = Vec::with_capacity(tree.pages.len());
    for (p, page) in tree.pages.iter().enumerate() {
        // ── Step 1: page geometry ────────────────────────────────────────
        let geometry = PageGeometry::for_page(page, p, estimate.dpi)?;
        let page_height_px = page.page_size.map_or(f64::INFINITY, |s| s.height);

        // ── Step 2: place blocks in address order ────────────────────────
        let blocks: Vec<PlacedBlock> = page
            .all_blocks()
            .enumerate()
            .filter_map(|(b, block)| {
                let ctx = BlockContext {
                    page: p,
                    block: b,
                    dpi: estimate.dpi,
                    page_height_px,
                    discarded: page.is_discarded_slot(b),
                };
                place_block(block, &geometry, &mapper, ctx, &mut issues)
            })
            .collect();

        debug!(page = p, blocks = blocks.len(), "page planned");
        pages.push(ExactPage {
            page_idx: page.page_idx.unwrap_or(p),
            geometry,
            blocks,
        });
    }

    info!(
        pages = pages.len(),
        issues = issues.len(),
        "Exact layout planned"
    );
    Ok(ExactPlan {
        dpi: estimate,
        pages,
        issues,
    })
}

// ── Flow layout ──────────────────────────────────────────────────────────

/// Spacer inserted for large vertical gaps, and the space around titles.
pub const LARGE_SPACE_PT: f64 = 0.4 * CM_PT;

/// Base space after body lines and images; also the floor for scaled spacing.
pub const SMALL_SPACE_PT: f64 = 0.1 * CM_PT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

/// Paragraph style of a flowed line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowStyle {
    pub font_size_pt: f64,
    pub leading_pt: f64,
    pub bold: bool,
    pub alignment: Alignment,
}

/// Role of a flowed line; decides its style and base spacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineRole {
    Title,
    Text,
    Footnote,
    PageNumber,
}

impl LineRole {
    pub fn style(self) -> FlowStyle {
        match self {
            LineRole::Title => FlowStyle {
                font_size_pt: 12.0,
                leading_pt: 15.0,
                bold: true,
                alignment: Alignment::Center,
            },
            LineRole::Text => FlowStyle {
                font_size_pt: 10.5,
                leading_pt: 12.0,
                bold: false,
                alignment: Alignment::Justify,
            },
            LineRole::Footnote => FlowStyle {
                font_size_pt: 8.0,
                leading_pt: 10.0,
                bold: false,
                alignment: Alignment::Left,
            },
            LineRole::PageNumber => FlowStyle {
                font_size_pt: 8.0,
                leading_pt: 10.0,
                bold: false,
                alignment: Alignment::Right,
            },
        }
    }
}

/// One element of a flowed page, top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum FlowItem {
    Spacer {
        height_pt: f64,
    },
    Line {
        role: LineRole,
        text: String,
        style: FlowStyle,
        space_before_pt: f64,
        space_after_pt: f64,
    },
    Image {
        image_path: Option<String>,
        width_pt: f64,
        height_pt: f64,
        space_after_pt: f64,
    },
}

impl FlowItem {
    fn line(role: LineRole, text: String, space_before_pt: f64, space_after_pt: f64) -> Self {
        FlowItem::Line {
            role,
            text,
            style: role.style(),
            space_before_pt,
            space_after_pt,
        }
    }

    /// Height of the item's own content (one leading per line).
    pub fn content_height(&self) -> f64 {
        match self {
            FlowItem::Spacer { .. } => 0.0,
            FlowItem::Line { style, .. } => style.leading_pt,
            FlowItem::Image { height_pt, .. } => *height_pt,
        }
    }

    /// Whitespace the item contributes.
    pub fn spacing(&self) -> f64 {
        match self {
            FlowItem::Spacer { height_pt } => *height_pt,
            FlowItem::Line {
                space_before_pt,
                space_after_pt,
                ..
            } => space_before_pt + space_after_pt,
            FlowItem::Image { space_after_pt, .. } => *space_after_pt,
        }
    }

    fn scale_spacing(&mut self, multiplier: f64) {
        let scale = |v: &mut f64| {
            if *v > 0.0 {
                *v = (*v * multiplier).max(SMALL_SPACE_PT);
            }
        };
        match self {
            FlowItem::Spacer { height_pt } => scale(height_pt),
            FlowItem::Line {
                space_before_pt,
                space_after_pt,
                ..
            } => {
                scale(space_before_pt);
                scale(space_after_pt);
            }
            FlowItem::Image { space_after_pt, .. } => scale(space_after_pt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowPage {
    pub page_idx: usize,
    pub items: Vec<FlowItem>,
    /// Estimated content height, one leading per line.
    pub content_height_pt: f64,
    /// Whitespace before scaling.
    pub base_spacing_pt: f64,
    /// Applied to every spacing value on the page.
    pub spacing_multiplier: f64,
}

/// Plan for reflowing the document onto the target page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowPlan {
    pub dpi: DpiEstimate,
    pub margin: MarginReport,
    pub frame: FlowFrame,
    pub template: PageTemplate,
    pub pages: Vec<FlowPage>,
}

fn flow_items(page: &Page, dpi: f64, frame: &FlowFrame, config: &EngineConfig) -> Vec<FlowItem> {
    let page_height_px = page.page_size.map_or(f64::INFINITY, |s| s.height);
    let mut items = Vec::new();
    let mut previous: Option<BBox> = None;

    for block in &page.blocks {
        let Some(bbox) = block.bbox else { continue };
        let is_image = block.block_type == BlockType::Image;
        let lines = text::block_text_lines(block);
        if !is_image && lines.is_empty() {
            continue;
        }

        if previous.is_some_and(|prev| text::needs_gap_spacer(&prev, &bbox, config.gap_threshold_px)) {
            items.push(FlowItem::Spacer {
                height_pt: LARGE_SPACE_PT,
            });
        }
        previous = Some(bbox);

        if is_image {
            items.push(FlowItem::Image {
                image_path: image_path(block),
                width_pt: frame.wrap_width(),
                height_pt: px_to_pt(bbox.height(), dpi),
                space_after_pt: SMALL_SPACE_PT,
            });
            continue;
        }

        let last = lines.len() - 1;
        match block.block_type {
            BlockType::Title => {
                for (i, line) in lines.into_iter().enumerate() {
                    let before = if i == 0 { LARGE_SPACE_PT } else { 0.0 };
                    let after = if i == last {
                        LARGE_SPACE_PT
                    } else {
                        SMALL_SPACE_PT
                    };
                    items.push(FlowItem::line(LineRole::Title, line, before, after));
                }
            }
            BlockType::Text
                if config.footnote_detection && text::is_footnote_block(block, page_height_px) =>
            {
                items.extend(
                    lines
                        .into_iter()
                        .map(|l| FlowItem::line(LineRole::Footnote, l, 0.0, 0.0)),
                );
            }
            _ => items.extend(
                lines
                    .into_iter()
                    .map(|l| FlowItem::line(LineRole::Text, l, 0.0, SMALL_SPACE_PT)),
            ),
        }
    }

    // Page furniture goes last, classified line by line.
    for block in &page.discarded_blocks {
        for line in text::block_text_lines(block) {
            let role = match text::classify_discarded_line(&line) {
                DiscardedRole::PageNumber => LineRole::PageNumber,
                DiscardedRole::Footnote => LineRole::Footnote,
            };
            items.push(FlowItem::line(role, line, 0.0, 0.0));
        }
    }
    items
}

/// Plan the document reflowed onto the configured target page.
///
/// # Errors
/// Configuration errors, or [`LayoutError::MissingField`] when a content
/// block lacks the bbox the margin calculation needs.
pub fn plan_flow(tree: &LayoutTree, config: &EngineConfig) -> Result<FlowPlan, LayoutError> {
    config.validate()?;

    // ── Step 1: DPI and the single flow frame ────────────────────────────
    let estimate = dpi::document_dpi(tree)?;
    let margin = margin::compute_margin(tree, estimate.dpi, config)?;
    let frame = FlowFrame::new(config, &margin);

    // ── Step 2: items per page, spacing fitted to the frame ──────────────
    let mut pages = Vec::with_capacity(tree.pages.len());
    for (p, page) in tree.pages.iter().enumerate() {
        let mut items = flow_items(page, estimate.dpi, &frame, config);
        let content_height_pt: f64 = items.iter().map(FlowItem::content_height).sum();
        let base_spacing_pt: f64 = items.iter().map(FlowItem::spacing).sum();
        let multiplier =
            text::spacing_multiplier(content_height_pt, base_spacing_pt, frame.content_height());
        if multiplier < 1.0 {
            info!(
                page = p,
                multiplier, "Spacing reduced to fit content on the page"
            );
            for item in &mut items {
                item.scale_spacing(multiplier);
            }
        }
        pages.push(FlowPage {
            page_idx: page.page_idx.unwrap_or(p),
            items,
            content_height_pt,
            base_spacing_pt,
            spacing_multiplier: multiplier,
        });
    }

    info!(
        pages = pages.len(),
        margin_pt = frame.margin_pt,
        wrap_width_pt = frame.wrap_width(),
        "Flow layout planned"
    );
    Ok(FlowPlan {
        dpi: estimate,
        margin,
        template: frame.template(),
        frame,
        pages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree() -> LayoutTree {
        serde_json::from_value(json!({
            "pdf_info": [{
                "page_idx": 0,
                "page_size": [1275, 1650],
                "preproc_blocks": [
                    {"type": "title", "bbox": [300, 100, 975, 180], "lines": [
                        {"bbox": [300, 100, 975, 140], "spans": [{"content": "PART", "type": "text"}]},
                        {"bbox": [300, 140, 975, 180], "spans": [{"content": "ONE", "type": "text"}]}
                    ]},
                    {"type": "text", "bbox": [150, 200, 1125, 290], "lines": [
                        {"bbox": [150, 200, 1125, 245], "spans": [
                            {"content": "It was", "type": "text"},
                            {"content": "a dark night.", "type": "text"}
                        ]},
                        {"bbox": [150, 245, 1125, 290], "spans": [{"content": "Rain fell.", "type": "text"}]}
                    ]},
                    {"type": "image", "bbox": [150, 400, 1125, 700], "blocks": [
                        {"type": "image_body", "bbox": [150, 400, 1125, 700], "lines": [
                            {"bbox": [150, 400, 1125, 700], "spans": [
                                {"bbox": [150, 400, 1125, 700], "type": "image", "image_path": "fig1.jpg"}
                            ]}
                        ]}
                    ]},
                    {"type": "text", "bbox": [150, 1500, 1125, 1540], "lines": [
                        {"bbox": [150, 1500, 1125, 1540], "spans": [{"content": "1 Translator's note.", "type": "text"}]}
                    ]}
                ],
                "discarded_blocks": [
                    {"type": "discarded", "bbox": [620, 1600, 660, 1630], "lines": [
                        {"bbox": [620, 1600, 660, 1630], "spans": [{"content": "17", "type": "text"}]}
                    ]}
                ]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn image_path_from_nested_body() {
        let t = tree();
        assert_eq!(image_path(&t.pages[0].blocks[2]).as_deref(), Some("fig1.jpg"));
        assert_eq!(image_path(&t.pages[0].blocks[1]), None);
    }

    #[test]
    fn exact_plan_places_blocks_with_fonts() {
        let plan = plan_exact(&tree(), &EngineConfig::default()).unwrap();
        assert!((plan.dpi.dpi - 150.0).abs() < 0.01);
        let page = &plan.pages[0];
        assert!((page.geometry.height_pt - 792.0).abs() < 0.01);
        assert_eq!(page.blocks.len(), 5);

        let title = &page.blocks[0];
        assert_eq!(title.font.unwrap().size_pt, 12.0);
        assert!(title.font.unwrap().bold);
        assert_eq!(title.lines.len(), 2);
        // top of the page maps to the top of rendering space
        assert!((title.rect.top() - (792.0 - 48.0)).abs() < 0.01);

        let body = &page.blocks[1];
        assert_eq!(body.lines[0].text, "It was a dark night.");
        // median 45px at 150 DPI = 21.6pt → 10pt
        assert_eq!(body.font.unwrap().size_pt, 10.0);

        let image = &page.blocks[2];
        assert!(image.font.is_none());
        assert_eq!(image.image_path.as_deref(), Some("fig1.jpg"));
        assert_eq!(image.children.len(), 1);

        let folio = &page.blocks[4];
        assert!(folio.discarded);
        assert_eq!(folio.font.unwrap().size_pt, 8.0);
        assert!(plan.issues.is_empty());
    }

    #[test]
    fn exact_plan_reports_blocks_without_bbox() {
        let mut t = tree();
        t.pages[0].blocks[1].bbox = None;
        let plan = plan_exact(&t, &EngineConfig::default()).unwrap();
        assert_eq!(plan.pages[0].blocks.len(), 4);
        assert_eq!(plan.issues.len(), 1);
        assert_eq!((plan.issues[0].page, plan.issues[0].block), (0, 1));
    }

    #[test]
    fn exact_plan_reports_untyped_blocks_but_places_them() {
        let mut t = tree();
        t.pages[0].blocks[1].type_inferred = true;
        let plan = plan_exact(&t, &EngineConfig::default()).unwrap();
        assert_eq!(plan.pages[0].blocks.len(), 5);
        assert_eq!(plan.pages[0].blocks[1].lines.len(), 2);
        assert_eq!(plan.issues.len(), 1);
        assert_eq!((plan.issues[0].page, plan.issues[0].block), (0, 1));
        assert!(plan.issues[0].detail.contains("no type"));
    }

    #[test]
    fn exact_plan_needs_page_size() {
        let mut t = tree();
        t.pages.push(Page::default());
        assert!(matches!(
            plan_exact(&t, &EngineConfig::default()),
            Err(LayoutError::DegeneratePageSize { page: 1, .. })
        ));
    }

    fn lines(page: &FlowPage) -> Vec<(LineRole, &str)> {
        page.items
            .iter()
            .filter_map(|i| match i {
                FlowItem::Line { role, text, .. } => Some((*role, text.as_str())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn flow_plan_items_and_classification() {
        let plan = plan_flow(&tree(), &EngineConfig::default()).unwrap();
        let page = &plan.pages[0];
        assert_eq!(
            lines(page),
            vec![
                (LineRole::Title, "PART"),
                (LineRole::Title, "ONE"),
                (LineRole::Text, "It was a dark night."),
                (LineRole::Text, "Rain fell."),
                (LineRole::Text, "1 Translator's note."),
                (LineRole::PageNumber, "17"),
            ]
        );
        // 110px gap before the image and 800px before the last block.
        let spacers = page
            .items
            .iter()
            .filter(|i| matches!(i, FlowItem::Spacer { .. }))
            .count();
        assert_eq!(spacers, 2);

        let image = page
            .items
            .iter()
            .find_map(|i| match i {
                FlowItem::Image {
                    image_path,
                    width_pt,
                    height_pt,
                    ..
                } => Some((image_path.clone(), *width_pt, *height_pt)),
                _ => None,
            })
            .unwrap();
        assert_eq!(image.0.as_deref(), Some("fig1.jpg"));
        assert_eq!(image.1, plan.frame.wrap_width());
        assert!((image.2 - 144.0).abs() < 1e-9);
    }

    #[test]
    fn flow_plan_title_spacing() {
        let plan = plan_flow(&tree(), &EngineConfig::default()).unwrap();
        let titles: Vec<(f64, f64)> = plan.pages[0]
            .items
            .iter()
            .filter_map(|i| match i {
                FlowItem::Line {
                    role: LineRole::Title,
                    space_before_pt,
                    space_after_pt,
                    ..
                } => Some((*space_before_pt, *space_after_pt)),
                _ => None,
            })
            .collect();
        assert_eq!(titles, vec![(LARGE_SPACE_PT, SMALL_SPACE_PT), (0.0, LARGE_SPACE_PT)]);
        assert_eq!(plan.pages[0].spacing_multiplier, 1.0);
    }

    #[test]
    fn flow_plan_footnote_detection() {
        let config = EngineConfig::builder().footnote_detection(true).build().unwrap();
        let plan = plan_flow(&tree(), &config).unwrap();
        assert!(lines(&plan.pages[0]).contains(&(LineRole::Footnote, "1 Translator's note.")));
    }

    #[test]
    fn flow_frame_shared_by_wrap_width_and_template() {
        let plan = plan_flow(&tree(), &EngineConfig::default()).unwrap();
        assert_eq!(plan.template.left_margin_pt, plan.margin.margin_pt);
        assert_eq!(plan.template.frame_width_pt, plan.frame.wrap_width());
        // 975px of content at 150 DPI = 468pt on a 595.28pt page
        assert!((plan.margin.content_width_pt - 468.0).abs() < 1e-9);
        assert!((plan.margin.unclamped_margin_pt - 63.6378).abs() < 1e-3);
        assert_eq!(plan.margin.margin_pt, plan.margin.unclamped_margin_pt.min(2.0 * CM_PT));
    }

    #[test]
    fn overfull_page_spacing_scaled_with_floor() {
        let mut t = tree();
        let filler: Vec<Block> = (0..80)
            .map(|i| {
                let y = 2000.0 + i as f64 * 100.0;
                serde_json::from_value(json!({
                    "type": "text",
                    "bbox": [150, y, 1125, y + 40.0],
                    "lines": [{"bbox": [150, y, 1125, y + 40.0], "spans": [{"content": "line", "type": "text"}]}]
                }))
                .unwrap()
            })
            .collect();
        t.pages[0].blocks.extend(filler);
        let plan = plan_flow(&t, &EngineConfig::default()).unwrap();
        let page = &plan.pages[0];
        assert!(page.spacing_multiplier < 1.0);
        assert!(page.spacing_multiplier >= text::MIN_SPACING_MULTIPLIER);
        for item in &page.items {
            if let FlowItem::Spacer { height_pt } = item {
                assert!(*height_pt >= SMALL_SPACE_PT - 1e-12);
                assert!(*height_pt <= LARGE_SPACE_PT);
            }
        }
    }

    #[test]
    fn plans_serialise() {
        let plan = plan_flow(&tree(), &EngineConfig::default()).unwrap();
        let v = serde_json::to_value(&plan).unwrap();
        assert_eq!(v["pages"][0]["items"][0]["item"], "line");
        assert_eq!(v["pages"][0]["items"][0]["role"], "title");
    }
}
