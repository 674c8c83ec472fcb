//! The layout tree: the OCR service's `layout.json` as typed Rust values.
//!
//! The OCR service describes every scanned page in **pixel** space with a
//! top-left origin (y grows downward):
//!
//! ```text
//! LayoutTree ─ pdf_info[] ─ Page ─ preproc_blocks[] ─ Block ─ lines[] ─ Line ─ spans[] ─ Span
//!                                 └ discarded_blocks[] ┘      └ blocks[] ─ Block (one level, images/tables)
//! ```
//!
//! Blocks come in two shapes: text-like blocks carry `lines` directly, while
//! payload blocks (images, tables) wrap their body and caption in a nested
//! `blocks` array. [`BlockContent`] models that as a tagged union so callers
//! ask a block for its lines instead of probing both JSON shapes.
//!
//! Fields the engine does not interpret (`image_path`, `index`, `para_blocks`,
//! …) are kept in `extra` maps so a load → mutate → save cycle preserves them.

use crate::error::LayoutError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::io::Write;
use std::path::Path;

// ── Geometry ─────────────────────────────────────────────────────────────

/// Axis-aligned bounding box `(x0, y0, x1, y1)`.
///
/// Serialised as a 4-element array, matching `layout.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct BBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl BBox {
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Union of every box in `boxes`, or `None` for an empty iterator.
    pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a BBox>) -> Option<BBox> {
        boxes
            .into_iter()
            .fold(None, |acc: Option<BBox>, b| Some(acc.map_or(*b, |a| a.union(b))))
    }
}

impl From<[f64; 4]> for BBox {
    fn from(v: [f64; 4]) -> Self {
        BBox::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f64; 4] {
    fn from(b: BBox) -> Self {
        [b.x0, b.y0, b.x1, b.y1]
    }
}

/// Page size in pixels, serialised as `[width, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl From<[f64; 2]> for PageSize {
    fn from(v: [f64; 2]) -> Self {
        PageSize::new(v[0], v[1])
    }
}

impl From<PageSize> for [f64; 2] {
    fn from(s: PageSize) -> Self {
        [s.width, s.height]
    }
}

// ── Block type ───────────────────────────────────────────────────────────

/// Block category as tagged by the OCR service.
///
/// Unknown tags round-trip through [`BlockType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BlockType {
    Title,
    #[default]
    Text,
    List,
    Index,
    Image,
    ImageBody,
    ImageCaption,
    Table,
    TableBody,
    TableCaption,
    InterlineEquation,
    Discarded,
    Other(String),
}

impl BlockType {
    pub fn as_str(&self) -> &str {
        match self {
            BlockType::Title => "title",
            BlockType::Text => "text",
            BlockType::List => "list",
            BlockType::Index => "index",
            BlockType::Image => "image",
            BlockType::ImageBody => "image_body",
            BlockType::ImageCaption => "image_caption",
            BlockType::Table => "table",
            BlockType::TableBody => "table_body",
            BlockType::TableCaption => "table_caption",
            BlockType::InterlineEquation => "interline_equation",
            BlockType::Discarded => "discarded",
            BlockType::Other(s) => s,
        }
    }

    /// Blocks whose lines hold running text that can be reviewed, calibrated
    /// and typeset. Unknown tags are assumed to be text.
    pub fn is_text_bearing(&self) -> bool {
        matches!(
            self,
            BlockType::Title
                | BlockType::Text
                | BlockType::List
                | BlockType::Index
                | BlockType::Discarded
                | BlockType::ImageCaption
                | BlockType::TableCaption
                | BlockType::Other(_)
        )
    }

    /// Blocks whose font size is measured from line geometry rather than fixed.
    pub fn is_measured(&self) -> bool {
        matches!(
            self,
            BlockType::Text
                | BlockType::List
                | BlockType::Index
                | BlockType::ImageCaption
                | BlockType::TableCaption
                | BlockType::Other(_)
        )
    }
}

impl From<String> for BlockType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "title" => BlockType::Title,
            "text" => BlockType::Text,
            "list" => BlockType::List,
            "index" => BlockType::Index,
            "image" => BlockType::Image,
            "image_body" => BlockType::ImageBody,
            "image_caption" => BlockType::ImageCaption,
            "table" => BlockType::Table,
            "table_body" => BlockType::TableBody,
            "table_caption" => BlockType::TableCaption,
            "interline_equation" => BlockType::InterlineEquation,
            "discarded" => BlockType::Discarded,
            _ => BlockType::Other(s),
        }
    }
}

impl From<BlockType> for String {
    fn from(t: BlockType) -> Self {
        match t {
            BlockType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tree nodes ───────────────────────────────────────────────────────────

/// Smallest OCR unit: a run of text (or an inline payload) with a confidence.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Span {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,

    #[serde(default, alias = "text", skip_serializing_if = "String::is_empty")]
    pub content: String,

    /// OCR confidence in `0.0..=1.0`; absent means fully trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    /// Span kind (`text`, `inline_equation`, `image`, …).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Span {
    pub fn score_or_default(&self) -> f64 {
        self.score.unwrap_or(1.0)
    }

    /// True for plain-text spans; a missing `type` counts as text.
    pub fn is_text(&self) -> bool {
        self.kind.as_deref().is_none_or(|k| k == "text")
    }
}

/// One visual line of a block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Line {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BBox>,

    #[serde(default)]
    pub spans: Vec<Span>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Line {
    pub fn height(&self) -> Option<f64> {
        self.bbox.map(|b| b.height())
    }
}

/// The payload of a block: lines, one level of sub-blocks, or nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockContent {
    Lines(Vec<Line>),
    Nested(Vec<Block>),
    Empty,
}

/// A layout block: a titled region, a paragraph, an image, …
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawBlock", into = "RawBlock")]
pub struct Block {
    pub block_type: BlockType,
    /// The source carried no `type`; the block is read as text and written
    /// back without one.
    pub type_inferred: bool,
    pub bbox: Option<BBox>,
    pub content: BlockContent,
    pub extra: Map<String, Value>,
}

impl Block {
    /// A text-like block holding `lines` directly.
    pub fn with_lines(block_type: BlockType, bbox: Option<BBox>, lines: Vec<Line>) -> Self {
        Self {
            block_type,
            type_inferred: false,
            bbox,
            content: BlockContent::Lines(lines),
            extra: Map::new(),
        }
    }

    /// A payload block wrapping nested sub-blocks.
    pub fn with_children(block_type: BlockType, bbox: Option<BBox>, children: Vec<Block>) -> Self {
        Self {
            block_type,
            type_inferred: false,
            bbox,
            content: BlockContent::Nested(children),
            extra: Map::new(),
        }
    }

    /// Lines held directly by this block (empty for nested/empty blocks).
    pub fn lines(&self) -> &[Line] {
        match &self.content {
            BlockContent::Lines(lines) => lines,
            _ => &[],
        }
    }

    /// Mutable access to directly held lines, `None` for other shapes.
    pub fn lines_mut(&mut self) -> Option<&mut Vec<Line>> {
        match &mut self.content {
            BlockContent::Lines(lines) => Some(lines),
            _ => None,
        }
    }

    /// Direct lines, or the lines of every nested sub-block.
    pub fn all_lines(&self) -> impl Iterator<Item = &Line> + '_ {
        let (flat, nested): (&[Line], &[Block]) = match &self.content {
            BlockContent::Lines(lines) => (lines, &[]),
            BlockContent::Nested(children) => (&[], children),
            BlockContent::Empty => (&[], &[]),
        };
        flat.iter()
            .chain(nested.iter().flat_map(|child| child.lines().iter()))
    }

    /// Sub-blocks for nested payload blocks.
    pub fn children(&self) -> &[Block] {
        match &self.content {
            BlockContent::Nested(children) => children,
            _ => &[],
        }
    }

    /// Union of this block's direct line boxes.
    pub fn lines_envelope(&self) -> Option<BBox> {
        BBox::union_all(self.lines().iter().filter_map(|l| l.bbox.as_ref()))
    }
}

/// Wire shape of a block, used only for (de)serialisation.
#[derive(Serialize, Deserialize)]
struct RawBlock {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    block_type: Option<BlockType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bbox: Option<BBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    lines: Option<Vec<Line>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    blocks: Option<Vec<Block>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawBlock> for Block {
    fn from(raw: RawBlock) -> Self {
        let mut extra = raw.extra;
        let content = match (raw.lines, raw.blocks) {
            (lines, Some(children)) if !children.is_empty() => {
                // A nested block that also carries a `lines` array keeps it verbatim.
                if let Some(v) = lines.and_then(|l| serde_json::to_value(l).ok()) {
                    extra.insert("lines".to_string(), v);
                }
                BlockContent::Nested(children)
            }
            (Some(lines), _) => BlockContent::Lines(lines),
            (None, Some(_)) => BlockContent::Nested(Vec::new()),
            (None, None) => BlockContent::Empty,
        };
        Block {
            type_inferred: raw.block_type.is_none(),
            block_type: raw.block_type.unwrap_or_default(),
            bbox: raw.bbox,
            content,
            extra,
        }
    }
}

impl From<Block> for RawBlock {
    fn from(block: Block) -> Self {
        let mut extra = block.extra;
        let (lines, blocks) = match block.content {
            BlockContent::Lines(lines) => (Some(lines), None),
            BlockContent::Nested(children) => {
                let lines = extra
                    .remove("lines")
                    .and_then(|v| serde_json::from_value(v).ok());
                (lines, Some(children))
            }
            BlockContent::Empty => (None, None),
        };
        RawBlock {
            block_type: (!block.type_inferred).then_some(block.block_type),
            bbox: block.bbox,
            lines,
            blocks,
            extra,
        }
    }
}

/// One scanned page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_idx: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<PageSize>,

    /// Content blocks in reading order.
    #[serde(default, rename = "preproc_blocks", alias = "blocks")]
    pub blocks: Vec<Block>,

    /// Page furniture the OCR service set aside (page numbers, running heads).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded_blocks: Vec<Block>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Page {
    /// Number of addressable blocks: content blocks, then discarded blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len() + self.discarded_blocks.len()
    }

    /// Block at address index `i` (content blocks first, then discarded).
    pub fn block(&self, i: usize) -> Option<&Block> {
        if i < self.blocks.len() {
            self.blocks.get(i)
        } else {
            self.discarded_blocks.get(i - self.blocks.len())
        }
    }

    pub fn block_mut(&mut self, i: usize) -> Option<&mut Block> {
        let content = self.blocks.len();
        if i < content {
            self.blocks.get_mut(i)
        } else {
            self.discarded_blocks.get_mut(i - content)
        }
    }

    /// True when address index `i` falls in the discarded section.
    pub fn is_discarded_slot(&self, i: usize) -> bool {
        i >= self.blocks.len()
    }

    /// Every block in address order.
    pub fn all_blocks(&self) -> impl Iterator<Item = &Block> + '_ {
        self.blocks.iter().chain(self.discarded_blocks.iter())
    }

    pub fn all_blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> + '_ {
        self.blocks.iter_mut().chain(self.discarded_blocks.iter_mut())
    }
}

/// The whole OCR layout document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutTree {
    #[serde(rename = "pdf_info", alias = "pages", default)]
    pub pages: Vec<Page>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LayoutTree {
    pub fn new(pages: Vec<Page>) -> Self {
        Self {
            pages,
            extra: Map::new(),
        }
    }

    /// Parse a layout document from a JSON string.
    pub fn from_json_str(json: &str) -> Result<Self, LayoutError> {
        serde_json::from_str(json).map_err(|e| LayoutError::MalformedLayout {
            path: "<string>".into(),
            detail: e.to_string(),
        })
    }

    /// Read and parse a `layout.json` file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, LayoutError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LayoutError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| LayoutError::MalformedLayout {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, LayoutError> {
        serde_json::to_string_pretty(self).map_err(|e| LayoutError::MalformedLayout {
            path: "<memory>".into(),
            detail: e.to_string(),
        })
    }

    /// Write the tree to `path` atomically (temp file in the same directory + rename).
    pub fn save_atomic(&self, path: impl AsRef<Path>) -> Result<(), LayoutError> {
        let path = path.as_ref();
        let json = self.to_json_pretty()?;
        write_atomic(path, json.as_bytes())
    }

    /// Span at `address`, if every index resolves.
    pub fn span(&self, address: &SpanAddress) -> Option<&Span> {
        self.pages
            .get(address.page)?
            .block(address.block)?
            .lines()
            .get(address.line)?
            .spans
            .get(address.span)
    }

    /// Total number of addressable blocks across pages.
    pub fn block_count(&self) -> usize {
        self.pages.iter().map(Page::block_count).sum()
    }
}

/// Write `bytes` to `path` via a sibling temp file, then rename into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LayoutError> {
    let write_err = |source| LayoutError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_err)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

// ── Addressing ───────────────────────────────────────────────────────────

/// Positional address of a span: `(page, block, line, span)`.
///
/// The block index counts a page's content blocks first, then its discarded
/// blocks. Valid only against the tree revision it was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpanAddress {
    pub page: usize,
    pub block: usize,
    pub line: usize,
    pub span: usize,
}

impl SpanAddress {
    pub const fn new(page: usize, block: usize, line: usize, span: usize) -> Self {
        Self {
            page,
            block,
            line,
            span,
        }
    }
}

impl fmt::Display for SpanAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.page, self.block, self.line, self.span
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "pdf_info": [{
                "page_idx": 0,
                "page_size": [1275, 1650],
                "preproc_blocks": [
                    {
                        "type": "text",
                        "bbox": [100, 200, 900, 280],
                        "index": 3,
                        "lines": [{
                            "bbox": [100, 200, 900, 240],
                            "spans": [{"bbox": [100, 200, 500, 240], "content": "Hello", "score": 0.5, "type": "text"}]
                        }]
                    },
                    {
                        "type": "image",
                        "bbox": [100, 300, 900, 700],
                        "blocks": [{
                            "type": "image_body",
                            "bbox": [100, 300, 900, 700],
                            "lines": [{
                                "bbox": [100, 300, 900, 700],
                                "spans": [{"bbox": [100, 300, 900, 700], "type": "image", "image_path": "abc.jpg"}]
                            }]
                        }]
                    }
                ],
                "discarded_blocks": [
                    {"type": "discarded", "bbox": [600, 1600, 640, 1630], "lines": []}
                ],
                "para_blocks": []
            }],
            "_backend": "pipeline"
        })
    }

    #[test]
    fn parses_both_block_shapes() {
        let tree: LayoutTree = serde_json::from_value(sample()).unwrap();
        let page = &tree.pages[0];
        assert_eq!(page.block_count(), 3);
        assert!(matches!(page.blocks[0].content, BlockContent::Lines(_)));
        assert!(matches!(page.blocks[1].content, BlockContent::Nested(_)));
        assert_eq!(page.blocks[1].all_lines().count(), 1);
        assert!(page.blocks[1].lines().is_empty());
        assert!(page.is_discarded_slot(2));
        assert_eq!(page.block(2).unwrap().block_type, BlockType::Discarded);
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let tree: LayoutTree = serde_json::from_value(sample()).unwrap();
        let back = serde_json::to_value(&tree).unwrap();
        assert_eq!(back["_backend"], "pipeline");
        assert_eq!(back["pdf_info"][0]["preproc_blocks"][0]["index"], 3);
        assert_eq!(
            back["pdf_info"][0]["preproc_blocks"][1]["blocks"][0]["lines"][0]["spans"][0]
                ["image_path"],
            "abc.jpg"
        );
        assert!(back["pdf_info"][0]["para_blocks"].is_array());
    }

    #[test]
    fn text_alias_and_default_score() {
        let span: Span = serde_json::from_value(json!({"text": "abc"})).unwrap();
        assert_eq!(span.content, "abc");
        assert_eq!(span.score_or_default(), 1.0);
        assert!(span.is_text());
    }

    #[test]
    fn unknown_block_type_round_trips() {
        let t: BlockType = serde_json::from_value(json!("ref_text")).unwrap();
        assert_eq!(t, BlockType::Other("ref_text".into()));
        assert_eq!(serde_json::to_value(&t).unwrap(), json!("ref_text"));
    }

    #[test]
    fn untyped_block_reads_as_text_and_stays_untyped() {
        let raw = json!({"bbox": [100, 200, 900, 240], "lines": []});
        let block: Block = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(block.block_type, BlockType::Text);
        assert!(block.type_inferred);
        assert_eq!(serde_json::to_value(&block).unwrap(), raw);

        let typed: Block = serde_json::from_value(json!({"type": "text", "lines": []})).unwrap();
        assert!(!typed.type_inferred);
        assert_eq!(serde_json::to_value(&typed).unwrap()["type"], "text");
    }

    #[test]
    fn bbox_union_all() {
        let a = BBox::new(10.0, 10.0, 20.0, 20.0);
        let b = BBox::new(5.0, 15.0, 15.0, 30.0);
        assert_eq!(
            BBox::union_all([&a, &b]),
            Some(BBox::new(5.0, 10.0, 20.0, 30.0))
        );
        assert_eq!(BBox::union_all(std::iter::empty()), None);
    }

    #[test]
    fn span_lookup_by_address() {
        let tree: LayoutTree = serde_json::from_value(sample()).unwrap();
        let span = tree.span(&SpanAddress::new(0, 0, 0, 0)).unwrap();
        assert_eq!(span.content, "Hello");
        assert!(tree.span(&SpanAddress::new(0, 1, 0, 0)).is_none());
        assert!(tree.span(&SpanAddress::new(1, 0, 0, 0)).is_none());
    }

    #[test]
    fn save_atomic_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.json");
        let tree: LayoutTree = serde_json::from_value(sample()).unwrap();
        tree.save_atomic(&path).unwrap();
        let back = LayoutTree::from_json_file(&path).unwrap();
        assert_eq!(back, tree);
    }
}
