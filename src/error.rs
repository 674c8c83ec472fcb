//! Error types for the edgequake-scanlayout library.
//!
//! Three distinct shapes reflect three distinct failure modes:
//!
//! * [`LayoutError`] — **Fatal**: the calling operation cannot proceed
//!   (degenerate page size, unsorted bucket table, a block with no bbox where
//!   geometry is structurally required, backup could not be written).
//!   Returned as `Err(LayoutError)` and never retried.
//!
//! * [`AddressResolutionError`] — **Non-fatal, per edit**: one correction in
//!   a patch batch could not be resolved against the current tree. Collected
//!   in [`crate::pipeline::review::PatchReport`] while the remaining edits are
//!   still applied.
//!
//! * [`StructuralIssue`] — **Non-fatal diagnostic**: a block lacked a field the
//!   engine expected, so its font/height contribution was skipped. Collected
//!   into render plans so callers can surface them.
//!
//! Every variant names the page/block (or full span address) it concerns.

use crate::layout::SpanAddress;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a fatal [`LayoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Invalid configuration or degenerate input geometry.
    Configuration,
    /// The tree lacks a structurally required field.
    StructuralAssumption,
    /// Reading or writing a layout artefact failed.
    Io,
}

/// All fatal errors returned by the edgequake-scanlayout library.
#[derive(Debug, Error)]
pub enum LayoutError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// Builder or entry-point validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A page's pixel size cannot yield a DPI (zero, negative or non-finite).
    #[error("Page {page} has a degenerate page_size {width}x{height}px; cannot infer DPI")]
    DegeneratePageSize { page: usize, width: f64, height: f64 },

    /// Font bucket thresholds (or sizes) are not ascending.
    #[error(
        "Font bucket table is not ascending at entry {index}: \
         ({threshold_pt}pt → {font_size_pt}pt) follows ({previous_threshold_pt}pt → {previous_font_size_pt}pt)"
    )]
    UnsortedBucketTable {
        index: usize,
        threshold_pt: f64,
        font_size_pt: f64,
        previous_threshold_pt: f64,
        previous_font_size_pt: f64,
    },

    /// The layout has no pages (or no content blocks) to measure.
    #[error("Layout has no {what} to measure")]
    EmptyDocument { what: &'static str },

    // ── Structural errors ─────────────────────────────────────────────────
    /// A structurally required field is missing.
    #[error("Page {page}, block {block} ({block_type}): missing required field '{field}'")]
    MissingField {
        page: usize,
        block: usize,
        block_type: String,
        field: &'static str,
    },

    /// The layout document could not be parsed into a tree.
    #[error("Malformed layout '{path}': {detail}")]
    MalformedLayout { path: PathBuf, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// The pre-patch backup could not be persisted; no edit was applied.
    #[error("Failed to persist layout backup '{path}': {source}")]
    BackupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not read a layout file.
    #[error("Failed to read layout file '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not write a layout artefact.
    #[error("Failed to write '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LayoutError {
    /// Classify this error into the engine's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::InvalidConfig(_)
            | LayoutError::DegeneratePageSize { .. }
            | LayoutError::UnsortedBucketTable { .. }
            | LayoutError::EmptyDocument { .. } => ErrorKind::Configuration,
            LayoutError::MissingField { .. } | LayoutError::MalformedLayout { .. } => {
                ErrorKind::StructuralAssumption
            }
            LayoutError::BackupFailed { .. }
            | LayoutError::ReadFailed { .. }
            | LayoutError::WriteFailed { .. } => ErrorKind::Io,
        }
    }
}

/// A single correction that could not be applied.
///
/// Stored in [`crate::pipeline::review::PatchReport::rejected`]; the rest of
/// the batch is still applied.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum AddressResolutionError {
    #[error("{address}: page index out of range (tree has {pages} pages)")]
    PageOutOfRange { address: SpanAddress, pages: usize },

    #[error("{address}: block index out of range (page has {blocks} blocks)")]
    BlockOutOfRange { address: SpanAddress, blocks: usize },

    /// The block exists but does not carry lines directly (e.g. an image body).
    #[error("{address}: block of type '{block_type}' has no addressable lines")]
    LinesUnavailable {
        address: SpanAddress,
        block_type: String,
    },

    #[error("{address}: line index out of range (block has {lines} lines)")]
    LineOutOfRange { address: SpanAddress, lines: usize },

    #[error("{address}: span index out of range (line has {spans} spans)")]
    SpanOutOfRange { address: SpanAddress, spans: usize },

    /// The address resolves, but to a span whose text is not the one the
    /// edit was made against: the tree was reshaped since flattening.
    #[error("{address}: stale edit, expected {expected:?} but span holds {found:?}")]
    ContentMismatch {
        address: SpanAddress,
        expected: String,
        found: String,
    },

    #[error("{address}: duplicate edit in the same batch; first edit kept")]
    Duplicate { address: SpanAddress },
}

impl AddressResolutionError {
    /// The address the rejected edit targeted.
    pub fn address(&self) -> SpanAddress {
        match self {
            AddressResolutionError::PageOutOfRange { address, .. }
            | AddressResolutionError::BlockOutOfRange { address, .. }
            | AddressResolutionError::LinesUnavailable { address, .. }
            | AddressResolutionError::LineOutOfRange { address, .. }
            | AddressResolutionError::SpanOutOfRange { address, .. }
            | AddressResolutionError::ContentMismatch { address, .. }
            | AddressResolutionError::Duplicate { address } => *address,
        }
    }
}

/// A non-fatal structural diagnostic attached to one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralIssue {
    pub page: usize,
    pub block: usize,
    pub block_type: String,
    pub detail: String,
}

impl std::fmt::Display for StructuralIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Page {}, block {} ({}): {}",
            self.page, self.block, self.block_type, self.detail
        )
    }
}
