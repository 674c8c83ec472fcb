//! # edgequake-scanlayout
//!
//! Rebuild correctly laid-out, searchable pages from OCR layout output.
//!
//! ## Why this crate?
//!
//! OCR services describe a scanned book page by page, span by span, in
//! **pixels** with a top-left origin, and never say what resolution they
//! scanned at. Turning that into a PDF means recovering the DPI, flipping
//! every box into PDF point space, picking font sizes from noisy line
//! heights, repairing line boxes that overlap, letting a human fix the words
//! the OCR was unsure about, and choosing margins that keep the original
//! column width when content is reflowed. This crate does exactly that, on an
//! in-memory [`LayoutTree`], with no I/O in the stages.
//!
//! ## Pipeline Overview
//!
//! ```text
//! layout.json
//!  │
//!  ├─ 1. Calibrate  shrink over-tall, overlapping line boxes (raw pixels)
//!  ├─ 2. Review     flatten low-confidence spans → human corrections
//!  ├─ 3. Patch      apply corrections (backup first, stale edits rejected)
//!  ├─ 4. DPI        infer scan resolution from the first page's size
//!  ├─ 5. Transform  pixels → points, y flipped to a bottom-left origin
//!  ├─ 6. Fonts      median line height → font bucket
//!  ├─ 7. Margin     one flow frame that preserves the content width
//!  └─ 8. Plan       exact or flow render plan for a PDF writer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_scanlayout::{calibrate, plan_flow, EngineConfig, LayoutTree};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut tree = LayoutTree::from_json_file("layout.json")?;
//!     let config = EngineConfig::default();
//!
//!     let report = calibrate(&mut tree, &config.calibration)?;
//!     eprintln!("calibrated {} of {} blocks", report.fixed(), report.examined());
//!
//!     let plan = plan_flow(&tree, &config)?;
//!     eprintln!("margin {:.2}pt, wrap width {:.2}pt",
//!         plan.frame.margin_pt, plan.frame.wrap_width());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scanlayout` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! edgequake-scanlayout = { version = "0.1", default-features = false }
//! ```
//!
//! ## Concurrency
//!
//! Every stage is synchronous and takes the tree by `&` or `&mut`; nothing is
//! retained between calls. Separate trees can be processed on separate
//! threads.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backup;
pub mod config;
pub mod error;
pub mod layout;
pub mod pipeline;
pub mod plan;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backup::{BackupSink, FileBackup, MemoryBackup, BACKUP_FILE_NAME};
pub use config::{CalibrationSettings, EngineConfig, EngineConfigBuilder, FontBucketTable, MarginBounds};
pub use error::{AddressResolutionError, ErrorKind, LayoutError, StructuralIssue};
pub use layout::{BBox, Block, BlockContent, BlockType, LayoutTree, Line, Page, PageSize, Span, SpanAddress};
pub use pipeline::calibrate::{calibrate, CalibrationDecision, CalibrationReport};
pub use pipeline::dpi::{document_dpi, infer_dpi, DpiEstimate};
pub use pipeline::fonts::{FontChoice, FontMapper};
pub use pipeline::margin::{compute_margin, FlowFrame, MarginReport};
pub use pipeline::review::{apply_edits, flatten_low_confidence, PatchReport, ReviewFile, ReviewItem, SpanEdit};
pub use pipeline::transform::{PageGeometry, RenderRect};
pub use plan::{plan_exact, plan_flow, ExactPlan, FlowPlan};
