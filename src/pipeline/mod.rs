//! Pipeline stages for layout reconstruction.
//!
//! Each submodule implements exactly one transformation step over a
//! [`LayoutTree`](crate::layout::LayoutTree) owned by the caller. No stage
//! keeps the tree or touches the filesystem.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─ calibrate ─┐   ┌─ review ─┐
//! tree ──────┤  (mutates)  ├───┤ (mutates)├──▶ dpi ──▶ transform ──▶ fonts
//!            └─────────────┘   └──────────┘          │
//!                                                    └──▶ margin ──▶ plan
//! ```
//!
//! 1. [`calibrate`] — shrink overlapping line boxes; runs on the raw tree,
//!    before any DPI-dependent stage
//! 2. [`review`]    — locate low-confidence spans and patch corrections back
//! 3. [`dpi`]       — infer the scan resolution from page pixel size
//! 4. [`transform`] — pixel → point conversion with the y-axis flip
//! 5. [`fonts`]     — median line height → font bucket
//! 6. [`margin`]    — content-width-preserving margin for reflowed output
//! 7. [`text`]      — line text, footnote and page-number heuristics shared
//!    by fonts and plans

pub mod calibrate;
pub mod dpi;
pub mod fonts;
pub mod margin;
pub mod review;
pub mod text;
pub mod transform;
