//! DPI inference: recover the scan resolution from a page's pixel size.
//!
//! The OCR service reports geometry in pixels but never the resolution it
//! scanned at. Every pixel→point conversion needs that number, so we infer
//! it by testing the page against the standard paper sizes a scanner is
//! realistically fed (US Letter, A4). A genuine scan shows the same DPI on
//! both axes; the candidate whose width- and height-derived DPIs agree best
//! wins, and its two estimates are averaged.

use crate::error::LayoutError;
use crate::layout::{LayoutTree, Page, PageSize};
use serde::Serialize;
use tracing::debug;

/// A standard paper size, in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaperSize {
    pub name: &'static str,
    pub width_in: f64,
    pub height_in: f64,
}

pub const US_LETTER: PaperSize = PaperSize {
    name: "letter",
    width_in: 8.5,
    height_in: 11.0,
};

pub const A4: PaperSize = PaperSize {
    name: "a4",
    width_in: 8.27,
    height_in: 11.69,
};

/// Candidates tried in order; ties go to the earlier entry.
pub const CANDIDATES: [PaperSize; 2] = [US_LETTER, A4];

/// Result of DPI inference, with the candidate that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DpiEstimate {
    pub dpi: f64,
    pub paper: PaperSize,
    /// `|dpi_w − dpi_h| / mean` for the winning candidate.
    pub deviation: f64,
}

/// Reject page sizes that cannot carry geometry.
pub fn check_page_size(size: PageSize, page: usize) -> Result<(), LayoutError> {
    if !(size.width.is_finite() && size.height.is_finite())
        || size.width <= 0.0
        || size.height <= 0.0
    {
        return Err(LayoutError::DegeneratePageSize {
            page,
            width: size.width,
            height: size.height,
        });
    }
    Ok(())
}

/// Infer the DPI of a page with the given pixel size.
///
/// `page` is only used to label the error.
///
/// # Errors
/// [`LayoutError::DegeneratePageSize`] when either dimension is zero,
/// negative or not finite.
pub fn infer_dpi(size: PageSize, page: usize) -> Result<DpiEstimate, LayoutError> {
    check_page_size(size, page)?;

    let mut best: Option<DpiEstimate> = None;
    for paper in CANDIDATES {
        let dpi_w = size.width / paper.width_in;
        let dpi_h = size.height / paper.height_in;
        let mean = (dpi_w + dpi_h) / 2.0;
        let deviation = (dpi_w - dpi_h).abs() / mean;
        debug!(
            paper = paper.name,
            dpi_w, dpi_h, deviation, "DPI candidate"
        );
        if best.is_none_or(|b| deviation < b.deviation) {
            best = Some(DpiEstimate {
                dpi: mean,
                paper,
                deviation,
            });
        }
    }

    // CANDIDATES is non-empty and every mean is positive for positive input.
    best.ok_or(LayoutError::DegeneratePageSize {
        page,
        width: size.width,
        height: size.height,
    })
}

/// Infer the DPI of one page, failing if its `page_size` is missing.
pub fn page_dpi(page: &Page, index: usize) -> Result<DpiEstimate, LayoutError> {
    let size = page.page_size.ok_or(LayoutError::DegeneratePageSize {
        page: index,
        width: 0.0,
        height: 0.0,
    })?;
    infer_dpi(size, index)
}

/// Infer the document DPI from its first page.
///
/// # Errors
/// [`LayoutError::EmptyDocument`] for a tree with no pages, otherwise as
/// [`page_dpi`].
pub fn document_dpi(tree: &LayoutTree) -> Result<DpiEstimate, LayoutError> {
    let first = tree
        .pages
        .first()
        .ok_or(LayoutError::EmptyDocument { what: "pages" })?;
    page_dpi(first, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dpi(w: f64, h: f64) -> DpiEstimate {
        infer_dpi(PageSize::new(w, h), 0).unwrap()
    }

    #[test]
    fn letter_at_150() {
        let e = dpi(1275.0, 1650.0);
        assert_eq!(e.paper.name, "letter");
        assert!((e.dpi - 150.0).abs() < 0.01, "got {}", e.dpi);
    }

    #[test]
    fn a4_at_150() {
        let e = dpi(1240.0, 1754.0);
        assert_eq!(e.paper.name, "a4");
        assert!((e.dpi - 150.0).abs() < 0.1, "got {}", e.dpi);
    }

    #[test]
    fn letter_at_72_and_200() {
        assert!((dpi(612.0, 792.0).dpi - 72.0).abs() < 1e-9);
        assert!((dpi(1700.0, 2200.0).dpi - 200.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_sizes_rejected() {
        for (w, h) in [(0.0, 1650.0), (1275.0, 0.0), (-5.0, 10.0), (f64::NAN, 10.0)] {
            let err = infer_dpi(PageSize::new(w, h), 2).unwrap_err();
            assert!(matches!(err, LayoutError::DegeneratePageSize { page: 2, .. }));
        }
    }

    #[test]
    fn missing_page_size_rejected() {
        let page = Page::default();
        assert!(page_dpi(&page, 5).is_err());
    }

    #[test]
    fn empty_document_rejected() {
        let err = document_dpi(&LayoutTree::default()).unwrap_err();
        assert!(matches!(err, LayoutError::EmptyDocument { .. }));
    }

    #[test]
    fn always_positive() {
        for (w, h) in [(1.0, 1.0), (10_000.0, 3.0), (3.0, 10_000.0)] {
            assert!(dpi(w, h).dpi > 0.0);
        }
    }
}
