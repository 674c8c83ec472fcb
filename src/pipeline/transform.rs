//! Coordinate transform: OCR pixel space → PDF rendering space.
//!
//! ```text
//!   OCR (pixels)                      PDF (points)
//!   (0,0) ──────────▶ x               y ▲
//!     │   ┌──────┐ y0                   │   ┌──────┐ y + height
//!     │   │ bbox │                      │   │ rect │
//!     │   └──────┘ y1                   │   └──────┘ y
//!     ▼ y                           (0,0) ──────────▶ x
//! ```
//!
//! `points = pixels / dpi * 72`, then the y axis is flipped: the bottom
//! edge of a pixel box (`y1`) becomes the rectangle's `y`.
//!
//! Mixing flipped and unflipped coordinates is the easiest way to wreck a
//! page, so every box on a page goes through one [`PageGeometry`].

use crate::error::LayoutError;
use crate::layout::{BBox, Page};
use crate::pipeline::dpi;
use serde::{Deserialize, Serialize};

/// Points per inch.
pub const POINTS_PER_INCH: f64 = 72.0;

pub fn px_to_pt(px: f64, dpi: f64) -> f64 {
    px / dpi * POINTS_PER_INCH
}

pub fn pt_to_px(pt: f64, dpi: f64) -> f64 {
    pt * dpi / POINTS_PER_INCH
}

/// Flip a y coordinate between top-left and bottom-left origins.
///
/// Its own inverse: `flip_y(flip_y(y, h), h) == y`.
pub fn flip_y(y: f64, page_height: f64) -> f64 {
    page_height - y
}

/// A rectangle in rendering space: bottom-left origin, points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl RenderRect {
    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }
}

/// Convert a pixel bbox to a rendering-space rect.
pub fn bbox_to_rect(bbox: &BBox, dpi: f64, page_height_pt: f64) -> RenderRect {
    let x0 = px_to_pt(bbox.x0, dpi);
    let y0 = px_to_pt(bbox.y0, dpi);
    let x1 = px_to_pt(bbox.x1, dpi);
    let y1 = px_to_pt(bbox.y1, dpi);
    RenderRect {
        x: x0,
        y: flip_y(y1, page_height_pt),
        width: x1 - x0,
        height: y1 - y0,
    }
}

/// Inverse of [`bbox_to_rect`].
pub fn rect_to_bbox(rect: &RenderRect, dpi: f64, page_height_pt: f64) -> BBox {
    let y1_pt = flip_y(rect.y, page_height_pt);
    let y0_pt = y1_pt - rect.height;
    BBox::new(
        pt_to_px(rect.x, dpi),
        pt_to_px(y0_pt, dpi),
        pt_to_px(rect.x + rect.width, dpi),
        pt_to_px(y1_pt, dpi),
    )
}

/// Scale and flip context for one output page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub dpi: f64,
    pub width_pt: f64,
    pub height_pt: f64,
}

impl PageGeometry {
    /// Geometry for an output page of explicit point size.
    pub fn new(dpi: f64, width_pt: f64, height_pt: f64) -> Result<Self, LayoutError> {
        if !(dpi.is_finite() && dpi > 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "DPI must be a positive number, got {dpi}"
            )));
        }
        Ok(Self {
            dpi,
            width_pt,
            height_pt,
        })
    }

    /// Geometry reproducing the original scan's page at the given DPI.
    pub fn for_page(page: &Page, index: usize, dpi: f64) -> Result<Self, LayoutError> {
        let size = page.page_size.ok_or(LayoutError::DegeneratePageSize {
            page: index,
            width: 0.0,
            height: 0.0,
        })?;
        dpi::check_page_size(size, index)?;
        Self::new(dpi, px_to_pt(size.width, dpi), px_to_pt(size.height, dpi))
    }

    pub fn to_points(&self, px: f64) -> f64 {
        px_to_pt(px, self.dpi)
    }

    pub fn rect(&self, bbox: &BBox) -> RenderRect {
        bbox_to_rect(bbox, self.dpi, self.height_pt)
    }

    pub fn bbox(&self, rect: &RenderRect) -> BBox {
        rect_to_bbox(rect, self.dpi, self.height_pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn top_left_box_at_72_dpi() {
        let r = bbox_to_rect(&BBox::new(0.0, 0.0, 100.0, 50.0), 72.0, 792.0);
        assert_eq!(
            r,
            RenderRect {
                x: 0.0,
                y: 742.0,
                width: 100.0,
                height: 50.0
            }
        );
    }

    #[test]
    fn scales_by_dpi() {
        let r = bbox_to_rect(&BBox::new(150.0, 300.0, 450.0, 450.0), 150.0, 792.0);
        assert!(close(r.x, 72.0));
        assert!(close(r.width, 144.0));
        assert!(close(r.height, 72.0));
        // bottom edge 450px = 216pt from the top
        assert!(close(r.y, 792.0 - 216.0));
        assert!(close(r.top(), 792.0 - 144.0));
    }

    #[test]
    fn round_trip_all_corners() {
        let dpi = 150.0;
        let page_h = 792.0;
        let page_w = 612.0;
        let w = pt_to_px(page_w, dpi);
        let h = pt_to_px(page_h, dpi);
        // One box hugging each corner of a letter page, plus an interior one.
        let boxes = [
            BBox::new(0.0, 0.0, 120.0, 40.0),
            BBox::new(w - 120.0, 0.0, w, 40.0),
            BBox::new(0.0, h - 40.0, 120.0, h),
            BBox::new(w - 120.0, h - 40.0, w, h),
            BBox::new(333.3, 777.7, 901.1, 812.9),
        ];
        for b in boxes {
            let back = rect_to_bbox(&bbox_to_rect(&b, dpi, page_h), dpi, page_h);
            for (orig, got) in [(b.x0, back.x0), (b.y0, back.y0), (b.x1, back.x1), (b.y1, back.y1)] {
                assert!((orig - got).abs() < 1e-6, "{b:?} → {back:?}");
            }
        }
    }

    #[test]
    fn top_of_page_maps_to_top_of_rect_space() {
        let g = PageGeometry::new(150.0, 612.0, 792.0).unwrap();
        let top = g.rect(&BBox::new(0.0, 0.0, 10.0, 10.0));
        let bottom = g.rect(&BBox::new(0.0, 1640.0, 10.0, 1650.0));
        assert!(close(top.top(), 792.0));
        assert!(close(bottom.y, 0.0));
        assert!(top.y > bottom.y);
    }

    #[test]
    fn flip_is_involution() {
        assert!(close(flip_y(flip_y(123.4, 792.0), 792.0), 123.4));
        assert!(close(flip_y(0.0, 792.0), 792.0));
    }

    #[test]
    fn unit_conversions() {
        assert!(close(px_to_pt(150.0, 150.0), 72.0));
        assert!(close(pt_to_px(72.0, 150.0), 150.0));
    }

    #[test]
    fn page_geometry_rejects_bad_dpi() {
        assert!(PageGeometry::new(0.0, 1.0, 1.0).is_err());
        assert!(PageGeometry::new(f64::NAN, 1.0, 1.0).is_err());
    }

    #[test]
    fn page_geometry_from_page() {
        let page = crate::layout::Page {
            page_size: Some(crate::layout::PageSize::new(1275.0, 1650.0)),
            ..Default::default()
        };
        let g = PageGeometry::for_page(&page, 0, 150.0).unwrap();
        assert!(close(g.width_pt, 612.0));
        assert!(close(g.height_pt, 792.0));
    }
}
