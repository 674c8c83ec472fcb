//! Configuration types for layout reconstruction.
//!
//! Every engine knob lives in [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. Keeping them in one serialisable struct makes it
//! trivial to log the exact settings of a run and diff two runs to understand
//! why their layouts differ.
//!
//! All values are validated at entry: [`EngineConfigBuilder::build`] (and
//! [`EngineConfig::validate`] for configs deserialised from disk) reject an
//! unsorted bucket table, an out-of-range quality cutoff or inverted margin
//! bounds with [`LayoutError::InvalidConfig`] / [`LayoutError::UnsortedBucketTable`].

use crate::error::LayoutError;
use serde::{Deserialize, Serialize};

/// Points per centimetre.
pub const CM_PT: f64 = 72.0 / 2.54;

/// A4 page width in points.
pub const A4_WIDTH_PT: f64 = 595.2756;

/// A4 page height in points.
pub const A4_HEIGHT_PT: f64 = 841.8898;

/// Configuration for the layout reconstruction engine.
///
/// # Example
/// ```rust
/// use edgequake_scanlayout::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .target_line_height_px(30.0)
///     .quality_cutoff(0.8)
///     .build()
///     .unwrap();
/// assert_eq!(config.calibration.target_line_height_px, 30.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Height → font size table for measured (body text) blocks.
    pub font_buckets: FontBucketTable,

    /// Fixed font size for `title` blocks. Default: 12pt.
    ///
    /// Titles are typeset at one size regardless of scan noise so headings
    /// stay consistent across pages.
    pub title_font_pt: f64,

    /// Fixed font size for `discarded` blocks (page numbers, running heads). Default: 8pt.
    pub discarded_font_pt: f64,

    /// Font size for text blocks detected as footnotes. Default: 8pt.
    pub footnote_font_pt: f64,

    /// Font size when a measured block has no usable line geometry. Default: 11pt.
    pub fallback_font_pt: f64,

    /// Line Calibrator settings.
    pub calibration: CalibrationSettings,

    /// Spans scoring strictly below this are flagged for review. Range 0.0–1.0. Default: 0.9.
    pub quality_cutoff: f64,

    /// Output page width for reflowed rendering. Default: A4 (595.28pt).
    pub target_page_width_pt: f64,

    /// Output page height for reflowed rendering. Default: A4 (841.89pt).
    pub target_page_height_pt: f64,

    /// Clamp range for the computed flow margin. Default: 0.5cm–2cm.
    pub margin_bounds: MarginBounds,

    /// Detect footnotes in `text` blocks by position and numbering. Default: false.
    pub footnote_detection: bool,

    /// Vertical gap (px) between consecutive blocks that earns a spacer in
    /// flow layout. Default: 30.
    pub gap_threshold_px: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            font_buckets: FontBucketTable::default(),
            title_font_pt: 12.0,
            discarded_font_pt: 8.0,
            footnote_font_pt: 8.0,
            fallback_font_pt: 11.0,
            calibration: CalibrationSettings::default(),
            quality_cutoff: 0.9,
            target_page_width_pt: A4_WIDTH_PT,
            target_page_height_pt: A4_HEIGHT_PT,
            margin_bounds: MarginBounds::default(),
            footnote_detection: false,
            gap_threshold_px: 30.0,
        }
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Check every constraint; used by the builder and for configs loaded from disk.
    pub fn validate(&self) -> Result<(), LayoutError> {
        self.font_buckets.validate()?;
        self.calibration.validate()?;
        self.margin_bounds.validate()?;
        validate_quality_cutoff(self.quality_cutoff)?;
        for (name, v) in [
            ("title_font_pt", self.title_font_pt),
            ("discarded_font_pt", self.discarded_font_pt),
            ("footnote_font_pt", self.footnote_font_pt),
            ("fallback_font_pt", self.fallback_font_pt),
            ("target_page_width_pt", self.target_page_width_pt),
            ("target_page_height_pt", self.target_page_height_pt),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(LayoutError::InvalidConfig(format!(
                    "{name} must be a positive number, got {v}"
                )));
            }
        }
        if !(self.gap_threshold_px.is_finite() && self.gap_threshold_px >= 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "gap_threshold_px must be ≥ 0, got {}",
                self.gap_threshold_px
            )));
        }
        Ok(())
    }
}

pub(crate) fn validate_quality_cutoff(cutoff: f64) -> Result<(), LayoutError> {
    if !(0.0..=1.0).contains(&cutoff) {
        return Err(LayoutError::InvalidConfig(format!(
            "quality_cutoff must be 0.0–1.0, got {cutoff}"
        )));
    }
    Ok(())
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn font_buckets(mut self, table: FontBucketTable) -> Self {
        self.config.font_buckets = table;
        self
    }

    pub fn title_font_pt(mut self, pt: f64) -> Self {
        self.config.title_font_pt = pt;
        self
    }

    pub fn discarded_font_pt(mut self, pt: f64) -> Self {
        self.config.discarded_font_pt = pt;
        self
    }

    pub fn footnote_font_pt(mut self, pt: f64) -> Self {
        self.config.footnote_font_pt = pt;
        self
    }

    pub fn fallback_font_pt(mut self, pt: f64) -> Self {
        self.config.fallback_font_pt = pt;
        self
    }

    pub fn target_line_height_px(mut self, px: f64) -> Self {
        self.config.calibration.target_line_height_px = px;
        self
    }

    /// Overlap gate for the Line Calibrator; `0.0` disables it.
    pub fn overlap_threshold_px(mut self, px: f64) -> Self {
        self.config.calibration.overlap_threshold_px = px;
        self
    }

    pub fn quality_cutoff(mut self, cutoff: f64) -> Self {
        self.config.quality_cutoff = cutoff;
        self
    }

    pub fn target_page_width_pt(mut self, pt: f64) -> Self {
        self.config.target_page_width_pt = pt;
        self
    }

    pub fn target_page_height_pt(mut self, pt: f64) -> Self {
        self.config.target_page_height_pt = pt;
        self
    }

    pub fn margin_bounds(mut self, min_pt: f64, max_pt: f64) -> Self {
        self.config.margin_bounds = MarginBounds { min_pt, max_pt };
        self
    }

    pub fn footnote_detection(mut self, v: bool) -> Self {
        self.config.footnote_detection = v;
        self
    }

    pub fn gap_threshold_px(mut self, px: f64) -> Self {
        self.config.gap_threshold_px = px;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, LayoutError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Font buckets ─────────────────────────────────────────────────────────

/// One row of a [`FontBucketTable`]: heights strictly below `threshold_pt`
/// map to `font_size_pt`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FontBucket {
    pub threshold_pt: f64,
    pub font_size_pt: f64,
}

/// Ascending `(threshold_pt, font_size_pt)` table plus a terminal size.
///
/// Lookup returns the size of the first bucket whose threshold strictly
/// exceeds the measured height, or `else_font_pt` when none does. Thresholds
/// must be strictly ascending and sizes non-decreasing (capped by
/// `else_font_pt`), which makes the mapping monotone in the measured height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontBucketTable {
    buckets: Vec<FontBucket>,
    else_font_pt: f64,
}

impl Default for FontBucketTable {
    /// Thresholds tuned on 150–300 DPI book scans: body text lands on 10–11pt.
    fn default() -> Self {
        Self {
            buckets: vec![
                FontBucket { threshold_pt: 17.0, font_size_pt: 9.0 },
                FontBucket { threshold_pt: 22.0, font_size_pt: 10.0 },
                FontBucket { threshold_pt: 28.0, font_size_pt: 11.0 },
                FontBucket { threshold_pt: 30.0, font_size_pt: 12.0 },
                FontBucket { threshold_pt: 32.0, font_size_pt: 13.0 },
            ],
            else_font_pt: 14.0,
        }
    }
}

impl FontBucketTable {
    /// Build and validate a table from `(threshold_pt, font_size_pt)` pairs.
    pub fn new(
        buckets: impl IntoIterator<Item = (f64, f64)>,
        else_font_pt: f64,
    ) -> Result<Self, LayoutError> {
        let table = Self {
            buckets: buckets
                .into_iter()
                .map(|(threshold_pt, font_size_pt)| FontBucket {
                    threshold_pt,
                    font_size_pt,
                })
                .collect(),
            else_font_pt,
        };
        table.validate()?;
        Ok(table)
    }

    /// The standard 9–13pt ladder with custom thresholds; 14pt above the last.
    pub fn standard(thresholds: [f64; 5]) -> Result<Self, LayoutError> {
        Self::new(thresholds.into_iter().zip([9.0, 10.0, 11.0, 12.0, 13.0]), 14.0)
    }

    pub fn buckets(&self) -> &[FontBucket] {
        &self.buckets
    }

    pub fn else_font_pt(&self) -> f64 {
        self.else_font_pt
    }

    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(self.else_font_pt.is_finite() && self.else_font_pt > 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "terminal font size must be positive, got {}",
                self.else_font_pt
            )));
        }
        for (i, b) in self.buckets.iter().enumerate() {
            if !b.threshold_pt.is_finite() || !(b.font_size_pt.is_finite() && b.font_size_pt > 0.0) {
                return Err(LayoutError::InvalidConfig(format!(
                    "font bucket {i} is not a finite positive entry: ({}pt → {}pt)",
                    b.threshold_pt, b.font_size_pt
                )));
            }
            if b.font_size_pt > self.else_font_pt {
                return Err(LayoutError::InvalidConfig(format!(
                    "font bucket {i} size {}pt exceeds the terminal size {}pt",
                    b.font_size_pt, self.else_font_pt
                )));
            }
            if i > 0 {
                let prev = self.buckets[i - 1];
                if b.threshold_pt <= prev.threshold_pt || b.font_size_pt < prev.font_size_pt {
                    return Err(LayoutError::UnsortedBucketTable {
                        index: i,
                        threshold_pt: b.threshold_pt,
                        font_size_pt: b.font_size_pt,
                        previous_threshold_pt: prev.threshold_pt,
                        previous_font_size_pt: prev.font_size_pt,
                    });
                }
            }
        }
        Ok(())
    }

    /// Font size for a measured height in points.
    pub fn lookup(&self, height_pt: f64) -> f64 {
        self.buckets
            .iter()
            .find(|b| b.threshold_pt > height_pt)
            .map_or(self.else_font_pt, |b| b.font_size_pt)
    }
}

// ── Calibration ──────────────────────────────────────────────────────────

/// Line Calibrator thresholds, in raw scan pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    /// Median line height (px) above which a block is shrunk. Default: 34.
    pub target_line_height_px: f64,

    /// Only shrink blocks whose worst line overlap is at least this negative.
    /// `0.0` disables the gate. Default: −10.
    pub overlap_threshold_px: f64,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            target_line_height_px: 34.0,
            overlap_threshold_px: -10.0,
        }
    }
}

impl CalibrationSettings {
    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(self.target_line_height_px.is_finite() && self.target_line_height_px > 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "target_line_height_px must be > 0, got {}",
                self.target_line_height_px
            )));
        }
        if !(self.overlap_threshold_px.is_finite() && self.overlap_threshold_px <= 0.0) {
            return Err(LayoutError::InvalidConfig(format!(
                "overlap_threshold_px must be ≤ 0 (0 disables), got {}",
                self.overlap_threshold_px
            )));
        }
        Ok(())
    }

    /// True when the overlap gate is active.
    pub fn overlap_gate_enabled(&self) -> bool {
        self.overlap_threshold_px < 0.0
    }
}

// ── Margins ──────────────────────────────────────────────────────────────

/// Clamp range for the flow margin, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginBounds {
    pub min_pt: f64,
    pub max_pt: f64,
}

impl Default for MarginBounds {
    fn default() -> Self {
        Self {
            min_pt: 0.5 * CM_PT,
            max_pt: 2.0 * CM_PT,
        }
    }
}

impl MarginBounds {
    pub fn validate(&self) -> Result<(), LayoutError> {
        if !(self.min_pt.is_finite() && self.max_pt.is_finite())
            || self.min_pt < 0.0
            || self.min_pt > self.max_pt
        {
            return Err(LayoutError::InvalidConfig(format!(
                "margin bounds must satisfy 0 ≤ min ≤ max, got {}–{}pt",
                self.min_pt, self.max_pt
            )));
        }
        Ok(())
    }

    pub fn clamp(&self, margin_pt: f64) -> f64 {
        margin_pt.clamp(self.min_pt, self.max_pt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
        let c = EngineConfig::builder().build().unwrap();
        assert_eq!(c.quality_cutoff, 0.9);
        assert_eq!(c.calibration.target_line_height_px, 34.0);
        assert_eq!(c.calibration.overlap_threshold_px, -10.0);
    }

    #[test]
    fn out_of_range_cutoff_rejected() {
        let err = EngineConfig::builder().quality_cutoff(1.5).build().unwrap_err();
        assert!(err.to_string().contains("quality_cutoff"), "got: {err}");
    }

    #[test]
    fn positive_overlap_threshold_rejected() {
        assert!(EngineConfig::builder().overlap_threshold_px(5.0).build().is_err());
        assert!(EngineConfig::builder().overlap_threshold_px(0.0).build().is_ok());
    }

    #[test]
    fn zero_target_line_height_rejected() {
        assert!(EngineConfig::builder().target_line_height_px(0.0).build().is_err());
    }

    #[test]
    fn unsorted_table_is_configuration_error() {
        let err = FontBucketTable::new([(22.0, 10.0), (17.0, 9.0)], 14.0).unwrap_err();
        assert!(matches!(err, LayoutError::UnsortedBucketTable { index: 1, .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn decreasing_sizes_rejected() {
        assert!(FontBucketTable::new([(17.0, 10.0), (22.0, 9.0)], 14.0).is_err());
        assert!(FontBucketTable::new([(17.0, 15.0)], 14.0).is_err());
    }

    #[test]
    fn lookup_first_strictly_greater_threshold() {
        let t = FontBucketTable::default();
        assert_eq!(t.lookup(10.0), 9.0);
        assert_eq!(t.lookup(17.0), 10.0);
        assert_eq!(t.lookup(21.9), 10.0);
        assert_eq!(t.lookup(29.0), 12.0);
        assert_eq!(t.lookup(32.0), 14.0);
        assert_eq!(t.lookup(100.0), 14.0);
    }

    #[test]
    fn standard_ladder() {
        let t = FontBucketTable::standard([15.0, 20.0, 25.0, 30.0, 35.0]).unwrap();
        assert_eq!(t.lookup(14.0), 9.0);
        assert_eq!(t.lookup(36.0), 14.0);
    }

    #[test]
    fn margin_bounds_clamp() {
        let b = MarginBounds::default();
        assert!((b.min_pt - 14.173).abs() < 0.01);
        assert!((b.max_pt - 56.693).abs() < 0.01);
        assert_eq!(b.clamp(0.0), b.min_pt);
        assert_eq!(b.clamp(100.0), b.max_pt);
        assert_eq!(b.clamp(23.85), 23.85);
    }

    #[test]
    fn inverted_margin_bounds_rejected() {
        assert!(EngineConfig::builder().margin_bounds(40.0, 10.0).build().is_err());
    }

    #[test]
    fn config_serde_round_trip() {
        let c = EngineConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
    }
}
