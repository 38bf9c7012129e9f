//! Raster symbolizer values: channel selection, color maps and relief shading.

use std::collections::HashMap;

use crate::color::Color;
use crate::styling::{LineStyling, PolygonStyling};
use crate::symbolizer::Symbolizer;
use crate::uom::Uom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overlap {
    #[default]
    Latest,
    Earliest,
    Average,
    Random,
}

impl Overlap {
    /// Match `LATEST_ON_TOP`, `EARLIEST_ON_TOP`, `AVERAGE` or `RANDOM`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "LATEST_ON_TOP" => Some(Self::Latest),
            "EARLIEST_ON_TOP" => Some(Self::Earliest),
            "AVERAGE" => Some(Self::Average),
            "RANDOM" => Some(Self::Random),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContrastEnhancement {
    pub normalize: bool,
    pub histogram: bool,
    pub gamma: f64,
}

impl Default for ContrastEnhancement {
    fn default() -> Self {
        Self {
            normalize: false,
            histogram: false,
            gamma: 1.0,
        }
    }
}

/// Source band names for the output channels.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelSelection {
    pub red: Option<String>,
    pub green: Option<String>,
    pub blue: Option<String>,
    pub gray: Option<String>,
    /// Per source channel contrast settings.
    pub contrast: HashMap<String, ContrastEnhancement>,
}

impl ChannelSelection {
    pub fn is_empty(&self) -> bool {
        self.red.is_none() && self.green.is_none() && self.blue.is_none() && self.gray.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShadedRelief {
    pub brightness_only: bool,
    pub relief_factor: f64,
    pub azimuth_angle: f64,
    pub illumination_angle: f64,
}

impl Default for ShadedRelief {
    fn default() -> Self {
        Self {
            brightness_only: false,
            relief_factor: 55.0,
            azimuth_angle: 315.0,
            illumination_angle: 45.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThresholdBelongsTo {
    Preceding,
    #[default]
    Succeeding,
}

/// Piecewise constant mapping from values to colors.
///
/// `values` has one more entry than `thresholds`.
#[derive(Debug, Clone, PartialEq)]
pub struct Categorize {
    pub values: Vec<Color>,
    pub thresholds: Vec<f64>,
    pub belongs_to: ThresholdBelongsTo,
    pub fallback: Option<Color>,
}

impl Categorize {
    pub fn evaluate(&self, value: f64) -> Option<Color> {
        if value.is_nan() || self.values.is_empty() {
            return self.fallback;
        }
        let idx = self
            .thresholds
            .iter()
            .take_while(|&&t| match self.belongs_to {
                ThresholdBelongsTo::Succeeding => value >= t,
                ThresholdBelongsTo::Preceding => value > t,
            })
            .count();
        self.values
            .get(idx.min(self.values.len() - 1))
            .copied()
            .or(self.fallback)
    }
}

/// Linear color ramp between stops sorted by value.
#[derive(Debug, Clone, PartialEq)]
pub struct Interpolate {
    pub stops: Vec<(f64, Color)>,
    pub fallback: Option<Color>,
}

impl Interpolate {
    pub fn evaluate(&self, value: f64) -> Option<Color> {
        if value.is_nan() {
            return self.fallback;
        }
        let (first, last) = match (self.stops.first(), self.stops.last()) {
            (Some(f), Some(l)) => (f, l),
            _ => return self.fallback,
        };
        if value <= first.0 {
            return Some(first.1);
        }
        if value >= last.0 {
            return Some(last.1);
        }
        self.stops.windows(2).find_map(|w| {
            let ((v0, c0), (v1, c1)) = (w[0], w[1]);
            if value >= v0 && value <= v1 {
                let t = if v1 > v0 { (value - v0) / (v1 - v0) } else { 0.0 };
                Some(c0.lerp(c1, t))
            } else {
                None
            }
        })
    }
}

/// Outline drawn around raster cells.
#[derive(Debug, Clone)]
pub enum ImageOutline {
    Line(Symbolizer<LineStyling>),
    Polygon(Symbolizer<PolygonStyling>),
}

#[derive(Debug, Clone)]
pub struct RasterStyling {
    pub opacity: f64,
    pub channels: ChannelSelection,
    pub overlap: Overlap,
    pub categorize: Option<Categorize>,
    pub interpolate: Option<Interpolate>,
    pub contrast: Option<ContrastEnhancement>,
    pub shaded: Option<ShadedRelief>,
    pub image_outline: Option<ImageOutline>,
    pub uom: Uom,
}

impl Default for RasterStyling {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            channels: ChannelSelection::default(),
            overlap: Overlap::default(),
            categorize: None,
            interpolate: None,
            contrast: None,
            shaded: None,
            image_outline: None,
            uom: Uom::default(),
        }
    }
}

impl PartialEq for RasterStyling {
    fn eq(&self, other: &Self) -> bool {
        let outline = match (&self.image_outline, &other.image_outline) {
            (None, None) => true,
            (Some(ImageOutline::Line(a)), Some(ImageOutline::Line(b))) => a.value == b.value,
            (Some(ImageOutline::Polygon(a)), Some(ImageOutline::Polygon(b))) => a.value == b.value,
            _ => false,
        };
        outline
            && self.opacity == other.opacity
            && self.channels == other.channels
            && self.overlap == other.overlap
            && self.categorize == other.categorize
            && self.interpolate == other.interpolate
            && self.contrast == other.contrast
            && self.shaded == other.shaded
            && self.uom == other.uom
    }
}

impl RasterStyling {
    /// Pick the color for a raster value, categorize taking precedence over interpolate.
    pub fn color_for(&self, value: f64) -> Option<Color> {
        if let Some(c) = &self.categorize {
            return c.evaluate(value);
        }
        self.interpolate.as_ref().and_then(|i| i.evaluate(value))
    }
}
