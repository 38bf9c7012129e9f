//! Styling values for points, lines, polygons and text.
//!
//! All values are plain data with defaults matching the symbology encoding.
//! Evaluation clones and patches them; the parsed templates are never mutated.

use std::sync::Arc;

use crate::color::Color;
use crate::resource::{FontResource, ImageResource, SvgResource};
use crate::uom::Uom;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineJoin {
    Mitre,
    #[default]
    Round,
    Bevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineCap {
    #[default]
    Butt,
    Round,
    Square,
}

/// Predefined mark shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimpleMark {
    #[default]
    Square,
    Circle,
    Triangle,
    Star,
    Cross,
    X,
}

impl SimpleMark {
    /// Look up an upper-case well known name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "SQUARE" => Some(Self::Square),
            "CIRCLE" => Some(Self::Circle),
            "TRIANGLE" => Some(Self::Triangle),
            "STAR" => Some(Self::Star),
            "CROSS" => Some(Self::Cross),
            "X" => Some(Self::X),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub color: Color,
    pub graphic: Option<Box<Graphic>>,
}

impl Default for Fill {
    fn default() -> Self {
        Self {
            color: Color::GRAY,
            graphic: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
    pub line_join: LineJoin,
    pub line_cap: LineCap,
    pub dasharray: Option<Vec<f64>>,
    pub dashoffset: f64,
    /// Graphic used to fill the stroke area.
    pub fill: Option<Box<Graphic>>,
    /// Graphic repeated along the line.
    pub stroke: Option<Box<Graphic>>,
    pub stroke_gap: f64,
    pub stroke_initial_gap: f64,
    /// Place a single graphic at this percentage of the line length, `< 0` disables.
    pub position_percentage: f64,
}

impl Default for Stroke {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            width: 1.0,
            line_join: LineJoin::default(),
            line_cap: LineCap::default(),
            dasharray: None,
            dashoffset: 0.0,
            fill: None,
            stroke: None,
            stroke_gap: 0.0,
            stroke_initial_gap: 0.0,
            position_percentage: -1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    pub well_known: SimpleMark,
    /// Glyph mark: font and glyph index.
    pub font: Option<Arc<FontResource>>,
    pub mark_index: usize,
    /// Vector mark from an SVG document.
    pub shape: Option<Arc<SvgResource>>,
    pub fill: Fill,
    pub stroke: Stroke,
}

impl Default for Mark {
    fn default() -> Self {
        Self {
            well_known: SimpleMark::default(),
            font: None,
            mark_index: 0,
            shape: None,
            fill: Fill::default(),
            stroke: Stroke::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Graphic {
    pub opacity: f64,
    /// Height in uom, `< 0` means the natural size of the graphic.
    pub size: f64,
    pub rotation: f64,
    pub anchor_x: f64,
    pub anchor_y: f64,
    pub displacement_x: f64,
    pub displacement_y: f64,
    pub mark: Mark,
    pub image: Option<Arc<ImageResource>>,
    pub svg: Option<Arc<SvgResource>>,
    pub image_url: Option<String>,
}

impl Default for Graphic {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            size: -1.0,
            rotation: 0.0,
            anchor_x: 0.5,
            anchor_y: 0.5,
            displacement_x: 0.0,
            displacement_y: 0.0,
            mark: Mark::default(),
            image: None,
            svg: None,
            image_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FontStyle {
    #[default]
    Normal,
    Italic,
    Oblique,
}

impl FontStyle {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "NORMAL" => Some(Self::Normal),
            "ITALIC" => Some(Self::Italic),
            "OBLIQUE" => Some(Self::Oblique),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    /// Candidate families in order of preference.
    pub families: Vec<String>,
    pub style: FontStyle,
    pub bold: bool,
    pub size: f64,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            families: Vec::new(),
            style: FontStyle::default(),
            bold: false,
            size: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Halo {
    pub fill: Fill,
    pub radius: f64,
}

impl Default for Halo {
    fn default() -> Self {
        Self {
            fill: Fill {
                color: Color::WHITE,
                graphic: None,
            },
            radius: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetType {
    #[default]
    Standard,
    Round,
    Edged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetSubstraction {
    #[default]
    None,
    NegativeOffset,
}

/// How a perpendicular offset line is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PerpendicularOffsetType {
    pub kind: OffsetType,
    pub substraction: OffsetSubstraction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinePlacement {
    pub perpendicular_offset: f64,
    pub perpendicular_offset_type: PerpendicularOffsetType,
    pub initial_gap: f64,
    pub gap: f64,
    pub generalize_line: bool,
    pub is_aligned: bool,
    pub repeat: bool,
    pub prevent_upside_down: bool,
    pub center: bool,
    pub word_wise: bool,
}

impl Default for LinePlacement {
    fn default() -> Self {
        Self {
            perpendicular_offset: 0.0,
            perpendicular_offset_type: PerpendicularOffsetType::default(),
            initial_gap: 0.0,
            gap: 0.0,
            generalize_line: false,
            is_aligned: true,
            repeat: false,
            prevent_upside_down: false,
            center: false,
            word_wise: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointStyling {
    pub graphic: Graphic,
    pub uom: Uom,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LineStyling {
    pub stroke: Stroke,
    pub perpendicular_offset: f64,
    pub perpendicular_offset_type: PerpendicularOffsetType,
    pub uom: Uom,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolygonStyling {
    pub fill: Option<Fill>,
    pub stroke: Option<Stroke>,
    pub displacement_x: f64,
    pub displacement_y: f64,
    pub perpendicular_offset: f64,
    pub perpendicular_offset_type: PerpendicularOffsetType,
    pub uom: Uom,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextStyling {
    pub font: Font,
    pub fill: Fill,
    pub rotation: f64,
    pub displacement_x: f64,
    pub displacement_y: f64,
    pub anchor_x: f64,
    pub anchor_y: f64,
    /// Let the label renderer pick a placement around the point.
    pub auto: bool,
    pub line_placement: Option<LinePlacement>,
    pub halo: Option<Halo>,
    pub uom: Uom,
}

impl Default for TextStyling {
    fn default() -> Self {
        Self {
            font: Font::default(),
            fill: Fill {
                color: Color::BLACK,
                graphic: None,
            },
            rotation: 0.0,
            displacement_x: 0.0,
            displacement_y: 0.0,
            anchor_x: 0.0,
            anchor_y: 0.5,
            auto: false,
            line_placement: None,
            halo: None,
            uom: Uom::default(),
        }
    }
}
