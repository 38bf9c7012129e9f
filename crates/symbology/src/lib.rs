//! Styling value model and the per-feature evaluation engine.
//!
//! A parsed style is a tree of base values, each optionally paired with a
//! [`Continuation`] chain that patches a copy of the base value with data
//! from the feature being rendered.

pub mod color;
pub mod continuation;
pub mod raster;
pub mod resource;
pub mod style;
pub mod styling;
pub mod symbolizer;
pub mod uom;

pub use color::Color;
pub use continuation::{Chain, Continuation, Deferred, TemplatePart, TextTemplate};
pub use raster::{
    Categorize, ChannelSelection, ContrastEnhancement, ImageOutline, Interpolate, Overlap,
    RasterStyling, ShadedRelief, ThresholdBelongsTo,
};
pub use resource::{FontResource, ImageResource, ResourceError, SvgResource};
pub use style::{Evaluated, Rule, RuleFilter, Style, Styling};
pub use styling::{
    Fill, Font, FontStyle, Graphic, Halo, LineCap, LineJoin, LinePlacement, LineStyling, Mark,
    OffsetSubstraction, OffsetType, PerpendicularOffsetType, PointStyling, PolygonStyling,
    SimpleMark, Stroke, TextStyling,
};
pub use symbolizer::{AnySymbolizer, Description, Symbolizer, SymbolizerId};
pub use uom::Uom;
