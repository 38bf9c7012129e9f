//! Symbolizers: styling values plus the metadata a rendering pass needs.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use style_common::{EvalContext, Feature, Geometry};

use crate::continuation::{Chain, Deferred};
use crate::raster::RasterStyling;
use crate::styling::{LineStyling, PointStyling, PolygonStyling, TextStyling};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Surrogate identity of a symbolizer, used to key label templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolizerId(u64);

impl SymbolizerId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Description {
    pub title: Option<String>,
    pub abstract_text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Symbolizer<T> {
    id: SymbolizerId,
    pub value: Deferred<T>,
    /// Property holding the geometry to draw, the default geometry when `None`.
    pub geometry: Option<String>,
    pub name: Option<String>,
    pub description: Option<Description>,
    /// Where the symbolizer was defined, for diagnostics.
    pub location: Option<String>,
    /// Scale range `[min_scale, max_scale)` in which the symbolizer draws.
    pub min_scale: f64,
    pub max_scale: f64,
}

impl<T: Clone + 'static> Symbolizer<T> {
    pub fn new(base: T, continuation: Chain<T>) -> Self {
        Self {
            id: SymbolizerId::next(),
            value: Deferred::new(base, continuation),
            geometry: None,
            name: None,
            description: None,
            location: None,
            min_scale: f64::NEG_INFINITY,
            max_scale: f64::INFINITY,
        }
    }

    pub fn with_scale_range(mut self, min: f64, max: f64) -> Self {
        self.min_scale = min;
        self.max_scale = max;
        self
    }

    pub fn applies_at(&self, scale: f64) -> bool {
        self.min_scale <= scale && scale < self.max_scale
    }

    pub fn with_geometry(mut self, property: Option<String>) -> Self {
        self.geometry = property;
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn id(&self) -> SymbolizerId {
        self.id
    }

    /// The styling value specialized for `feature`.
    pub fn evaluate(&self, feature: &dyn Feature, ctx: &EvalContext) -> Cow<'_, T> {
        self.value.evaluate(feature, ctx)
    }

    /// Base value, valid for every feature when the symbolizer is static.
    pub fn base(&self) -> &T {
        &self.value.base
    }

    pub fn is_static(&self) -> bool {
        self.value.is_resolved()
    }

    pub fn geometry_of<'f>(&self, feature: &'f dyn Feature) -> Option<&'f Geometry> {
        feature.geometry(self.geometry.as_deref())
    }
}

/// A symbolizer of any geometry kind.
#[derive(Debug, Clone)]
pub enum AnySymbolizer {
    Point(Symbolizer<PointStyling>),
    Line(Symbolizer<LineStyling>),
    Polygon(Symbolizer<PolygonStyling>),
    Text(Symbolizer<TextStyling>),
    Raster(Symbolizer<RasterStyling>),
}

macro_rules! each_symbolizer {
    ($value:expr, $s:ident => $body:expr) => {
        match $value {
            AnySymbolizer::Point($s) => $body,
            AnySymbolizer::Line($s) => $body,
            AnySymbolizer::Polygon($s) => $body,
            AnySymbolizer::Text($s) => $body,
            AnySymbolizer::Raster($s) => $body,
        }
    };
}

impl AnySymbolizer {
    pub fn id(&self) -> SymbolizerId {
        each_symbolizer!(self, s => s.id())
    }

    pub fn name(&self) -> Option<&str> {
        each_symbolizer!(self, s => s.name.as_deref())
    }

    pub fn geometry(&self) -> Option<&str> {
        each_symbolizer!(self, s => s.geometry.as_deref())
    }

    pub fn is_static(&self) -> bool {
        each_symbolizer!(self, s => s.is_static())
    }

    pub fn applies_at(&self, scale: f64) -> bool {
        each_symbolizer!(self, s => s.applies_at(scale))
    }

    pub fn set_scale_range(&mut self, min: f64, max: f64) {
        each_symbolizer!(self, s => {
            s.min_scale = min;
            s.max_scale = max;
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnySymbolizer::Point(_) => "point",
            AnySymbolizer::Line(_) => "line",
            AnySymbolizer::Polygon(_) => "polygon",
            AnySymbolizer::Text(_) => "text",
            AnySymbolizer::Raster(_) => "raster",
        }
    }
}
