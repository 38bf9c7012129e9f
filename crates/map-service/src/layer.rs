//! The layer tree: layers, their kinds, rendering options and scale hints.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

/// Closed scale denominator range `[min, max]` in which a layer is shown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScaleHint {
    pub min: f64,
    pub max: f64,
}

impl ScaleHint {
    pub const UNBOUNDED: ScaleHint = ScaleHint {
        min: f64::NEG_INFINITY,
        max: f64::INFINITY,
    };

    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// `min <= scale <= max`.
    pub fn contains(&self, scale: f64) -> bool {
        self.min <= scale && scale <= self.max
    }
}

impl Default for ScaleHint {
    fn default() -> Self {
        Self::UNBOUNDED
    }
}

impl fmt::Display for ScaleHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Scale settings of one configured layer, before derivation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScaleConfig {
    /// Explicit `(min, max)` pair.
    pub denominators: Option<(f64, f64)>,
    /// Band from the previous sibling's upper bound up to this value.
    pub until: Option<f64>,
    /// Band from this value to infinity.
    pub above: Option<f64>,
}

/// Assign scale bands to siblings in configuration order.
///
/// A running upper bound starts at negative infinity. Explicit denominators
/// and `until` both advance it; `until` starts where the previous band
/// ended. `above` opens the band to infinity without advancing it. Siblings
/// with no scale settings get `None` and later inherit their parent's hint.
/// A band with `min > max` is swapped, with a warning.
pub fn derive_scale_hints(siblings: &[ScaleConfig]) -> Vec<Option<ScaleHint>> {
    let mut last = f64::NEG_INFINITY;
    siblings
        .iter()
        .map(|config| {
            let mut min = f64::NAN;
            let mut max = f64::NAN;
            if let Some((lo, hi)) = config.denominators {
                min = lo;
                max = hi;
                last = max;
            }
            if let Some(until) = config.until {
                min = last;
                max = until;
                last = max;
            }
            if let Some(above) = config.above {
                min = above;
                max = f64::INFINITY;
            }
            if min.is_nan() || max.is_nan() {
                return None;
            }
            if min > max {
                warn!(min, max, "Configured min and max scale conflict (min > max), swapping min and max");
                std::mem::swap(&mut min, &mut max);
            }
            Some(ScaleHint::new(min, max))
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Antialias {
    Image,
    Text,
    Both,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    NearestNeighbor,
    Bilinear,
    Bicubic,
}

impl Antialias {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "IMAGE" => Some(Self::Image),
            "TEXT" => Some(Self::Text),
            "BOTH" => Some(Self::Both),
            "NONE" => Some(Self::None),
            _ => None,
        }
    }
}

impl Quality {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "NORMAL" => Some(Self::Normal),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }
}

impl Interpolation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().replace('_', "").as_str() {
            "NEARESTNEIGHBOR" | "NEARESTNEIGHBOUR" => Some(Self::NearestNeighbor),
            "BILINEAR" => Some(Self::Bilinear),
            "BICUBIC" => Some(Self::Bicubic),
            _ => None,
        }
    }
}

/// Rendering options, inherited down the tree unless a layer overrides them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerOptions {
    pub antialias: Antialias,
    pub quality: Quality,
    pub interpolation: Interpolation,
    /// Features painted per layer and request, `None` for no limit.
    pub max_features: Option<usize>,
    /// Pixel radius around a feature info click.
    pub feature_info_radius: u32,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            antialias: Antialias::Both,
            quality: Quality::Normal,
            interpolation: Interpolation::NearestNeighbor,
            max_features: Some(10_000),
            feature_info_radius: 1,
        }
    }
}

/// Unparsed option overrides of one configured layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionOverrides {
    pub antialias: Option<String>,
    pub quality: Option<String>,
    pub interpolation: Option<String>,
    /// Non-positive values remove the limit.
    pub max_features: Option<i64>,
    pub feature_info_radius: Option<u32>,
}

fn override_value<T: Copy>(value: Option<&str>, parse: fn(&str) -> Option<T>, inherited: T, option: &str) -> T {
    match value {
        None => inherited,
        Some(v) => parse(v).unwrap_or_else(|| {
            warn!(value = %v, option, "Invalid option value, using the inherited value instead");
            inherited
        }),
    }
}

impl LayerOptions {
    /// Apply `overrides` on top of these (inherited) options.
    pub fn with_overrides(&self, overrides: &OptionOverrides) -> Self {
        Self {
            antialias: override_value(
                overrides.antialias.as_deref(),
                Antialias::from_name,
                self.antialias,
                "antialias",
            ),
            quality: override_value(overrides.quality.as_deref(), Quality::from_name, self.quality, "quality"),
            interpolation: override_value(
                overrides.interpolation.as_deref(),
                Interpolation::from_name,
                self.interpolation,
                "interpolation",
            ),
            max_features: match overrides.max_features {
                Some(n) if n > 0 => Some(n as usize),
                Some(_) => None,
                None => self.max_features,
            },
            feature_info_radius: overrides.feature_info_radius.unwrap_or(self.feature_info_radius),
        }
    }
}

/// What a layer draws from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "store", rename_all = "snake_case")]
pub enum LayerKind {
    /// Vector features from the named feature store.
    Feature(String),
    /// Coverage data from the named coverage store.
    Raster(String),
    /// Grouping only.
    Empty,
}

/// Index of a layer in its [`LayerTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub(crate) usize);

#[derive(Debug, Clone)]
pub struct Layer {
    pub name: Option<String>,
    /// The configured name, or a generated `NamelessLayer_N`. Styles are registered under it.
    pub internal_name: String,
    pub title: Option<String>,
    pub kind: LayerKind,
    pub queryable: bool,
    pub scale_hint: ScaleHint,
    pub options: LayerOptions,
    pub(crate) parent: Option<LayerId>,
    pub(crate) children: Vec<LayerId>,
}

impl Layer {
    /// The name used in log messages.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.title.as_deref())
            .unwrap_or(&self.internal_name)
    }

    pub fn is_feature_layer(&self) -> bool {
        matches!(self.kind, LayerKind::Feature(_))
    }
}

/// Layers stored by index, with a lookup by public name.
#[derive(Debug, Clone)]
pub struct LayerTree {
    layers: Vec<Layer>,
    root: LayerId,
    by_name: HashMap<String, LayerId>,
}

impl LayerTree {
    pub(crate) fn new(layers: Vec<Layer>, root: LayerId) -> Self {
        let mut by_name = HashMap::new();
        for (idx, layer) in layers.iter().enumerate() {
            if let Some(name) = &layer.name {
                if by_name.insert(name.clone(), LayerId(idx)).is_some() {
                    warn!(layer = %name, "Layer name is configured more than once, the last one wins");
                }
            }
        }
        Self { layers, root, by_name }
    }

    pub fn root(&self) -> LayerId {
        self.root
    }

    pub fn get(&self, id: LayerId) -> &Layer {
        &self.layers[id.0]
    }

    pub fn find(&self, name: &str) -> Option<LayerId> {
        self.by_name.get(name).copied()
    }

    pub fn children(&self, id: LayerId) -> &[LayerId] {
        &self.layers[id.0].children
    }

    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        self.layers[id.0].parent
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// `id` and all of its descendants, depth first.
    pub fn subtree(&self, id: LayerId) -> Vec<LayerId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }
}
