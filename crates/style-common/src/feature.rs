//! Feature records as seen by the styling engine.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::bbox::BoundingBox;
use crate::qname::QName;

/// A scalar property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Double(f64),
    String(String),
}

impl Value {
    /// Numeric interpretation; strings are parsed.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            Value::String(s) => s.trim().parse().ok(),
            Value::Null | Value::Bool(_) => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Compare two values, numerically when both sides are numeric.
    pub fn compare(&self, other: &Value, match_case: bool) -> Option<Ordering> {
        if self.is_null() || other.is_null() {
            return None;
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.partial_cmp(&b);
        }
        let (a, b) = (self.to_string(), other.to_string());
        if match_case {
            Some(a.cmp(&b))
        } else {
            Some(a.to_lowercase().cmp(&b.to_lowercase()))
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Minimal geometry model, enough for envelope tests and handing shapes to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    Point(f64, f64),
    LineString(Vec<(f64, f64)>),
    Polygon {
        exterior: Vec<(f64, f64)>,
        interiors: Vec<Vec<(f64, f64)>>,
    },
    Collection(Vec<Geometry>),
}

impl Geometry {
    pub fn envelope(&self) -> Option<BoundingBox> {
        match self {
            Geometry::Point(x, y) => Some(BoundingBox::new(*x, *y, *x, *y)),
            Geometry::LineString(coords) => BoundingBox::from_coords(coords),
            Geometry::Polygon { exterior, .. } => BoundingBox::from_coords(exterior),
            Geometry::Collection(members) => members
                .iter()
                .filter_map(Geometry::envelope)
                .reduce(|a, b| a.merge(&b)),
        }
    }
}

/// Read access to a feature, provided by the feature store.
pub trait Feature: Send + Sync {
    fn id(&self) -> Option<&str>;

    fn type_name(&self) -> &QName;

    /// All values reachable by a property path, empty if there are none.
    fn property(&self, path: &str) -> Vec<Value>;

    /// The geometry under `path`, or the default geometry when `path` is `None`.
    fn geometry(&self, path: Option<&str>) -> Option<&Geometry>;
}

/// In-memory feature with flat, possibly repeated properties.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleFeature {
    pub id: Option<String>,
    pub type_name: QName,
    pub properties: Vec<(String, Value)>,
    pub geometries: Vec<(String, Geometry)>,
}

impl SimpleFeature {
    pub fn new(type_name: QName) -> Self {
        Self {
            id: None,
            type_name,
            properties: Vec::new(),
            geometries: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.push((name.into(), value.into()));
        self
    }

    pub fn with_geometry(mut self, name: impl Into<String>, geometry: Geometry) -> Self {
        self.geometries.push((name.into(), geometry));
        self
    }
}

/// Strip a namespace prefix or Clark namespace from the last step of a path.
fn local_step(path: &str) -> &str {
    let step = path.trim().trim_start_matches("./");
    let step = step.rsplit('/').next().unwrap_or(step);
    let step = match step.rfind('}') {
        Some(idx) => &step[idx + 1..],
        None => step,
    };
    match step.rfind(':') {
        Some(idx) => &step[idx + 1..],
        None => step,
    }
}

impl Feature for SimpleFeature {
    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn type_name(&self) -> &QName {
        &self.type_name
    }

    fn property(&self, path: &str) -> Vec<Value> {
        let name = local_step(path);
        self.properties
            .iter()
            .filter(|(k, _)| local_step(k) == name)
            .map(|(_, v)| v.clone())
            .collect()
    }

    fn geometry(&self, path: Option<&str>) -> Option<&Geometry> {
        match path {
            Some(p) => {
                let name = local_step(p);
                self.geometries
                    .iter()
                    .find(|(k, _)| local_step(k) == name)
                    .map(|(_, g)| g)
            }
            None => self.geometries.first().map(|(_, g)| g),
        }
    }
}
