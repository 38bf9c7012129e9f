//! Styles and per-feature rule selection.

use std::borrow::Cow;
use std::collections::HashMap;

use style_common::{EvalContext, Feature, Filter, Geometry, QName};
use tracing::warn;

use crate::continuation::Deferred;
use crate::raster::RasterStyling;
use crate::styling::{LineStyling, PointStyling, PolygonStyling, TextStyling};
use crate::symbolizer::{AnySymbolizer, SymbolizerId};

/// The gate of a rule.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleFilter {
    /// No filter: the rule applies to every feature.
    All,
    /// `ElseFilter`: never true by itself, applies when no earlier rule matched.
    Else,
    Filter(Filter),
}

impl RuleFilter {
    /// Evaluate the filter alone. The else marker is always false here.
    pub fn evaluate(&self, feature: &dyn Feature, ctx: &EvalContext) -> bool {
        match self {
            RuleFilter::All => true,
            RuleFilter::Else => false,
            RuleFilter::Filter(filter) => match filter.evaluate(feature, ctx) {
                Ok(b) => b,
                Err(e) => {
                    warn!(error = %e, "Evaluating a rule filter failed");
                    false
                }
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Option<String>,
    pub title: Option<String>,
    pub filter: RuleFilter,
    pub min_scale: f64,
    pub max_scale: f64,
    pub symbolizers: Vec<AnySymbolizer>,
}

impl Rule {
    /// A rule without filter and scale limits.
    pub fn new(symbolizers: Vec<AnySymbolizer>) -> Self {
        Self {
            name: None,
            title: None,
            filter: RuleFilter::All,
            min_scale: f64::NEG_INFINITY,
            max_scale: f64::INFINITY,
            symbolizers,
        }
    }

    /// Set the scale range of this rule and of all its symbolizers.
    pub fn set_scale_range(&mut self, min: f64, max: f64) {
        self.min_scale = min;
        self.max_scale = max;
        for symbolizer in &mut self.symbolizers {
            symbolizer.set_scale_range(min, max);
        }
    }

    /// `min_scale <= scale < max_scale`.
    pub fn applies_at(&self, scale: f64) -> bool {
        self.min_scale <= scale && scale < self.max_scale
    }

    /// Whether this rule adds its symbolizers, given the accumulator state so far.
    fn fires(&self, feature: Option<&dyn Feature>, ctx: &EvalContext, nothing_matched: bool) -> bool {
        let Some(feature) = feature else {
            return true;
        };
        match &self.filter {
            RuleFilter::All => true,
            RuleFilter::Else => nothing_matched,
            other => other.evaluate(feature, ctx),
        }
    }
}

/// A styling value ready for the renderer.
#[derive(Debug, Clone)]
pub enum Styling<'a> {
    Point(Cow<'a, PointStyling>),
    Line(Cow<'a, LineStyling>),
    Polygon(Cow<'a, PolygonStyling>),
    Text(Cow<'a, TextStyling>),
    Raster(Cow<'a, RasterStyling>),
}

/// One symbolizer evaluated against one feature.
#[derive(Debug, Clone)]
pub struct Evaluated<'a> {
    pub symbolizer: &'a AnySymbolizer,
    pub styling: Styling<'a>,
    /// Label text for text symbolizers.
    pub label: Option<String>,
}

impl<'a> Evaluated<'a> {
    pub fn geometry<'f>(&self, feature: &'f dyn Feature) -> Option<&'f Geometry> {
        feature.geometry(self.symbolizer.geometry())
    }
}

/// An ordered set of rules, parsed once and shared read-only.
#[derive(Debug, Clone)]
pub struct Style {
    pub name: Option<String>,
    pub title: Option<String>,
    pub feature_type: Option<QName>,
    pub rules: Vec<Rule>,
    labels: HashMap<SymbolizerId, Deferred<String>>,
}

impl Style {
    pub fn new(name: Option<String>, rules: Vec<Rule>) -> Self {
        Self {
            name,
            title: None,
            feature_type: None,
            rules,
            labels: HashMap::new(),
        }
    }

    /// A style consisting of a single unconditional symbolizer.
    pub fn single(symbolizer: AnySymbolizer, label: Option<Deferred<String>>) -> Self {
        let mut style = Self::new(symbolizer.name().map(str::to_string), Vec::new());
        if let Some(label) = label {
            style.labels.insert(symbolizer.id(), label);
        }
        style.rules.push(Rule::new(vec![symbolizer]));
        style
    }

    pub fn with_feature_type(mut self, feature_type: Option<QName>) -> Self {
        self.feature_type = feature_type;
        self
    }

    /// Attach the label template of a text symbolizer.
    pub fn set_label(&mut self, id: SymbolizerId, label: Deferred<String>) {
        self.labels.insert(id, label);
    }

    pub fn label(&self, id: SymbolizerId) -> Option<&Deferred<String>> {
        self.labels.get(&id)
    }

    /// Merge the label templates of another style.
    pub fn absorb_labels(&mut self, other: &mut Style) {
        self.labels.extend(other.labels.drain());
    }

    /// Rules active at `scale`, in document order.
    pub fn rules_at(&self, scale: f64) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.applies_at(scale))
    }

    /// True when no rule applies at `scale`.
    pub fn is_empty_at(&self, scale: f64) -> bool {
        self.rules_at(scale).next().is_none()
    }

    /// All symbolizers of all rules.
    pub fn symbolizers(&self) -> impl Iterator<Item = &AnySymbolizer> {
        self.rules.iter().flat_map(|r| r.symbolizers.iter())
    }

    /// The symbolizers applying to `feature` at `scale`, in rule order.
    ///
    /// Rules are evaluated in document order into one accumulator; an else
    /// rule fires only if nothing was accumulated before it.
    pub fn select(&self, feature: Option<&dyn Feature>, ctx: &EvalContext) -> Vec<&AnySymbolizer> {
        let mut selected = Vec::new();
        for rule in self.rules_at(ctx.scale) {
            if rule.fires(feature, ctx, selected.is_empty()) {
                selected.extend(rule.symbolizers.iter().filter(|s| s.applies_at(ctx.scale)));
            }
        }
        selected
    }

    /// Select and evaluate the symbolizers for `feature`.
    pub fn evaluate<'a>(&'a self, feature: &dyn Feature, ctx: &EvalContext) -> Vec<Evaluated<'a>> {
        self.select(Some(feature), ctx)
            .into_iter()
            .map(|symbolizer| {
                let (styling, label) = match symbolizer {
                    AnySymbolizer::Point(s) => (Styling::Point(s.evaluate(feature, ctx)), None),
                    AnySymbolizer::Line(s) => (Styling::Line(s.evaluate(feature, ctx)), None),
                    AnySymbolizer::Polygon(s) => (Styling::Polygon(s.evaluate(feature, ctx)), None),
                    AnySymbolizer::Raster(s) => (Styling::Raster(s.evaluate(feature, ctx)), None),
                    AnySymbolizer::Text(s) => {
                        let label = self
                            .labels
                            .get(&s.id())
                            .map(|l| l.evaluate(feature, ctx).into_owned())
                            .unwrap_or_default();
                        (Styling::Text(s.evaluate(feature, ctx)), Some(label))
                    }
                };
                Evaluated {
                    symbolizer,
                    styling,
                    label,
                }
            })
            .collect()
    }
}
