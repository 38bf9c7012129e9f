//! Parser state and the style level entry points.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use symbology::{AnySymbolizer, Deferred, Rule, RuleFilter, Style};
use tracing::{debug, warn};

use crate::dialect::Dialect;
use crate::error::{ParseError, ParseResult};
use crate::filter::parse_filter;
use crate::resources::GraphicCache;
use crate::sld::{parse_layers, parse_user_style};
use crate::xml::XmlElement;

/// The result of parsing a style document.
#[derive(Debug, Clone)]
pub enum ParsedStyle {
    Style(Style),
    /// A document whose root is a bare symbolizer.
    Symbolizer {
        symbolizer: AnySymbolizer,
        label: Option<Deferred<String>>,
    },
}

impl ParsedStyle {
    /// Wrap a bare symbolizer into a single rule style.
    pub fn into_style(self) -> Style {
        match self {
            ParsedStyle::Style(style) => style,
            ParsedStyle::Symbolizer { symbolizer, label } => Style::single(symbolizer, label),
        }
    }
}

/// Parses one XML dialect into styles, loading external graphics through a shared cache.
#[derive(Debug, Clone)]
pub struct SymbologyParser {
    pub(crate) dialect: Dialect,
    pub(crate) cache: Arc<GraphicCache>,
}

impl Default for SymbologyParser {
    fn default() -> Self {
        Self::new(Dialect::Se, Arc::new(GraphicCache::default()))
    }
}

impl SymbologyParser {
    pub fn new(dialect: Dialect, cache: Arc<GraphicCache>) -> Self {
        Self { dialect, cache }
    }

    /// A parser for `root`'s dialect, resolving relative resources against `base_dir`.
    pub fn for_document(root: &XmlElement, base_dir: Option<&Path>) -> Self {
        Self::new(Dialect::detect(root), Arc::new(GraphicCache::for_directory(base_dir)))
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn cache(&self) -> &Arc<GraphicCache> {
        &self.cache
    }

    /// Parse a style document: a feature type or coverage style, a bare
    /// symbolizer, or an SLD wrapper whose first style is used.
    pub fn parse(&self, root: &XmlElement) -> ParseResult<ParsedStyle> {
        let name = root.name.as_str();
        if name.ends_with("Symbolizer") {
            let (symbolizer, label) = self.parse_symbolizer(root)?;
            return Ok(ParsedStyle::Symbolizer { symbolizer, label });
        }
        match name {
            "FeatureTypeStyle" | "CoverageStyle" => Ok(ParsedStyle::Style(self.parse_feature_type_style(root)?)),
            "UserStyle" => Ok(ParsedStyle::Style(parse_user_style(self, root)?.0)),
            "StyledLayerDescriptor" | "NamedLayer" | "UserLayer" => parse_layers(self, root)?
                .into_iter()
                .flat_map(|layer| layer.styles)
                .next()
                .map(ParsedStyle::Style)
                .ok_or_else(|| ParseError::Missing {
                    element: "UserStyle".into(),
                    parent: root.name.clone(),
                    location: root.location(),
                }),
            other => Err(ParseError::Unexpected {
                expected: "a symbolizer, FeatureTypeStyle or StyledLayerDescriptor".into(),
                found: other.to_string(),
                location: root.location(),
            }),
        }
    }

    /// Parse a `FeatureTypeStyle` or `CoverageStyle` element.
    pub fn parse_feature_type_style(&self, el: &XmlElement) -> ParseResult<Style> {
        let mut style = Style::new(None, Vec::new());

        for child in el.elements() {
            match child.name.as_str() {
                "Name" => style.name = Some(child.text()),
                "Title" => style.title = Some(child.text()),
                "Description" => style.title = child.child_text("Title").or(style.title.take()),
                "FeatureTypeName" => style.feature_type = Some(child.resolve_qname(&child.text())),
                "Rule" => {
                    let rule = self.parse_rule(child, &mut style)?;
                    style.rules.push(rule);
                }
                "OnlineResource" => self.merge_online_resource(child, &mut style)?,
                _ => {}
            }
        }

        Ok(style)
    }

    /// Follow an `OnlineResource` holding a rule or a whole feature type style.
    fn merge_online_resource(&self, el: &XmlElement, style: &mut Style) -> ParseResult<()> {
        let Some(href) = self.href(el) else {
            warn!(location = %el.location(), "Online resource without xlink:href is ignored");
            return Ok(());
        };
        let bytes = match self.cache.load_bytes(&href) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, href = %href, "Referenced style document could not be read");
                return Ok(());
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        let root = XmlElement::parse(&text)?;
        debug!(href = %href, root = %root.name, "Merging referenced style document");

        let parser = Self::new(Dialect::detect(&root), Arc::clone(&self.cache));
        match root.name.as_str() {
            "Rule" => {
                let rule = parser.parse_rule(&root, style)?;
                style.rules.push(rule);
            }
            "FeatureTypeStyle" | "CoverageStyle" => {
                let mut referenced = parser.parse_feature_type_style(&root)?;
                style.absorb_labels(&mut referenced);
                style.rules.append(&mut referenced.rules);
                if style.feature_type.is_none() {
                    style.feature_type = referenced.feature_type;
                }
            }
            other => warn!(href = %href, root = %other, "Referenced document holds no rule or style"),
        }
        Ok(())
    }

    /// Parse a `Rule`, registering label templates of text symbolizers on `style`.
    pub(crate) fn parse_rule(&self, el: &XmlElement, style: &mut Style) -> ParseResult<Rule> {
        let mut rule = Rule::new(Vec::new());
        let mut gated = false;
        let (mut min_scale, mut max_scale) = (f64::NEG_INFINITY, f64::INFINITY);

        for child in el.elements() {
            let name = child.name.as_str();
            match name {
                "Name" => rule.name = Some(child.text()),
                "Title" => rule.title = Some(child.text()),
                "Description" => rule.title = child.child_text("Title").or(rule.title.take()),
                "Filter" | "ElseFilter" => {
                    if gated {
                        return Err(ParseError::Invalid {
                            what: "rule".into(),
                            location: child.location(),
                            message: "a rule has at most one Filter or ElseFilter".into(),
                        });
                    }
                    gated = true;
                    rule.filter = if name == "ElseFilter" {
                        RuleFilter::Else
                    } else {
                        RuleFilter::Filter(parse_filter(child)?)
                    };
                }
                "MinScaleDenominator" => {
                    if let Some(scale) = scale_denominator(child) {
                        min_scale = scale;
                    }
                }
                "MaxScaleDenominator" => {
                    if let Some(scale) = scale_denominator(child) {
                        max_scale = scale;
                    }
                }
                _ if name.ends_with("Symbolizer") => {
                    let (symbolizer, label) = self.parse_symbolizer(child)?;
                    if let Some(label) = label {
                        style.set_label(symbolizer.id(), label);
                    }
                    rule.symbolizers.push(symbolizer);
                }
                _ => {}
            }
        }

        rule.set_scale_range(min_scale, max_scale);
        Ok(rule)
    }
}

/// A malformed denominator is logged and leaves the rule unbounded on that side.
fn scale_denominator(el: &XmlElement) -> Option<f64> {
    let text = el.text();
    match text.trim().parse::<f64>() {
        Ok(scale) => Some(scale),
        Err(e) => {
            warn!(location = %el.location(), value = %text, error = %e, "Invalid {}, keeping the default", el.name);
            None
        }
    }
}

/// Parse a style document from text.
///
/// A bare symbolizer becomes a single rule style. Relative resources are
/// resolved against `base_dir`.
pub fn parse_style(xml: &str, base_dir: Option<&Path>) -> ParseResult<Style> {
    let root = XmlElement::parse(xml)?;
    SymbologyParser::for_document(&root, base_dir)
        .parse(&root)
        .map(ParsedStyle::into_style)
}

/// Parse every named or user layer of an SLD document with its styles.
pub fn parse_sld_layers(xml: &str, base_dir: Option<&Path>) -> ParseResult<Vec<crate::NamedLayerStyles>> {
    let root = XmlElement::parse(xml)?;
    let parser = SymbologyParser::for_document(&root, base_dir);
    parse_layers(&parser, &root)
}

/// Parse a style file, using its directory for relative resources.
pub fn parse_style_file(path: &Path) -> ParseResult<Style> {
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::Resource {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let base: Option<PathBuf> = path.parent().map(Path::to_path_buf);
    parse_style(&text, base.as_deref())
}
