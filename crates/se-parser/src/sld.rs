//! Styled Layer Descriptor wrappers around feature type styles.

use symbology::Style;
use tracing::warn;

use crate::error::ParseResult;
use crate::style::SymbologyParser;
use crate::values::boolean;
use crate::xml::XmlElement;

/// The styles defined for one layer of an SLD document.
#[derive(Debug, Clone)]
pub struct NamedLayerStyles {
    pub layer: String,
    /// User styles in document order, the default style first.
    pub styles: Vec<Style>,
    /// Names of `NamedStyle` references to styles configured elsewhere.
    pub named_styles: Vec<String>,
}

impl NamedLayerStyles {
    pub fn default_style(&self) -> Option<&Style> {
        self.styles.first()
    }
}

/// Parse a `UserStyle`, returning the style and whether it is flagged as default.
///
/// Several feature type styles are merged into one style in document order.
pub(crate) fn parse_user_style(parser: &SymbologyParser, el: &XmlElement) -> ParseResult<(Style, bool)> {
    let mut style = Style::new(None, Vec::new());
    let mut is_default = false;

    for child in el.elements() {
        match child.name.as_str() {
            "Name" => style.name = Some(child.text()),
            "Title" => style.title = Some(child.text()),
            "Description" => style.title = child.child_text("Title").or(style.title.take()),
            "IsDefault" => is_default = boolean(&child.text()),
            "FeatureTypeStyle" | "CoverageStyle" => {
                let mut part = parser.parse_feature_type_style(child)?;
                if style.feature_type.is_none() {
                    style.feature_type = part.feature_type.take();
                }
                if style.name.is_none() {
                    style.name = part.name.take();
                }
                style.absorb_labels(&mut part);
                style.rules.append(&mut part.rules);
            }
            _ => {}
        }
    }

    Ok((style, is_default))
}

fn parse_layer(parser: &SymbologyParser, el: &XmlElement) -> ParseResult<NamedLayerStyles> {
    let layer = el.child_text("Name").unwrap_or_default();
    if layer.is_empty() {
        warn!(location = %el.location(), "Layer in styled layer descriptor has no name");
    }

    let mut styles = Vec::new();
    let mut named_styles = Vec::new();
    for child in el.elements() {
        match child.name.as_str() {
            "UserStyle" => {
                let (style, is_default) = parse_user_style(parser, child)?;
                if is_default {
                    styles.insert(0, style);
                } else {
                    styles.push(style);
                }
            }
            "NamedStyle" => named_styles.extend(child.child_text("Name")),
            _ => {}
        }
    }

    Ok(NamedLayerStyles {
        layer,
        styles,
        named_styles,
    })
}

/// Collect the layers of an SLD root, or of a single layer element.
pub(crate) fn parse_layers(parser: &SymbologyParser, root: &XmlElement) -> ParseResult<Vec<NamedLayerStyles>> {
    if root.is("NamedLayer") || root.is("UserLayer") {
        return Ok(vec![parse_layer(parser, root)?]);
    }
    root.elements()
        .filter(|e| e.is("NamedLayer") || e.is("UserLayer"))
        .map(|e| parse_layer(parser, e))
        .collect()
}
