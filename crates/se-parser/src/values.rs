//! Attribute values that are either literal text or text mixed with expressions.

use symbology::{Chain, Color, TemplatePart, TextTemplate};
use tracing::warn;

use crate::error::ParseResult;
use crate::filter::parse_expression;
use crate::xml::{XmlElement, XmlNode};

/// Split mixed content into text fragments and expressions.
///
/// Outer whitespace of the whole value is dropped, inner text is kept verbatim.
pub(crate) fn template(el: &XmlElement) -> ParseResult<TextTemplate> {
    let mut parts = Vec::new();
    for node in &el.nodes {
        match node {
            XmlNode::Text(text) => match parts.last_mut() {
                Some(TemplatePart::Text(prev)) => prev.push_str(text),
                _ => parts.push(TemplatePart::Text(text.clone())),
            },
            XmlNode::Element(child) => parts.push(TemplatePart::Expression {
                expr: parse_expression(child)?,
                location: child.location(),
            }),
        }
    }

    if let Some(TemplatePart::Text(first)) = parts.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(TemplatePart::Text(last)) = parts.last_mut() {
        *last = last.trim_end().to_string();
    }
    parts.retain(|p| !matches!(p, TemplatePart::Text(t) if t.is_empty()));

    Ok(TextTemplate::new(parts))
}

/// Apply a literal value now, or defer a mixed value to a new continuation.
///
/// Literal values call `updater` on `base` immediately and return `chain`
/// unchanged; values containing expressions append a step to `chain`.
pub(crate) fn update_or_continue<T, F>(
    el: &XmlElement,
    base: &mut T,
    chain: Chain<T>,
    updater: F,
) -> ParseResult<Chain<T>>
where
    T: 'static,
    F: Fn(&mut T, &str) + Send + Sync + 'static,
{
    let template = template(el)?;
    if template.is_constant() {
        let text: String = template
            .parts
            .iter()
            .filter_map(|p| match p {
                TemplatePart::Text(t) => Some(t.as_str()),
                TemplatePart::Expression { .. } => None,
            })
            .collect();
        if text.is_empty() {
            warn!(element = %el.name, location = %el.location(), "Expression was empty");
        }
        updater(base, &text);
        return Ok(chain);
    }
    Ok(Some(template.into_continuation(chain, updater)))
}

/// Parse a number, logging and returning `None` on failure.
pub(crate) fn number(text: &str, what: &str) -> Option<f64> {
    match text.trim().parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(value = %text, parameter = what, "Value is not a number, keeping the previous value");
            None
        }
    }
}

/// Parse a `#RRGGBB` color, logging and returning `None` on failure.
pub(crate) fn color(text: &str, what: &str) -> Option<Color> {
    let parsed = Color::parse(text);
    if parsed.is_none() {
        warn!(value = %text, parameter = what, "Value is not a color, keeping the previous value");
    }
    parsed
}

/// Apply a color literal to `current`, logging and returning `None` on failure.
pub(crate) fn color_onto(current: Color, text: &str, what: &str) -> Option<Color> {
    let applied = current.with_literal(text);
    if applied.is_none() {
        warn!(value = %text, parameter = what, "Value is not a color, keeping the previous value");
    }
    applied
}

/// An updater that parses a number and hands it to `set`.
pub(crate) fn numeric<T>(what: &'static str, set: fn(&mut T, f64)) -> impl Fn(&mut T, &str) + Send + Sync + 'static
where
    T: 'static,
{
    move |target, text| {
        if let Some(n) = number(text, what) {
            set(target, n);
        }
    }
}

/// An updater that parses a boolean flag and hands it to `set`.
pub(crate) fn flag<T>(set: fn(&mut T, bool)) -> impl Fn(&mut T, &str) + Send + Sync + 'static
where
    T: 'static,
{
    move |target, text| set(target, boolean(text))
}

pub(crate) fn boolean(text: &str) -> bool {
    let t = text.trim();
    t == "1" || t.eq_ignore_ascii_case("true")
}

/// Split a dash array on commas if present, otherwise on whitespace.
pub(crate) fn dash_array(text: &str) -> Option<Vec<f64>> {
    let parts: Vec<&str> = if text.contains(',') {
        text.split(',').collect()
    } else {
        text.split_whitespace().collect()
    };
    let dashes: Option<Vec<f64>> = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| number(p, "stroke-dasharray"))
        .collect();
    dashes.filter(|d| !d.is_empty())
}
