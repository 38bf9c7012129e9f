//! Filter Encoding 1.1 decoding of expressions and predicates.

use style_common::{BoundingBox, ComparisonOp, Expression, Filter, Value};

use crate::error::{ParseError, ParseResult};
use crate::xml::XmlElement;

fn unexpected(el: &XmlElement, expected: &str) -> ParseError {
    ParseError::Unexpected {
        expected: expected.to_string(),
        found: el.name.clone(),
        location: el.location(),
    }
}

fn first_child<'a>(el: &'a XmlElement, what: &str) -> ParseResult<&'a XmlElement> {
    el.first_element().ok_or_else(|| ParseError::Missing {
        element: what.to_string(),
        parent: el.name.clone(),
        location: el.location(),
    })
}

/// Decode an expression element (`PropertyName`, `Literal`, arithmetic, `Function`).
pub fn parse_expression(el: &XmlElement) -> ParseResult<Expression> {
    match el.name.as_str() {
        "PropertyName" | "ValueReference" => Ok(Expression::PropertyName(el.text())),
        "Literal" => Ok(Expression::Literal(Value::String(el.text()))),
        "Add" | "Sub" | "Mul" | "Div" => {
            let mut operands = el.elements();
            let (Some(a), Some(b)) = (operands.next(), operands.next()) else {
                return Err(ParseError::Missing {
                    element: "operand".into(),
                    parent: el.name.clone(),
                    location: el.location(),
                });
            };
            let (a, b) = (Box::new(parse_expression(a)?), Box::new(parse_expression(b)?));
            Ok(match el.name.as_str() {
                "Add" => Expression::Add(a, b),
                "Sub" => Expression::Sub(a, b),
                "Mul" => Expression::Mul(a, b),
                _ => Expression::Div(a, b),
            })
        }
        "Function" => {
            let name = el.attr("name").ok_or_else(|| ParseError::Invalid {
                what: "function".into(),
                location: el.location(),
                message: "missing name attribute".into(),
            })?;
            let args = el.elements().map(parse_expression).collect::<ParseResult<_>>()?;
            Ok(Expression::Function {
                name: name.to_string(),
                args,
            })
        }
        _ => Err(unexpected(el, "an expression")),
    }
}

fn flag(el: &XmlElement, name: &str, default: bool) -> bool {
    el.attr(name)
        .map(|v| matches!(v.trim(), "true" | "1"))
        .unwrap_or(default)
}

fn single_char(el: &XmlElement, names: &[&str], default: char) -> char {
    names
        .iter()
        .find_map(|n| el.attr(n))
        .and_then(|v| v.chars().next())
        .unwrap_or(default)
}

/// Decode an `ogc:Filter` element.
pub fn parse_filter(el: &XmlElement) -> ParseResult<Filter> {
    let ids: Vec<String> = el
        .elements()
        .filter(|e| e.is("FeatureId") || e.is("GmlObjectId"))
        .filter_map(|e| e.attr("fid").or_else(|| e.attr("id")).map(str::to_string))
        .collect();
    if !ids.is_empty() {
        return Ok(Filter::Id(ids));
    }
    parse_operator(first_child(el, "filter operator")?)
}

/// Decode a single filter operator element.
pub fn parse_operator(el: &XmlElement) -> ParseResult<Filter> {
    if let Some(op) = ComparisonOp::from_element(&el.name) {
        let mut operands = el.elements();
        let (Some(left), Some(right)) = (operands.next(), operands.next()) else {
            return Err(ParseError::Missing {
                element: "operand".into(),
                parent: el.name.clone(),
                location: el.location(),
            });
        };
        return Ok(Filter::Comparison {
            op,
            left: parse_expression(left)?,
            right: parse_expression(right)?,
            match_case: flag(el, "matchCase", true),
        });
    }

    match el.name.as_str() {
        "And" | "Or" => {
            let operands = el.elements().map(parse_operator).collect::<ParseResult<Vec<_>>>()?;
            Ok(if el.is("And") {
                Filter::And(operands)
            } else {
                Filter::Or(operands)
            })
        }
        "Not" => Ok(Filter::Not(Box::new(parse_operator(first_child(el, "operand")?)?))),
        "PropertyIsLike" => {
            let mut operands = el.elements();
            let expr = operands.next().ok_or_else(|| ParseError::Missing {
                element: "PropertyName".into(),
                parent: el.name.clone(),
                location: el.location(),
            })?;
            let pattern = operands.next().map(XmlElement::text).unwrap_or_default();
            Ok(Filter::Like {
                expr: parse_expression(expr)?,
                pattern,
                wild_card: single_char(el, &["wildCard"], '*'),
                single_char: single_char(el, &["singleChar"], '?'),
                escape_char: single_char(el, &["escapeChar", "escape"], '\\'),
                match_case: flag(el, "matchCase", true),
            })
        }
        "PropertyIsNull" => Ok(Filter::IsNull(parse_expression(first_child(el, "PropertyName")?)?)),
        "PropertyIsBetween" => {
            let expr = first_child(el, "expression")?;
            let lower = first_child(el.require("LowerBoundary")?, "expression")?;
            let upper = first_child(el.require("UpperBoundary")?, "expression")?;
            Ok(Filter::Between {
                expr: parse_expression(expr)?,
                lower: parse_expression(lower)?,
                upper: parse_expression(upper)?,
            })
        }
        "BBOX" => parse_bbox(el),
        "FeatureId" | "GmlObjectId" => Ok(Filter::Id(
            el.attr("fid")
                .or_else(|| el.attr("id"))
                .map(|id| vec![id.to_string()])
                .unwrap_or_default(),
        )),
        _ => Err(unexpected(el, "a filter operator")),
    }
}

fn parse_coords(text: &str) -> Vec<f64> {
    text.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

fn parse_bbox(el: &XmlElement) -> ParseResult<Filter> {
    let property = el.child("PropertyName").map(XmlElement::text);
    let invalid = |message: &str| ParseError::Invalid {
        what: "BBOX".into(),
        location: el.location(),
        message: message.to_string(),
    };

    let coords = if let Some(envelope) = el.child("Envelope") {
        let mut lower = parse_coords(&envelope.child_text("lowerCorner").unwrap_or_default());
        lower.extend(parse_coords(&envelope.child_text("upperCorner").unwrap_or_default()));
        lower
    } else if let Some(bx) = el.child("Box") {
        parse_coords(&bx.child_text("coordinates").unwrap_or_default())
    } else {
        return Err(invalid("missing gml:Envelope or gml:Box"));
    };

    match coords.as_slice() {
        [min_x, min_y, max_x, max_y] => Ok(Filter::Bbox {
            property,
            envelope: BoundingBox::new(*min_x, *min_y, *max_x, *max_y),
        }),
        _ => Err(invalid("expected four coordinates")),
    }
}
