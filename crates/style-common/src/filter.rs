//! Boolean predicates over features.

use std::cmp::Ordering;

use crate::bbox::BoundingBox;
use crate::context::EvalContext;
use crate::error::EvalResult;
use crate::expression::Expression;
use crate::feature::{Feature, Value};

/// Binary comparison operators of the filter encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    EqualTo,
    NotEqualTo,
    LessThan,
    GreaterThan,
    LessThanOrEqualTo,
    GreaterThanOrEqualTo,
}

impl ComparisonOp {
    /// Map an element local name (`PropertyIsEqualTo`, ...) to an operator.
    pub fn from_element(name: &str) -> Option<Self> {
        match name {
            "PropertyIsEqualTo" => Some(Self::EqualTo),
            "PropertyIsNotEqualTo" => Some(Self::NotEqualTo),
            "PropertyIsLessThan" => Some(Self::LessThan),
            "PropertyIsGreaterThan" => Some(Self::GreaterThan),
            "PropertyIsLessThanOrEqualTo" => Some(Self::LessThanOrEqualTo),
            "PropertyIsGreaterThanOrEqualTo" => Some(Self::GreaterThanOrEqualTo),
            _ => None,
        }
    }

    fn accepts(self, ord: Ordering) -> bool {
        match self {
            Self::EqualTo => ord == Ordering::Equal,
            Self::NotEqualTo => ord != Ordering::Equal,
            Self::LessThan => ord == Ordering::Less,
            Self::GreaterThan => ord == Ordering::Greater,
            Self::LessThanOrEqualTo => ord != Ordering::Greater,
            Self::GreaterThanOrEqualTo => ord != Ordering::Less,
        }
    }
}

/// A filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Include,
    Exclude,
    Comparison {
        op: ComparisonOp,
        left: Expression,
        right: Expression,
        match_case: bool,
    },
    Like {
        expr: Expression,
        pattern: String,
        wild_card: char,
        single_char: char,
        escape_char: char,
        match_case: bool,
    },
    IsNull(Expression),
    Between {
        expr: Expression,
        lower: Expression,
        upper: Expression,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Id(Vec<String>),
    Bbox {
        property: Option<String>,
        envelope: BoundingBox,
    },
}

impl Filter {
    pub fn evaluate(&self, feature: &dyn Feature, ctx: &EvalContext) -> EvalResult<bool> {
        match self {
            Filter::Include => Ok(true),
            Filter::Exclude => Ok(false),
            Filter::Comparison {
                op,
                left,
                right,
                match_case,
            } => {
                let lhs = left.evaluate(feature, ctx)?;
                let rhs = right.evaluate(feature, ctx)?;
                Ok(lhs.iter().any(|l| {
                    rhs.iter()
                        .any(|r| l.compare(r, *match_case).is_some_and(|ord| op.accepts(ord)))
                }))
            }
            Filter::Like {
                expr,
                pattern,
                wild_card,
                single_char,
                escape_char,
                match_case,
            } => {
                let tokens = tokenize_like(pattern, *wild_card, *single_char, *escape_char, *match_case);
                Ok(expr.evaluate(feature, ctx)?.iter().any(|v| {
                    let text = if *match_case {
                        v.to_string()
                    } else {
                        v.to_string().to_lowercase()
                    };
                    like_matches(&tokens, &text.chars().collect::<Vec<_>>())
                }))
            }
            Filter::IsNull(expr) => Ok(expr.evaluate(feature, ctx)?.iter().all(Value::is_null)),
            Filter::Between { expr, lower, upper } => {
                let (Some(v), Some(lo), Some(hi)) = (
                    expr.evaluate_first(feature, ctx)?,
                    lower.evaluate_first(feature, ctx)?,
                    upper.evaluate_first(feature, ctx)?,
                ) else {
                    return Ok(false);
                };
                Ok(v.compare(&lo, true).is_some_and(|o| o != Ordering::Less)
                    && v.compare(&hi, true).is_some_and(|o| o != Ordering::Greater))
            }
            Filter::And(operands) => {
                for op in operands {
                    if !op.evaluate(feature, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Filter::Or(operands) => {
                for op in operands {
                    if op.evaluate(feature, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Filter::Not(inner) => Ok(!inner.evaluate(feature, ctx)?),
            Filter::Id(ids) => Ok(feature.id().is_some_and(|id| ids.iter().any(|i| i == id))),
            Filter::Bbox { property, envelope } => Ok(feature
                .geometry(property.as_deref())
                .and_then(|g| g.envelope())
                .is_some_and(|env| env.intersects(envelope))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum LikeToken {
    Any,
    One,
    Char(char),
}

fn tokenize_like(pattern: &str, wild: char, single: char, escape: char, match_case: bool) -> Vec<LikeToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let token = if c == escape {
            match chars.next() {
                Some(n) => LikeToken::Char(n),
                None => LikeToken::Char(c),
            }
        } else if c == wild {
            LikeToken::Any
        } else if c == single {
            LikeToken::One
        } else {
            LikeToken::Char(c)
        };
        tokens.push(match token {
            LikeToken::Char(ch) if !match_case => {
                LikeToken::Char(ch.to_lowercase().next().unwrap_or(ch))
            }
            t => t,
        });
    }
    tokens
}

/// Wildcard match with backtracking over the last `Any` token.
fn like_matches(tokens: &[LikeToken], text: &[char]) -> bool {
    let (mut t, mut s) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while s < text.len() {
        match tokens.get(t) {
            Some(LikeToken::Any) => {
                star = Some((t, s));
                t += 1;
            }
            Some(LikeToken::One) => {
                t += 1;
                s += 1;
            }
            Some(LikeToken::Char(c)) if *c == text[s] => {
                t += 1;
                s += 1;
            }
            _ => match star {
                Some((st, ss)) => {
                    t = st + 1;
                    s = ss + 1;
                    star = Some((st, ss + 1));
                }
                None => return false,
            },
        }
    }
    tokens[t..].iter().all(|tok| *tok == LikeToken::Any)
}
