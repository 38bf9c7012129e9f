//! Expressions evaluated against features.

use crate::context::EvalContext;
use crate::error::{EvalError, EvalResult};
use crate::feature::{Feature, Value};

/// An OGC filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    PropertyName(String),
    Literal(Value),
    Add(Box<Expression>, Box<Expression>),
    Sub(Box<Expression>, Box<Expression>),
    Mul(Box<Expression>, Box<Expression>),
    Div(Box<Expression>, Box<Expression>),
    Function { name: String, args: Vec<Expression> },
}

impl Expression {
    pub fn property(name: impl Into<String>) -> Self {
        Expression::PropertyName(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Expression::Literal(value.into())
    }

    /// Evaluate to zero or more values. An empty result means "no value".
    pub fn evaluate(&self, feature: &dyn Feature, ctx: &EvalContext) -> EvalResult<Vec<Value>> {
        match self {
            Expression::PropertyName(path) => Ok(feature.property(path)),
            Expression::Literal(v) => Ok(vec![v.clone()]),
            Expression::Add(a, b) => arithmetic(a, b, feature, ctx, |x, y| x + y),
            Expression::Sub(a, b) => arithmetic(a, b, feature, ctx, |x, y| x - y),
            Expression::Mul(a, b) => arithmetic(a, b, feature, ctx, |x, y| x * y),
            Expression::Div(a, b) => arithmetic(a, b, feature, ctx, |x, y| x / y),
            Expression::Function { name, args } => call(name, args, feature, ctx),
        }
    }

    /// First value of the evaluation, if any.
    pub fn evaluate_first(&self, feature: &dyn Feature, ctx: &EvalContext) -> EvalResult<Option<Value>> {
        Ok(self.evaluate(feature, ctx)?.into_iter().next())
    }
}

fn numeric(value: &Value) -> EvalResult<f64> {
    value
        .as_f64()
        .ok_or_else(|| EvalError::NotNumeric(value.to_string()))
}

fn arithmetic(
    a: &Expression,
    b: &Expression,
    feature: &dyn Feature,
    ctx: &EvalContext,
    op: fn(f64, f64) -> f64,
) -> EvalResult<Vec<Value>> {
    let (Some(x), Some(y)) = (a.evaluate_first(feature, ctx)?, b.evaluate_first(feature, ctx)?) else {
        return Ok(Vec::new());
    };
    Ok(vec![Value::Double(op(numeric(&x)?, numeric(&y)?))])
}

fn first_string(arg: &Expression, feature: &dyn Feature, ctx: &EvalContext) -> EvalResult<String> {
    Ok(arg
        .evaluate_first(feature, ctx)?
        .map(|v| v.to_string())
        .unwrap_or_default())
}

fn expect_args(name: &str, args: &[Expression], expected: usize) -> EvalResult<()> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

fn call(name: &str, args: &[Expression], feature: &dyn Feature, ctx: &EvalContext) -> EvalResult<Vec<Value>> {
    let value = match name {
        "env" => {
            if args.is_empty() || args.len() > 2 {
                return Err(EvalError::Arity {
                    name: name.to_string(),
                    expected: 1,
                    got: args.len(),
                });
            }
            let key = first_string(&args[0], feature, ctx)?;
            match ctx.env(&key) {
                Some(v) => Value::String(v.to_string()),
                None => match args.get(1) {
                    Some(default) => return default.evaluate(feature, ctx),
                    None => return Ok(Vec::new()),
                },
            }
        }
        "scale" => {
            expect_args(name, args, 0)?;
            Value::Double(ctx.scale)
        }
        "Concatenate" | "strConcat" => {
            let mut out = String::new();
            for arg in args {
                out.push_str(&first_string(arg, feature, ctx)?);
            }
            Value::String(out)
        }
        "strToUpperCase" => {
            expect_args(name, args, 1)?;
            Value::String(first_string(&args[0], feature, ctx)?.to_uppercase())
        }
        "strToLowerCase" => {
            expect_args(name, args, 1)?;
            Value::String(first_string(&args[0], feature, ctx)?.to_lowercase())
        }
        "strTrim" => {
            expect_args(name, args, 1)?;
            Value::String(first_string(&args[0], feature, ctx)?.trim().to_string())
        }
        "strLength" => {
            expect_args(name, args, 1)?;
            Value::Integer(first_string(&args[0], feature, ctx)?.chars().count() as i64)
        }
        other => return Err(EvalError::UnknownFunction(other.to_string())),
    };
    Ok(vec![value])
}
