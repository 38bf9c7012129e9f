//! Deferred per-feature updates of styling values.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use style_common::{EvalContext, Expression, Feature};
use tracing::warn;

type Step<T> = dyn Fn(&mut T, &dyn Feature, &EvalContext) + Send + Sync;

/// One link of an update chain.
///
/// Applying a continuation first applies its predecessor, so updates run in
/// the order their attributes appeared in the style document.
pub struct Continuation<T> {
    previous: Option<Arc<Continuation<T>>>,
    step: Box<Step<T>>,
}

/// An optional continuation chain. `None` means the value is static.
pub type Chain<T> = Option<Arc<Continuation<T>>>;

impl<T: 'static> Continuation<T> {
    /// Append an update step to `previous`.
    pub fn new<F>(previous: Chain<T>, step: F) -> Arc<Self>
    where
        F: Fn(&mut T, &dyn Feature, &EvalContext) + Send + Sync + 'static,
    {
        Arc::new(Self {
            previous,
            step: Box::new(step),
        })
    }

    /// Append a step that runs `inner` on a sub-value of `T`.
    ///
    /// The step is a no-op when `access` finds no sub-value.
    pub fn nested<U, A>(previous: Chain<T>, inner: Arc<Continuation<U>>, access: A) -> Arc<Self>
    where
        U: 'static,
        A: Fn(&mut T) -> Option<&mut U> + Send + Sync + 'static,
    {
        Self::new(previous, move |base, feature, ctx| {
            if let Some(sub) = access(base) {
                inner.evaluate(sub, feature, ctx);
            }
        })
    }

    /// Like [`Continuation::nested`], but passes a `None` inner chain through unchanged.
    pub fn nest<U, A>(previous: Chain<T>, inner: Chain<U>, access: A) -> Chain<T>
    where
        U: 'static,
        A: Fn(&mut T) -> Option<&mut U> + Send + Sync + 'static,
    {
        match inner {
            Some(inner) => Some(Self::nested(previous, inner, access)),
            None => previous,
        }
    }

    pub fn evaluate(&self, base: &mut T, feature: &dyn Feature, ctx: &EvalContext) {
        if let Some(previous) = &self.previous {
            previous.evaluate(base, feature, ctx);
        }
        (self.step)(base, feature, ctx);
    }

    /// Number of steps in the chain ending here.
    pub fn len(&self) -> usize {
        1 + self.previous.as_ref().map_or(0, |p| p.len())
    }
}

impl<T> fmt::Debug for Continuation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut steps = 1;
        let mut current = &self.previous;
        while let Some(p) = current {
            steps += 1;
            current = &p.previous;
        }
        f.debug_struct("Continuation").field("steps", &steps).finish()
    }
}

/// A base value plus the chain that specializes it per feature.
#[derive(Debug, Clone)]
pub struct Deferred<T> {
    pub base: T,
    pub continuation: Chain<T>,
}

impl<T: Clone + 'static> Deferred<T> {
    pub fn resolved(base: T) -> Self {
        Self {
            base,
            continuation: None,
        }
    }

    pub fn new(base: T, continuation: Chain<T>) -> Self {
        Self { base, continuation }
    }

    /// True when no per-feature work is needed.
    pub fn is_resolved(&self) -> bool {
        self.continuation.is_none()
    }

    /// The value for `feature`: the shared base when static, an updated copy otherwise.
    pub fn evaluate(&self, feature: &dyn Feature, ctx: &EvalContext) -> Cow<'_, T> {
        match &self.continuation {
            None => Cow::Borrowed(&self.base),
            Some(chain) => {
                let mut value = self.base.clone();
                chain.evaluate(&mut value, feature, ctx);
                Cow::Owned(value)
            }
        }
    }
}

impl<T: PartialEq> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        let same_chain = match (&self.continuation, &other.continuation) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_chain && self.base == other.base
    }
}

/// A fragment of mixed text content.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    /// An expression with the source location used in diagnostics.
    Expression { expr: Expression, location: String },
}

/// Text interleaved with expressions, rendered per feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextTemplate {
    pub parts: Vec<TemplatePart>,
}

impl TextTemplate {
    pub fn new(parts: Vec<TemplatePart>) -> Self {
        Self { parts }
    }

    /// Whether the template contains no expressions.
    pub fn is_constant(&self) -> bool {
        self.parts
            .iter()
            .all(|p| matches!(p, TemplatePart::Text(_)))
    }

    /// Concatenate text and the first value of every expression.
    ///
    /// Expressions without a value or failing to evaluate contribute nothing.
    pub fn render(&self, feature: &dyn Feature, ctx: &EvalContext) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Expression { expr, location } => match expr.evaluate(feature, ctx) {
                    Ok(values) => match values.first() {
                        Some(v) => out.push_str(&v.to_string()),
                        None => warn!(location = %location, "Expression in style evaluated to null"),
                    },
                    Err(e) => warn!(
                        error = %e,
                        location = %location,
                        "Evaluating expression in style failed"
                    ),
                },
            }
        }
        out
    }

    /// Build a continuation that renders this template and hands the text to `updater`.
    pub fn into_continuation<T, U>(self, previous: Chain<T>, updater: U) -> Arc<Continuation<T>>
    where
        T: 'static,
        U: Fn(&mut T, &str) + Send + Sync + 'static,
    {
        Continuation::new(previous, move |base, feature, ctx| {
            let text = self.render(feature, ctx);
            updater(base, &text);
        })
    }
}
