//! Tests for continuation chains and rule selection.

use std::sync::Arc;

use style_common::{ComparisonOp, EvalContext, Expression, Feature, Filter, QName, SimpleFeature};
use symbology::{
    AnySymbolizer, Color, Continuation, Deferred, LineStyling, PointStyling, Rule, RuleFilter,
    Style, Styling, Symbolizer, TemplatePart, TextStyling, TextTemplate,
};

fn feature(kind: &str) -> SimpleFeature {
    SimpleFeature::new(QName::local("Roads"))
        .with_property("kind", kind)
        .with_property("width", 3i64)
}

fn kind_is(kind: &str) -> RuleFilter {
    RuleFilter::Filter(Filter::Comparison {
        op: ComparisonOp::EqualTo,
        left: Expression::property("kind"),
        right: Expression::literal(kind),
        match_case: true,
    })
}

fn line(name: &str) -> AnySymbolizer {
    AnySymbolizer::Line(Symbolizer::new(LineStyling::default(), None).with_name(Some(name.into())))
}

fn names(style: &Style, feature: &SimpleFeature, scale: f64) -> Vec<String> {
    style
        .select(Some(feature as &dyn Feature), &EvalContext::new(scale))
        .iter()
        .filter_map(|s| s.name().map(str::to_string))
        .collect()
}

// ============================================================================
// Continuation tests
// ============================================================================

#[test]
fn test_chain_applies_predecessor_first() {
    let first = Continuation::<Vec<u8>>::new(None, |v, _, _| v.push(1));
    let second = Continuation::new(Some(first), |v: &mut Vec<u8>, _, _| v.push(2));
    let third = Continuation::new(Some(second), |v: &mut Vec<u8>, _, _| v.push(3));
    assert_eq!(third.len(), 3);

    let mut out = Vec::new();
    third.evaluate(&mut out, &feature("a"), &EvalContext::default());
    assert_eq!(out, vec![1, 2, 3]);
}

#[test]
fn test_static_value_is_shared() {
    let deferred = Deferred::resolved(LineStyling::default());
    let ctx = EvalContext::default();
    let a = deferred.evaluate(&feature("a"), &ctx);
    let b = deferred.evaluate(&feature("b"), &ctx);
    assert!(std::ptr::eq(a.as_ref(), &deferred.base));
    assert!(std::ptr::eq(b.as_ref(), &deferred.base));
}

#[test]
fn test_dynamic_value_never_touches_template() {
    let chain = TextTemplate::new(vec![TemplatePart::Expression {
        expr: Expression::property("width"),
        location: "line 1, column 1".into(),
    }])
    .into_continuation(None, |l: &mut LineStyling, s| {
        if let Ok(w) = s.parse() {
            l.stroke.width = w;
        }
    });
    let deferred = Deferred::new(LineStyling::default(), Some(chain));

    let value = deferred.evaluate(&feature("a"), &EvalContext::default());
    assert_eq!(value.stroke.width, 3.0);
    assert_eq!(deferred.base.stroke.width, 1.0);
}

#[test]
fn test_nested_continuation_updates_sub_value() {
    let inner = Continuation::new(None, |c: &mut Color, _, _| *c = Color::rgb(255, 0, 0));
    let outer = Continuation::nested(None, inner, |p: &mut PointStyling| Some(&mut p.graphic.mark.fill.color));

    let mut value = PointStyling::default();
    outer.evaluate(&mut value, &feature("a"), &EvalContext::default());
    assert_eq!(value.graphic.mark.fill.color, Color::rgb(255, 0, 0));
}

#[test]
fn test_template_skips_failing_fragment() {
    let template = TextTemplate::new(vec![
        TemplatePart::Text("Lanes: ".into()),
        TemplatePart::Expression {
            expr: Expression::Add(
                Box::new(Expression::property("kind")),
                Box::new(Expression::literal("1")),
            ),
            location: "line 3, column 7".into(),
        },
        TemplatePart::Text("!".into()),
    ]);
    assert_eq!(template.render(&feature("a"), &EvalContext::default()), "Lanes: !");
}

// ============================================================================
// Rule selection tests
// ============================================================================

#[test]
fn test_else_rule_fires_only_without_match() {
    let mut else_rule = Rule::new(vec![line("S2")]);
    else_rule.filter = RuleFilter::Else;
    let mut a_rule = Rule::new(vec![line("S1")]);
    a_rule.filter = kind_is("A");

    let style = Style::new(None, vec![a_rule, else_rule]);
    assert_eq!(names(&style, &feature("A"), 1000.0), vec!["S1"]);
    assert_eq!(names(&style, &feature("B"), 1000.0), vec!["S2"]);
}

#[test]
fn test_else_rule_depends_on_accumulator_not_filter_value() {
    let mut never = Rule::new(vec![line("S0")]);
    never.filter = RuleFilter::Filter(Filter::Exclude);
    let mut a_rule = Rule::new(vec![line("S1")]);
    a_rule.filter = kind_is("A");
    let mut else_rule = Rule::new(vec![line("S2")]);
    else_rule.filter = RuleFilter::Else;

    let style = Style::new(None, vec![never, a_rule, else_rule]);
    assert_eq!(names(&style, &feature("C"), 1000.0), vec!["S2"]);
    assert_eq!(names(&style, &feature("A"), 1000.0), vec!["S1"]);
}

#[test]
fn test_else_marker_is_false_on_its_own() {
    assert!(!RuleFilter::Else.evaluate(&feature("A"), &EvalContext::default()));
}

#[test]
fn test_unscaled_rule_matches_any_scale() {
    let style = Style::new(None, vec![Rule::new(vec![line("S1")])]);
    assert_eq!(names(&style, &feature("A"), 0.0), vec!["S1"]);
    assert_eq!(names(&style, &feature("A"), 1e12), vec!["S1"]);
}

#[test]
fn test_rule_scale_range_is_half_open() {
    let mut rule = Rule::new(vec![line("S1")]);
    rule.min_scale = 1000.0;
    rule.max_scale = 5000.0;
    let style = Style::new(None, vec![rule]);

    assert!(names(&style, &feature("A"), 999.0).is_empty());
    assert_eq!(names(&style, &feature("A"), 1000.0), vec!["S1"]);
    assert!(names(&style, &feature("A"), 5000.0).is_empty());
    assert!(style.is_empty_at(5000.0));
}

#[test]
fn test_symbolizer_scale_range_narrows_rule() {
    let detail = AnySymbolizer::Line(
        Symbolizer::new(LineStyling::default(), None)
            .with_name(Some("detail".into()))
            .with_scale_range(f64::NEG_INFINITY, 2000.0),
    );
    let style = Style::new(None, vec![Rule::new(vec![line("S1"), detail])]);

    assert_eq!(names(&style, &feature("A"), 1000.0), vec!["S1", "detail"]);
    assert_eq!(names(&style, &feature("A"), 3000.0), vec!["S1"]);

    let mut rule = Rule::new(vec![line("S1")]);
    rule.set_scale_range(1000.0, 5000.0);
    assert!(rule.symbolizers[0].applies_at(1000.0));
    assert!(!rule.symbolizers[0].applies_at(5000.0));
}

#[test]
fn test_rules_without_feature_always_fire() {
    let mut a_rule = Rule::new(vec![line("S1")]);
    a_rule.filter = kind_is("A");
    let mut else_rule = Rule::new(vec![line("S2")]);
    else_rule.filter = RuleFilter::Else;
    let style = Style::new(None, vec![a_rule, else_rule]);

    assert_eq!(style.select(None, &EvalContext::new(1.0)).len(), 2);
}

#[test]
fn test_text_symbolizer_label_is_evaluated() {
    let symbolizer = Symbolizer::new(TextStyling::default(), None);
    let chain = TextTemplate::new(vec![
        TemplatePart::Text("Kind ".into()),
        TemplatePart::Expression {
            expr: Expression::property("kind"),
            location: "line 1, column 1".into(),
        },
    ])
    .into_continuation(None, |s: &mut String, text| *s = text.to_string());
    let style = Style::single(
        AnySymbolizer::Text(symbolizer),
        Some(Deferred::new(String::new(), Some(chain))),
    );

    let evaluated = style.evaluate(&feature("B"), &EvalContext::new(1.0));
    assert_eq!(evaluated.len(), 1);
    assert_eq!(evaluated[0].label.as_deref(), Some("Kind B"));
    assert!(matches!(evaluated[0].styling, Styling::Text(_)));
}

#[test]
fn test_shared_continuation_is_identity_compared() {
    let chain = Continuation::new(None, |_: &mut LineStyling, _, _| {});
    let a = Deferred::new(LineStyling::default(), Some(Arc::clone(&chain)));
    let b = Deferred::new(LineStyling::default(), Some(chain));
    let c = Deferred::new(
        LineStyling::default(),
        Some(Continuation::new(None, |_: &mut LineStyling, _, _| {})),
    );
    assert_eq!(a, b);
    assert_ne!(a, c);
}
