//! Tests for parsing SE 1.1 and SLD 1.0 documents.

use std::borrow::Cow;
use std::fs;

use se_parser::{parse_sld_layers, parse_style, Dialect, ParseError, ParsedStyle, SymbologyParser, XmlElement};
use style_common::{EvalContext, Feature, QName, SimpleFeature};
use symbology::{AnySymbolizer, Color, LineCap, LineJoin, Overlap, SimpleMark, Style};

const SE: &str = r#"xmlns:se="http://www.opengis.net/se" xmlns:ogc="http://www.opengis.net/ogc" xmlns:xlink="http://www.w3.org/1999/xlink""#;

const INLINE_SVG: &str = "PHN2ZyB4bWxucz0iaHR0cDovL3d3dy53My5vcmcvMjAwMC9zdmciIHdpZHRoPSIxMCIgaGVpZ2h0PSIyMCI+PHJlY3Qgd2lkdGg9IjEwIiBoZWlnaHQ9IjIwIi8+PC9zdmc+";

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="20"><rect width="10" height="20"/></svg>"#;

fn ctx() -> EvalContext {
    EvalContext::new(25_000.0)
}

fn feature() -> SimpleFeature {
    SimpleFeature::new(QName::local("Cities"))
}

fn first_symbolizer(style: &Style) -> &AnySymbolizer {
    &style.rules[0].symbolizers[0]
}

fn se_symbolizer(body: &str) -> String {
    body.replacen("Symbolizer>", &format!("Symbolizer {}>", SE), 1)
}

// ============================================================================
// Static attributes
// ============================================================================

#[test]
fn test_static_symbolizer_has_no_continuation() {
    let xml = se_symbolizer(
        r##"<se:PolygonSymbolizer>
            <se:Fill><se:SvgParameter name="fill">#00ff00</se:SvgParameter></se:Fill>
            <se:Stroke><se:SvgParameter name="stroke-width">2</se:SvgParameter></se:Stroke>
        </se:PolygonSymbolizer>"##,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Polygon(sym) = first_symbolizer(&style) else {
        panic!("expected a polygon symbolizer");
    };
    assert!(sym.is_static());

    let a = feature().with_property("x", 1i64);
    let b = feature().with_property("x", 2i64);
    let va = sym.evaluate(&a, &ctx());
    let vb = sym.evaluate(&b, &ctx());
    assert!(matches!(va, Cow::Borrowed(_)));
    assert!(matches!(vb, Cow::Borrowed(_)));
    assert_eq!(*va, *vb);
    assert_eq!(*va, *sym.base());
}

// ============================================================================
// Color and opacity updates
// ============================================================================

#[test]
fn test_dynamic_opacity_keeps_rgb() {
    let xml = se_symbolizer(
        r##"<se:LineSymbolizer>
            <se:Stroke>
                <se:SvgParameter name="stroke">#ff0000</se:SvgParameter>
                <se:SvgParameter name="stroke-opacity"><ogc:PropertyName>alpha</ogc:PropertyName></se:SvgParameter>
            </se:Stroke>
        </se:LineSymbolizer>"##,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Line(sym) = first_symbolizer(&style) else {
        panic!("expected a line symbolizer");
    };
    let value = sym.evaluate(&feature().with_property("alpha", 0.5), &ctx());
    assert_eq!(value.stroke.color, Color::rgba(255, 0, 0, 128));
    assert_eq!(sym.base().stroke.color, Color::rgb(255, 0, 0));
}

#[test]
fn test_dynamic_color_keeps_opacity() {
    let xml = se_symbolizer(
        r##"<se:LineSymbolizer>
            <se:Stroke>
                <se:SvgParameter name="stroke-opacity">0.5</se:SvgParameter>
                <se:SvgParameter name="stroke"><ogc:PropertyName>color</ogc:PropertyName></se:SvgParameter>
            </se:Stroke>
        </se:LineSymbolizer>"##,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Line(sym) = first_symbolizer(&style) else {
        panic!("expected a line symbolizer");
    };
    let value = sym.evaluate(&feature().with_property("color", "#00ff00"), &ctx());
    assert_eq!(value.stroke.color, Color::rgba(0, 255, 0, 128));
}

#[test]
fn test_color_literal_with_alpha() {
    let xml = se_symbolizer(
        r##"<se:PolygonSymbolizer>
            <se:Fill><se:SvgParameter name="fill">#80ff0000</se:SvgParameter></se:Fill>
        </se:PolygonSymbolizer>"##,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Polygon(sym) = first_symbolizer(&style) else {
        panic!("expected a polygon symbolizer");
    };
    let fill = sym.base().fill.as_ref().unwrap();
    assert_eq!(fill.color, Color::rgba(255, 0, 0, 128));
}

#[test]
fn test_bad_enum_values_keep_defaults() {
    let xml = se_symbolizer(
        r##"<se:LineSymbolizer>
            <se:Stroke>
                <se:SvgParameter name="stroke-linejoin">zigzag</se:SvgParameter>
                <se:SvgParameter name="stroke-linecap">pointy</se:SvgParameter>
                <se:SvgParameter name="stroke-width">wide</se:SvgParameter>
                <se:SvgParameter name="stroke-sparkle">yes</se:SvgParameter>
            </se:Stroke>
        </se:LineSymbolizer>"##,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Line(sym) = first_symbolizer(&style) else {
        panic!("expected a line symbolizer");
    };
    assert_eq!(sym.base().stroke.line_join, LineJoin::Round);
    assert_eq!(sym.base().stroke.line_cap, LineCap::Butt);
    assert_eq!(sym.base().stroke.width, 1.0);
}

// ============================================================================
// Labels
// ============================================================================

#[test]
fn test_label_with_expression() {
    let xml = format!(
        r#"<se:FeatureTypeStyle {}>
            <se:Rule>
                <se:TextSymbolizer>
                    <se:Label>Pop: <ogc:PropertyName>pop</ogc:PropertyName></se:Label>
                </se:TextSymbolizer>
            </se:Rule>
        </se:FeatureTypeStyle>"#,
        SE
    );
    let style = parse_style(&xml, None).unwrap();
    let sym = first_symbolizer(&style);
    let label = style.label(sym.id()).expect("label registered");

    let with_pop = feature().with_property("pop", "42");
    assert_eq!(label.evaluate(&with_pop, &ctx()).as_str(), "Pop: 42");

    let without_pop = feature();
    assert_eq!(label.evaluate(&without_pop, &ctx()).as_str(), "Pop: ");

    let evaluated = style.evaluate(&with_pop, &ctx());
    assert_eq!(evaluated[0].label.as_deref(), Some("Pop: 42"));
}

#[test]
fn test_label_with_failing_function() {
    let xml = format!(
        r#"<se:TextSymbolizer {}>
            <se:Label>Pop: <ogc:Function name="noSuchFunction"><ogc:PropertyName>pop</ogc:PropertyName></ogc:Function></se:Label>
        </se:TextSymbolizer>"#,
        SE
    );
    let style = parse_style(&xml, None).unwrap();
    let label = style.label(first_symbolizer(&style).id()).unwrap();
    let f = feature().with_property("pop", "42");
    assert_eq!(label.evaluate(&f, &ctx()).as_str(), "Pop: ");
}

// ============================================================================
// Dialects
// ============================================================================

#[test]
fn test_se_and_sld_polygons_are_equal() {
    let se = se_symbolizer(
        r##"<se:PolygonSymbolizer>
            <se:Fill><se:SvgParameter name="fill">#336699</se:SvgParameter></se:Fill>
            <se:Stroke><se:SvgParameter name="stroke-width">2</se:SvgParameter></se:Stroke>
        </se:PolygonSymbolizer>"##,
    );
    let sld = r##"<StyledLayerDescriptor xmlns="http://www.opengis.net/sld" version="1.0.0">
        <NamedLayer><Name>lakes</Name><UserStyle><FeatureTypeStyle><Rule>
            <PolygonSymbolizer>
                <Fill><CssParameter name="fill">#336699</CssParameter></Fill>
                <Stroke><CssParameter name="stroke-width">2</CssParameter></Stroke>
            </PolygonSymbolizer>
        </Rule></FeatureTypeStyle></UserStyle></NamedLayer>
    </StyledLayerDescriptor>"##;

    let se_style = parse_style(&se, None).unwrap();
    let sld_style = parse_style(sld, None).unwrap();
    let (AnySymbolizer::Polygon(a), AnySymbolizer::Polygon(b)) =
        (first_symbolizer(&se_style), first_symbolizer(&sld_style))
    else {
        panic!("expected polygon symbolizers");
    };
    assert_eq!(a.base(), b.base());
    assert_eq!(a.base().fill.as_ref().unwrap().color, Color::rgb(0x33, 0x66, 0x99));
}

#[test]
fn test_dialect_detection() {
    let se = XmlElement::parse(&format!("<se:FeatureTypeStyle {}/>", SE)).unwrap();
    assert_eq!(Dialect::detect(&se), Dialect::Se);
    let sld = XmlElement::parse(r#"<StyledLayerDescriptor xmlns="http://www.opengis.net/sld"/>"#).unwrap();
    assert_eq!(Dialect::detect(&sld), Dialect::Sld);
}

#[test]
fn test_sld_ignores_uom() {
    let sld = r#"<UserStyle xmlns="http://www.opengis.net/sld"><FeatureTypeStyle><Rule>
        <LineSymbolizer uom="http://www.opengeospatial.org/se/units/metre"><Stroke/></LineSymbolizer>
    </Rule></FeatureTypeStyle></UserStyle>"#;
    let style = parse_style(sld, None).unwrap();
    let AnySymbolizer::Line(sym) = first_symbolizer(&style) else {
        panic!("expected a line symbolizer");
    };
    assert_eq!(sym.base().uom, symbology::Uom::Pixel);
}

// ============================================================================
// Rules
// ============================================================================

#[test]
fn test_else_rule_selection() {
    let xml = format!(
        r#"<se:FeatureTypeStyle {}>
            <se:FeatureTypeName xmlns:app="http://www.deegree.org/app">app:Cities</se:FeatureTypeName>
            <se:Rule>
                <se:Name>capitals</se:Name>
                <ogc:Filter><ogc:PropertyIsEqualTo>
                    <ogc:PropertyName>capital</ogc:PropertyName><ogc:Literal>yes</ogc:Literal>
                </ogc:PropertyIsEqualTo></ogc:Filter>
                <se:PointSymbolizer><se:Name>star</se:Name></se:PointSymbolizer>
            </se:Rule>
            <se:Rule>
                <se:ElseFilter/>
                <se:PointSymbolizer><se:Name>dot</se:Name></se:PointSymbolizer>
            </se:Rule>
        </se:FeatureTypeStyle>"#,
        SE
    );
    let style = parse_style(&xml, None).unwrap();
    assert_eq!(
        style.feature_type,
        Some(QName::new("http://www.deegree.org/app", "Cities"))
    );

    let capital = feature().with_property("capital", "yes");
    let town = feature().with_property("capital", "no");
    let names = |f: &SimpleFeature| -> Vec<String> {
        style
            .select(Some(f as &dyn Feature), &ctx())
            .iter()
            .filter_map(|s| s.name().map(str::to_string))
            .collect()
    };
    assert_eq!(names(&capital), vec!["star".to_string()]);
    assert_eq!(names(&town), vec!["dot".to_string()]);
}

#[test]
fn test_filter_and_else_filter_conflict() {
    let xml = format!(
        r#"<se:FeatureTypeStyle {}><se:Rule>
            <ogc:Filter><ogc:PropertyIsNull><ogc:PropertyName>a</ogc:PropertyName></ogc:PropertyIsNull></ogc:Filter>
            <se:ElseFilter/>
        </se:Rule></se:FeatureTypeStyle>"#,
        SE
    );
    assert!(matches!(parse_style(&xml, None), Err(ParseError::Invalid { .. })));
}

#[test]
fn test_scale_denominators() {
    let xml = format!(
        r#"<se:FeatureTypeStyle {}>
            <se:Rule><se:MinScaleDenominator>1000</se:MinScaleDenominator><se:MaxScaleDenominator>50000</se:MaxScaleDenominator><se:LineSymbolizer/></se:Rule>
            <se:Rule><se:LineSymbolizer/></se:Rule>
        </se:FeatureTypeStyle>"#,
        SE
    );
    let style = parse_style(&xml, None).unwrap();
    assert_eq!(style.rules[0].min_scale, 1000.0);
    assert_eq!(style.rules[0].max_scale, 50000.0);
    assert_eq!(style.rules[1].min_scale, f64::NEG_INFINITY);
    assert!(style.rules[0].symbolizers[0].applies_at(1000.0));
    assert!(!style.rules[0].symbolizers[0].applies_at(50000.0));
    assert_eq!(style.rules_at(100.0).count(), 1);
    assert_eq!(style.rules_at(2000.0).count(), 2);
}

#[test]
fn test_bad_scale_denominator_keeps_default() {
    let xml = format!(
        r#"<se:FeatureTypeStyle {}>
            <se:Rule><se:MinScaleDenominator>abc</se:MinScaleDenominator><se:MaxScaleDenominator>50000</se:MaxScaleDenominator><se:LineSymbolizer/></se:Rule>
        </se:FeatureTypeStyle>"#,
        SE
    );
    let style = parse_style(&xml, None).unwrap();
    assert_eq!(style.rules[0].min_scale, f64::NEG_INFINITY);
    assert_eq!(style.rules[0].max_scale, 50000.0);
    assert_eq!(style.rules_at(10.0).count(), 1);
}

#[test]
fn test_malformed_xml_is_an_error() {
    assert!(matches!(parse_style("<se:Rule", None), Err(_)));
    assert!(matches!(
        parse_style("<Unrelated/>", None),
        Err(ParseError::Unexpected { .. })
    ));
}

// ============================================================================
// SLD layers
// ============================================================================

#[test]
fn test_sld_layers_default_first() {
    let sld = r#"<StyledLayerDescriptor xmlns="http://www.opengis.net/sld">
        <NamedLayer>
            <Name>roads</Name>
            <UserStyle><Name>thin</Name><FeatureTypeStyle><Rule><LineSymbolizer/></Rule></FeatureTypeStyle></UserStyle>
            <UserStyle><Name>thick</Name><IsDefault>1</IsDefault><FeatureTypeStyle><Rule><LineSymbolizer/></Rule></FeatureTypeStyle></UserStyle>
        </NamedLayer>
        <UserLayer>
            <Name>parcels</Name>
            <UserStyle><Name>outline</Name><FeatureTypeStyle><Rule><PolygonSymbolizer/></Rule></FeatureTypeStyle></UserStyle>
        </UserLayer>
    </StyledLayerDescriptor>"#;
    let layers = parse_sld_layers(sld, None).unwrap();
    assert_eq!(layers.len(), 2);
    assert_eq!(layers[0].layer, "roads");
    let names: Vec<_> = layers[0].styles.iter().map(|s| s.name.clone().unwrap()).collect();
    assert_eq!(names, vec!["thick".to_string(), "thin".to_string()]);
    assert_eq!(layers[1].default_style().unwrap().name.as_deref(), Some("outline"));
}

// ============================================================================
// Graphics
// ============================================================================

#[test]
fn test_external_svg_relative_to_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("marker.svg"), SVG).unwrap();
    let xml = se_symbolizer(
        r#"<se:PointSymbolizer><se:Graphic>
            <se:ExternalGraphic>
                <se:OnlineResource xlink:type="simple" xlink:href="marker.svg"/>
                <se:Format>image/svg+xml</se:Format>
            </se:ExternalGraphic>
            <se:Size>12</se:Size>
        </se:Graphic></se:PointSymbolizer>"#,
    );
    let style = parse_style(&xml, Some(dir.path())).unwrap();
    let AnySymbolizer::Point(sym) = first_symbolizer(&style) else {
        panic!("expected a point symbolizer");
    };
    let svg = sym.base().graphic.svg.as_ref().expect("svg loaded");
    assert_eq!(svg.width, 10.0);
    assert_eq!(svg.height, 20.0);
    assert_eq!(sym.base().graphic.size, 12.0);
}

#[test]
fn test_missing_external_graphic_is_not_fatal() {
    let xml = se_symbolizer(
        r#"<se:PointSymbolizer><se:Graphic><se:ExternalGraphic>
            <se:OnlineResource xlink:href="/no/such/file.png"/>
            <se:Format>image/png</se:Format>
        </se:ExternalGraphic></se:Graphic></se:PointSymbolizer>"#,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Point(sym) = first_symbolizer(&style) else {
        panic!("expected a point symbolizer");
    };
    assert!(sym.base().graphic.image.is_none());
    assert_eq!(sym.base().graphic.image_url.as_deref(), Some("/no/such/file.png"));
}

#[test]
fn test_feature_dependent_graphic_url_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("icon.svg");
    fs::write(&path, SVG).unwrap();

    let xml = se_symbolizer(
        r#"<se:PointSymbolizer><se:Graphic><se:ExternalGraphic>
            <se:OnlineResource><ogc:PropertyName>icon</ogc:PropertyName></se:OnlineResource>
            <se:Format>image/svg+xml</se:Format>
        </se:ExternalGraphic></se:Graphic></se:PointSymbolizer>"#,
    );
    let root = XmlElement::parse(&xml).unwrap();
    let parser = SymbologyParser::for_document(&root, None);
    let ParsedStyle::Symbolizer {
        symbolizer: AnySymbolizer::Point(sym),
        ..
    } = parser.parse(&root).unwrap()
    else {
        panic!("expected a point symbolizer");
    };
    assert!(!sym.is_static());

    let f = feature().with_property("icon", path.display().to_string());
    for _ in 0..3 {
        let value = sym.evaluate(&f, &ctx());
        assert!(value.graphic.svg.is_some());
    }
    assert_eq!(parser.cache().len(), 1);
    assert!(sym.base().graphic.svg.is_none());
}

#[test]
fn test_inline_svg_mark() {
    let xml = se_symbolizer(&format!(
        r#"<se:PointSymbolizer><se:Graphic><se:Mark>
            <se:InlineContent encoding="base64">{}</se:InlineContent>
            <se:Format>image/svg+xml</se:Format>
        </se:Mark></se:Graphic></se:PointSymbolizer>"#,
        INLINE_SVG
    ));
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Point(sym) = first_symbolizer(&style) else {
        panic!("expected a point symbolizer");
    };
    let mark = &sym.base().graphic.mark;
    assert!(mark.shape.is_some());
    assert_eq!(mark.well_known, SimpleMark::Square);
}

#[test]
fn test_online_resource_rule_is_merged() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("rule.xml"),
        format!("<se:Rule {}><se:Name>remote</se:Name><se:LineSymbolizer/></se:Rule>", SE),
    )
    .unwrap();
    let xml = format!(
        r#"<se:FeatureTypeStyle {}>
            <se:Rule><se:Name>local</se:Name><se:LineSymbolizer/></se:Rule>
            <se:OnlineResource xlink:href="rule.xml"/>
        </se:FeatureTypeStyle>"#,
        SE
    );
    let style = parse_style(&xml, Some(dir.path())).unwrap();
    let names: Vec<_> = style.rules.iter().map(|r| r.name.clone().unwrap()).collect();
    assert_eq!(names, vec!["local".to_string(), "remote".to_string()]);
}

// ============================================================================
// Raster
// ============================================================================

#[test]
fn test_se_raster_symbolizer() {
    let xml = se_symbolizer(
        r##"<se:RasterSymbolizer>
            <se:Opacity>0.8</se:Opacity>
            <se:OverlapBehavior>AVERAGE</se:OverlapBehavior>
            <se:ColorMap>
                <se:Interpolate fallbackValue="#000000">
                    <se:LookupValue>Rasterdata</se:LookupValue>
                    <se:InterpolationPoint><se:Data>0</se:Data><se:Value>#000000</se:Value></se:InterpolationPoint>
                    <se:InterpolationPoint><se:Data>100</se:Data><se:Value>#ffffff</se:Value></se:InterpolationPoint>
                </se:Interpolate>
            </se:ColorMap>
            <se:ShadedRelief><se:BrightnessOnly>true</se:BrightnessOnly></se:ShadedRelief>
            <se:ImageOutline><se:LineSymbolizer><se:Stroke/></se:LineSymbolizer></se:ImageOutline>
        </se:RasterSymbolizer>"##,
    );
    let style = parse_style(&xml, None).unwrap();
    let AnySymbolizer::Raster(sym) = first_symbolizer(&style) else {
        panic!("expected a raster symbolizer");
    };
    let raster = sym.base();
    assert_eq!(raster.opacity, 0.8);
    assert_eq!(raster.overlap, Overlap::Average);
    let ramp = raster.interpolate.as_ref().unwrap();
    assert_eq!(ramp.evaluate(50.0), Some(Color::rgb(128, 128, 128)));
    assert!(raster.shaded.as_ref().unwrap().brightness_only);
    assert!(raster.image_outline.is_some());
}

#[test]
fn test_sld_overlap_behavior_element() {
    let sld = r#"<UserStyle xmlns="http://www.opengis.net/sld"><FeatureTypeStyle><Rule>
        <RasterSymbolizer><OverlapBehavior><EARLIEST_ON_TOP/></OverlapBehavior></RasterSymbolizer>
    </Rule></FeatureTypeStyle></UserStyle>"#;
    let style = parse_style(sld, None).unwrap();
    let AnySymbolizer::Raster(sym) = first_symbolizer(&style) else {
        panic!("expected a raster symbolizer");
    };
    assert_eq!(sym.base().overlap, Overlap::Earliest);
}
