//! Tests for reading styles from the relational styling tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use se_parser::relational::{
    FillRow, FontRow, GraphicRow, HaloRow, LinePlacementRow, LineRow, PointRow, PolygonRow,
    PostgresStyleReader, StrokeRow, StyleDatabase, StyleRow, TextRow,
};
use style_common::{EvalContext, QName, SimpleFeature, WmsResult};
use symbology::{AnySymbolizer, Color, SimpleMark};

// ============================================================================
// In-memory database
// ============================================================================

#[derive(Default)]
struct MemoryDatabase {
    styles: HashMap<i32, StyleRow>,
    points: HashMap<i32, PointRow>,
    lines: HashMap<i32, LineRow>,
    polygons: HashMap<i32, PolygonRow>,
    texts: HashMap<i32, TextRow>,
    fills: HashMap<i32, FillRow>,
    strokes: HashMap<i32, StrokeRow>,
    graphics: HashMap<i32, GraphicRow>,
    fonts: HashMap<i32, FontRow>,
    fetches: Mutex<HashMap<&'static str, usize>>,
    total: AtomicUsize,
}

impl MemoryDatabase {
    fn count(&self, table: &'static str) {
        *self.fetches.lock().unwrap().entry(table).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
    }

    fn fetched(&self, table: &'static str) -> usize {
        self.fetches.lock().unwrap().get(table).copied().unwrap_or_default()
    }
}

fn lookup<T: Clone>(rows: &HashMap<i32, T>, id: i32) -> WmsResult<Option<T>> {
    Ok(rows.get(&id).cloned())
}

#[async_trait]
impl StyleDatabase for MemoryDatabase {
    async fn style(&self, id: i32) -> WmsResult<Option<StyleRow>> {
        self.count("styles");
        lookup(&self.styles, id)
    }
    async fn point(&self, id: i32) -> WmsResult<Option<PointRow>> {
        self.count("points");
        lookup(&self.points, id)
    }
    async fn line(&self, id: i32) -> WmsResult<Option<LineRow>> {
        self.count("lines");
        lookup(&self.lines, id)
    }
    async fn polygon(&self, id: i32) -> WmsResult<Option<PolygonRow>> {
        self.count("polygons");
        lookup(&self.polygons, id)
    }
    async fn text(&self, id: i32) -> WmsResult<Option<TextRow>> {
        self.count("texts");
        lookup(&self.texts, id)
    }
    async fn fill(&self, id: i32) -> WmsResult<Option<FillRow>> {
        self.count("fills");
        lookup(&self.fills, id)
    }
    async fn stroke(&self, id: i32) -> WmsResult<Option<StrokeRow>> {
        self.count("strokes");
        lookup(&self.strokes, id)
    }
    async fn graphic(&self, id: i32) -> WmsResult<Option<GraphicRow>> {
        self.count("graphics");
        lookup(&self.graphics, id)
    }
    async fn font(&self, id: i32) -> WmsResult<Option<FontRow>> {
        self.count("fonts");
        lookup(&self.fonts, id)
    }
    async fn halo(&self, _id: i32) -> WmsResult<Option<HaloRow>> {
        self.count("halos");
        Ok(None)
    }
    async fn line_placement(&self, _id: i32) -> WmsResult<Option<LinePlacementRow>> {
        self.count("lineplacements");
        Ok(None)
    }
}

fn typed_style(kind: &str, fk: i32) -> StyleRow {
    StyleRow {
        kind: Some(kind.to_string()),
        fk: Some(fk),
        ..Default::default()
    }
}

fn feature() -> SimpleFeature {
    SimpleFeature::new(QName::local("Parcels"))
}

// ============================================================================
// Shared rows
// ============================================================================

#[tokio::test]
async fn test_shared_fill_is_fetched_once() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(1, typed_style("polygon", 10));
    db.styles.insert(2, typed_style("POLYGON", 11));
    db.polygons.insert(10, PolygonRow { fill_id: Some(100), ..Default::default() });
    db.polygons.insert(11, PolygonRow { fill_id: Some(100), ..Default::default() });
    db.fills.insert(
        100,
        FillRow {
            color: Some("#336699".into()),
            ..Default::default()
        },
    );

    let reader = PostgresStyleReader::new(db, None);
    let first = reader.get_style(1).await.expect("style 1");
    let second = reader.get_style(2).await.expect("style 2");

    assert_eq!(reader.database().fetched("fills"), 1);
    let cached = reader.cached_fill(100).await.expect("fill memoized");
    assert!(Arc::ptr_eq(&cached, &reader.cached_fill(100).await.unwrap()));
    assert_eq!(cached.base.color, Color::rgb(0x33, 0x66, 0x99));

    for style in [&first, &second] {
        let AnySymbolizer::Polygon(sym) = &style.rules[0].symbolizers[0] else {
            panic!("expected a polygon symbolizer");
        };
        assert_eq!(sym.base().fill.as_ref().unwrap().color, Color::rgb(0x33, 0x66, 0x99));
    }
}

#[tokio::test]
async fn test_style_is_memoized() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(1, typed_style("line", 5));
    db.lines.insert(5, LineRow::default());

    let reader = PostgresStyleReader::new(db, None);
    let a = reader.get_style(1).await.unwrap();
    let b = reader.get_style(1).await.unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(reader.database().fetched("styles"), 1);

    reader.clear().await;
    reader.get_style(1).await.unwrap();
    assert_eq!(reader.database().fetched("styles"), 2);
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn test_cyclic_graphic_fill_returns_none() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(1, typed_style("point", 1));
    db.points.insert(1, PointRow { graphic_id: Some(7), ..Default::default() });
    db.graphics.insert(7, GraphicRow { fill_id: Some(8), ..Default::default() });
    db.fills.insert(8, FillRow { graphic_id: Some(7), ..Default::default() });

    let reader = PostgresStyleReader::new(db, None);
    assert!(reader.get_style(1).await.is_none());
    assert!(reader.database().total.load(Ordering::SeqCst) < 10);
}

#[tokio::test]
async fn test_missing_rows() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(2, typed_style("polygon", 99));
    db.styles.insert(3, typed_style("hexagon", 1));

    let reader = PostgresStyleReader::new(db, None);
    assert!(reader.get_style(1).await.is_none());
    assert!(reader.get_style(2).await.is_none());
    assert!(reader.get_style(3).await.is_none());
}

// ============================================================================
// Row kinds
// ============================================================================

#[tokio::test]
async fn test_embedded_sld_with_name_override() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(
        4,
        StyleRow {
            sld: Some(
                r#"<FeatureTypeStyle xmlns="http://www.opengis.net/se">
                    <Name>inner</Name>
                    <Rule><LineSymbolizer/></Rule>
                </FeatureTypeStyle>"#
                    .into(),
            ),
            name: Some("outer".into()),
            ..Default::default()
        },
    );

    let reader = PostgresStyleReader::new(db, None);
    let style = reader.get_style(4).await.unwrap();
    assert_eq!(style.name.as_deref(), Some("outer"));
    assert_eq!(style.rules.len(), 1);
}

#[tokio::test]
async fn test_scale_range_and_default_name() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(
        6,
        StyleRow {
            minscale: Some(1000.0),
            maxscale: Some(5000.0),
            ..typed_style("line", 5)
        },
    );
    db.lines.insert(5, LineRow::default());

    let reader = PostgresStyleReader::new(db, None);
    let style = reader.get_style(6).await.unwrap();
    assert_eq!(style.name.as_deref(), Some("6"));
    assert_eq!(style.rules[0].min_scale, 1000.0);
    assert_eq!(style.rules[0].max_scale, 5000.0);
}

#[tokio::test]
async fn test_text_label_expression() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(1, typed_style("text", 3));
    db.texts.insert(
        3,
        TextRow {
            labelexpr: Some("owner".into()),
            font_id: Some(2),
            ..Default::default()
        },
    );
    db.fonts.insert(
        2,
        FontRow {
            family: Some("DejaVu Sans".into()),
            bold: Some(true),
            size: Some(14.0),
            ..Default::default()
        },
    );

    let reader = PostgresStyleReader::new(db, None);
    let style = reader.get_style(1).await.unwrap();
    let evaluated = style.evaluate(&feature().with_property("owner", "Smith"), &EvalContext::new(1.0));
    assert_eq!(evaluated[0].label.as_deref(), Some("Smith"));

    let AnySymbolizer::Text(sym) = &style.rules[0].symbolizers[0] else {
        panic!("expected a text symbolizer");
    };
    assert!(sym.base().font.bold);
    assert_eq!(sym.base().font.size, 14.0);
}

#[tokio::test]
async fn test_graphic_size_expression() {
    let mut db = MemoryDatabase::default();
    db.styles.insert(1, typed_style("point", 1));
    db.points.insert(1, PointRow { graphic_id: Some(2), ..Default::default() });
    db.graphics.insert(
        2,
        GraphicRow {
            size: Some(6.0),
            sizeexpr: Some("{http://www.deegree.org/app}weight".into()),
            wellknownname: Some("circle".into()),
            ..Default::default()
        },
    );

    let reader = PostgresStyleReader::new(db, None);
    let style = reader.get_style(1).await.unwrap();
    let AnySymbolizer::Point(sym) = &style.rules[0].symbolizers[0] else {
        panic!("expected a point symbolizer");
    };
    assert_eq!(sym.base().graphic.size, 6.0);
    assert_eq!(sym.base().graphic.mark.well_known, SimpleMark::Circle);

    let value = sym.evaluate(&feature().with_property("weight", 11.0), &EvalContext::new(1.0));
    assert_eq!(value.graphic.size, 11.0);
}
