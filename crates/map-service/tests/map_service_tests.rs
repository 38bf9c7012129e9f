//! Tests for building the layer tree, painting maps and feature info.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use map_service::{
    batch_precondition, collect_feature_queries, Antialias, FeatureInfoRequest, FeatureStore,
    Interrupted, LayerOptions, LayerRef, MapRequest, MapService, Quality, Query, Renderer,
    ScaleHint, ServiceConfig, StyleRegistry, TextRenderer,
};
use style_common::{BoundingBox, Feature, Geometry, QName, SimpleFeature, WmsError, WmsResult};
use symbology::{RasterStyling, Styling, TextStyling};
use tempfile::TempDir;

const SE: &str = r#"xmlns:se="http://www.opengis.net/se" xmlns:ogc="http://www.opengis.net/ogc""#;

const LAYERS: &str = r#"
title: Root
layers:
  - name: roads
    feature_store: osm
    style_file: roads.xml
    queryable: true
    options: { max_features: 2 }
  - name: cities
    feature_store: osm
    style_file: cities.xml
    scale_until: 50000
    queryable: true
  - name: group
    layers:
      - name: dem
        coverage_store: dem
"#;

fn roads_style() -> String {
    format!(
        r#"<se:FeatureTypeStyle {}>
            <se:FeatureTypeName>Roads</se:FeatureTypeName>
            <se:Rule>
                <se:LineSymbolizer><se:Name>road</se:Name></se:LineSymbolizer>
                <se:TextSymbolizer>
                    <se:Label><ogc:PropertyName>name</ogc:PropertyName></se:Label>
                </se:TextSymbolizer>
            </se:Rule>
        </se:FeatureTypeStyle>"#,
        SE
    )
}

fn cities_style() -> String {
    format!(
        r#"<se:FeatureTypeStyle {}>
            <se:FeatureTypeName>Cities</se:FeatureTypeName>
            <se:Rule>
                <se:PointSymbolizer><se:Name>city</se:Name></se:PointSymbolizer>
            </se:Rule>
        </se:FeatureTypeStyle>"#,
        SE
    )
}

fn road(id: &str, name: &str) -> Arc<dyn Feature> {
    Arc::new(
        SimpleFeature::new(QName::local("Roads"))
            .with_id(id)
            .with_property("name", name)
            .with_geometry("geom", Geometry::LineString(vec![(0.0, 0.0), (10.0, 10.0)])),
    )
}

fn city(id: &str) -> Arc<dyn Feature> {
    Arc::new(
        SimpleFeature::new(QName::local("Cities"))
            .with_id(id)
            .with_geometry("geom", Geometry::Point(5.0, 5.0)),
    )
}

// ============================================================================
// Test doubles
// ============================================================================

struct MemoryStore {
    features: Vec<Arc<dyn Feature>>,
    calls: AtomicUsize,
    fail: bool,
}

impl MemoryStore {
    fn new(features: Vec<Arc<dyn Feature>>) -> Arc<Self> {
        Arc::new(Self {
            features,
            calls: AtomicUsize::new(0),
            fail: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            features: Vec::new(),
            calls: AtomicUsize::new(0),
            fail: true,
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeatureStore for MemoryStore {
    fn feature_types(&self) -> Vec<QName> {
        vec![QName::local("Roads"), QName::local("Cities")]
    }

    async fn query(&self, queries: &[Query]) -> WmsResult<Vec<Arc<dyn Feature>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WmsError::StoreError("connection refused".to_string()));
        }
        let mut out = Vec::new();
        for query in queries {
            let limit = query.max_features.unwrap_or(usize::MAX);
            out.extend(
                self.features
                    .iter()
                    .filter(|f| f.type_name() == &query.feature_type)
                    .take(limit)
                    .cloned(),
            );
        }
        Ok(out)
    }
}

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
    options: Vec<LayerOptions>,
    interrupt_after: Option<usize>,
}

impl Recorder {
    fn push(&mut self, event: String) -> Result<(), Interrupted> {
        if self.interrupt_after.is_some_and(|n| self.events.len() >= n) {
            return Err(Interrupted);
        }
        self.events.push(event);
        Ok(())
    }
}

impl Renderer for Recorder {
    fn apply_options(&mut self, options: &LayerOptions) {
        self.options.push(options.clone());
    }

    fn render(&mut self, styling: &Styling<'_>, _geometry: &Geometry) -> Result<(), Interrupted> {
        let kind = match styling {
            Styling::Point(_) => "point",
            Styling::Line(_) => "line",
            Styling::Polygon(_) => "polygon",
            Styling::Text(_) => "text",
            Styling::Raster(_) => "raster",
        };
        self.push(kind.to_string())
    }

    fn render_raster(&mut self, coverage: &str, _styling: &RasterStyling) -> Result<(), Interrupted> {
        self.push(format!("raster:{}", coverage))
    }
}

impl TextRenderer for Recorder {
    fn render_text(&mut self, _styling: &TextStyling, text: &str, _geometry: &Geometry) -> Result<(), Interrupted> {
        self.push(format!("label:{}", text))
    }
}

struct Fixture {
    dir: TempDir,
    service: MapService,
    store: Arc<MemoryStore>,
}

fn fixture_with(yaml: &str, store: Option<Arc<MemoryStore>>) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("roads.xml"), roads_style()).unwrap();
    fs::write(dir.path().join("cities.xml"), cities_style()).unwrap();
    let config = ServiceConfig::from_yaml_str(yaml, dir.path()).unwrap();

    let store = store.unwrap_or_else(|| {
        MemoryStore::new(vec![road("r1", "A"), road("r2", "B"), road("r3", "C"), city("c1")])
    });
    let mut stores: HashMap<String, Arc<dyn FeatureStore>> = HashMap::new();
    stores.insert("osm".to_string(), store.clone());
    let service = MapService::new(&config, Arc::new(StyleRegistry::new()), stores);
    Fixture {
        dir,
        service,
        store,
    }
}

fn fixture() -> Fixture {
    fixture_with(LAYERS, None)
}

fn map_request(layers: &[&str], scale: f64) -> MapRequest {
    MapRequest::new(
        layers.iter().map(|l| LayerRef::new(*l, None)).collect(),
        BoundingBox::new(0.0, 0.0, 100.0, 100.0),
        256,
        256,
        scale,
    )
}

fn hint(service: &MapService, name: &str) -> ScaleHint {
    service.layer(name).unwrap().scale_hint
}

// ============================================================================
// Layer tree
// ============================================================================

#[test]
fn test_scale_bands_from_until_and_above() {
    let yaml = r#"
layers:
  - name: detail
    scale_until: 1000
  - name: overview
    scale_above: 1000
  - name: always
  - name: swapped
    scale_denominators: { min: 5000, max: 100 }
"#;
    let f = fixture_with(yaml, None);
    assert_eq!(hint(&f.service, "detail"), ScaleHint::new(f64::NEG_INFINITY, 1000.0));
    assert_eq!(hint(&f.service, "overview"), ScaleHint::new(1000.0, f64::INFINITY));
    assert_eq!(hint(&f.service, "always"), ScaleHint::UNBOUNDED);
    assert_eq!(hint(&f.service, "swapped"), ScaleHint::new(100.0, 5000.0));
}

#[test]
fn test_children_inherit_parent_scale_hint() {
    let yaml = r#"
layers:
  - name: parent
    scale_denominators: { min: 10, max: 100 }
    layers:
      - name: child
"#;
    let f = fixture_with(yaml, None);
    assert_eq!(hint(&f.service, "child"), ScaleHint::new(10.0, 100.0));
}

#[test]
fn test_nameless_layers_are_numbered() {
    let yaml = r#"
layers:
  - title: First group
  - title: Second group
"#;
    let f = fixture_with(yaml, None);
    let tree = f.service.tree();
    let names: Vec<&str> = tree
        .subtree(tree.root())
        .into_iter()
        .map(|id| tree.get(id).internal_name.as_str())
        .collect();
    assert_eq!(names, vec!["NamelessLayer_1", "NamelessLayer_2", "NamelessLayer_3"]);
}

#[test]
fn test_options_are_inherited() {
    let yaml = r#"
options: { antialias: text }
layers:
  - name: child
    options: { quality: bogus, max_features: 0 }
"#;
    let f = fixture_with(yaml, None);
    let options = &f.service.layer("child").unwrap().options;
    assert_eq!(options.antialias, Antialias::Text);
    assert_eq!(options.quality, Quality::Normal);
    assert_eq!(options.max_features, None);
}

#[test]
fn test_resolve_errors() {
    let f = fixture();
    assert!(matches!(
        f.service.resolve(&[LayerRef::new("rivers", None)]),
        Err(WmsError::LayerNotDefined(name)) if name == "rivers"
    ));
    assert!(matches!(
        f.service.resolve(&[LayerRef::new("roads", Some("night"))]),
        Err(WmsError::StyleNotDefined { .. })
    ));
    let resolved = f.service.resolve(&[LayerRef::new("roads", Some(""))]).unwrap();
    assert!(resolved[0].style.is_some());
}

// ============================================================================
// Painting
// ============================================================================

#[tokio::test]
async fn test_labels_are_painted_last() {
    let f = fixture();
    let mut recorder = Recorder::default();
    f.service.paint_map(&map_request(&["roads"], 25_000.0), &mut recorder).await.unwrap();

    assert_eq!(recorder.events, vec!["line", "line", "label:A", "label:B"]);
}

#[tokio::test]
async fn test_max_features_per_layer() {
    let f = fixture();
    let mut recorder = Recorder::default();
    // A non-feature layer in the request disables the batch pass.
    f.service
        .paint_map(&map_request(&["roads", "group"], 25_000.0), &mut recorder)
        .await
        .unwrap();

    let lines = recorder.events.iter().filter(|e| *e == "line").count();
    assert_eq!(lines, 2);
    assert_eq!(f.store.calls(), 1);
    assert_eq!(recorder.options[0].max_features, Some(2));
}

#[tokio::test]
async fn test_single_store_is_queried_once() {
    let f = fixture();
    let request = map_request(&["roads", "cities"], 25_000.0);
    let resolved = f.service.resolve(&request.layers).unwrap();
    let plan = collect_feature_queries(&f.service, &resolved, &request).unwrap();
    assert_eq!(plan.queries.len(), 1);
    assert_eq!(plan.queries["osm"].len(), 2);

    let mut recorder = Recorder::default();
    f.service.paint_map(&request, &mut recorder).await.unwrap();
    assert_eq!(f.store.calls(), 1);
    assert_eq!(recorder.events, vec!["line", "line", "point", "label:A", "label:B"]);
}

#[test]
fn test_batch_precondition() {
    let f = fixture();
    let tree = f.service.tree();
    let roads = tree.find("roads").unwrap();
    let group = tree.find("group").unwrap();
    assert!(batch_precondition(tree, &[roads]));
    assert!(!batch_precondition(tree, &[roads, group]));
    assert!(!batch_precondition(tree, &[tree.root()]));
}

#[test]
fn test_batch_stops_at_style_without_rules() {
    let dir = tempfile::tempdir().unwrap();
    let detail = roads_style().replace(
        "<se:Rule>",
        "<se:Rule><se:MaxScaleDenominator>1000</se:MaxScaleDenominator>",
    );
    fs::write(dir.path().join("roads.xml"), detail).unwrap();
    fs::write(dir.path().join("cities.xml"), cities_style()).unwrap();
    let yaml = r#"
layers:
  - name: roads
    feature_store: osm
    style_file: roads.xml
    layers:
      - name: cities
        feature_store: osm
        style_file: cities.xml
"#;
    let config = ServiceConfig::from_yaml_str(yaml, dir.path()).unwrap();
    let mut stores: HashMap<String, Arc<dyn FeatureStore>> = HashMap::new();
    stores.insert("osm".to_string(), MemoryStore::new(Vec::new()));
    let service = MapService::new(&config, Arc::new(StyleRegistry::new()), stores);

    let request = map_request(&["roads"], 25_000.0);
    let resolved = service.resolve(&request.layers).unwrap();
    let plan = collect_feature_queries(&service, &resolved, &request).unwrap();
    assert!(plan.queries.is_empty());
    assert!(plan.layers.is_empty());

    let request = map_request(&["roads"], 500.0);
    let plan = collect_feature_queries(&service, &resolved, &request).unwrap();
    assert_eq!(plan.queries["osm"].len(), 2);
}

#[tokio::test]
async fn test_out_of_scale_layer_is_skipped() {
    let f = fixture();
    let mut recorder = Recorder::default();
    f.service
        .paint_map(&map_request(&["cities", "group"], 100_000.0), &mut recorder)
        .await
        .unwrap();
    assert!(recorder.events.is_empty());
    assert_eq!(f.store.calls(), 0);
}

const NESTED: &str = r#"
layers:
  - name: roads
    feature_store: osm
    style_file: roads.xml
    scale_denominators: { min: 0, max: 1000 }
    layers:
      - name: cities
        feature_store: osm
        style_file: cities.xml
        scale_denominators: { min: 0, max: 1000000 }
  - name: group
"#;

#[tokio::test]
async fn test_children_of_hidden_layer_are_painted() {
    let f = fixture_with(NESTED, None);
    let mut recorder = Recorder::default();
    f.service.paint_map(&map_request(&["roads"], 5_000.0), &mut recorder).await.unwrap();
    assert_eq!(recorder.events, vec!["point"]);
    assert_eq!(f.store.calls(), 1);

    // Same outcome without collected queries.
    let f = fixture_with(NESTED, None);
    let mut recorder = Recorder::default();
    f.service
        .paint_map(&map_request(&["roads", "group"], 5_000.0), &mut recorder)
        .await
        .unwrap();
    assert_eq!(recorder.events, vec!["point"]);
    assert_eq!(f.store.calls(), 1);
}

#[tokio::test]
async fn test_children_skipped_below_style_without_rules() {
    let f = fixture_with(NESTED, None);
    let detail = roads_style().replace(
        "<se:Rule>",
        "<se:Rule><se:MaxScaleDenominator>1000</se:MaxScaleDenominator>",
    );
    let path = f.dir.path().join("roads.xml");
    fs::write(&path, detail).unwrap();
    touch_later(&path, 10);
    assert_eq!(f.service.registry().check_for_updates(), 1);

    let mut recorder = Recorder::default();
    f.service
        .paint_map(&map_request(&["roads", "group"], 5_000.0), &mut recorder)
        .await
        .unwrap();
    assert!(recorder.events.is_empty());
    assert_eq!(f.store.calls(), 0);
}

#[tokio::test]
async fn test_interrupted_rendering_times_out() {
    let f = fixture();
    let mut recorder = Recorder {
        interrupt_after: Some(1),
        ..Recorder::default()
    };
    let result = f.service.paint_map(&map_request(&["roads"], 25_000.0), &mut recorder).await;
    assert!(matches!(result, Err(WmsError::Timeout)));
}

#[tokio::test]
async fn test_store_failure_is_not_fatal() {
    let f = fixture_with(LAYERS, Some(MemoryStore::failing()));
    let mut recorder = Recorder::default();
    f.service
        .paint_map(&map_request(&["roads", "group"], 25_000.0), &mut recorder)
        .await
        .unwrap();
    assert!(recorder.events.is_empty());
    assert_eq!(f.store.calls(), 1);
}

#[tokio::test]
async fn test_missing_store_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("roads.xml"), roads_style()).unwrap();
    fs::write(dir.path().join("cities.xml"), cities_style()).unwrap();
    let config = ServiceConfig::from_yaml_str(LAYERS, dir.path()).unwrap();
    let service = MapService::new(&config, Arc::new(StyleRegistry::new()), HashMap::new());

    let mut recorder = Recorder::default();
    service.paint_map(&map_request(&["roads"], 25_000.0), &mut recorder).await.unwrap();
    assert!(recorder.events.is_empty());
}

// ============================================================================
// Feature info
// ============================================================================

fn info_request(layers: &[&str], feature_count: usize) -> FeatureInfoRequest {
    FeatureInfoRequest {
        layers: layers.iter().map(|l| LayerRef::new(*l, None)).collect(),
        bbox: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
        width: 100,
        height: 100,
        x: 50,
        y: 50,
        feature_count,
        scale: 25_000.0,
    }
}

#[tokio::test]
async fn test_feature_info_drops_duplicates() {
    let store = MemoryStore::new(vec![road("r1", "A"), road("r2", "B"), city("c1"), city("c1")]);
    let f = fixture_with(LAYERS, Some(store));
    let (features, warnings) = f.service.get_features(&info_request(&["roads", "cities"], 10)).await.unwrap();

    let ids: Vec<&str> = features.iter().filter_map(|f| f.id()).collect();
    assert_eq!(ids, vec!["r1", "r2", "c1"]);
    assert!(warnings.is_empty());
}

#[tokio::test]
async fn test_feature_info_truncates() {
    let f = fixture();
    let (features, _) = f.service.get_features(&info_request(&["roads", "cities"], 1)).await.unwrap();
    assert_eq!(features.len(), 1);
}

#[tokio::test]
async fn test_feature_info_requires_queryable_layer() {
    let f = fixture();
    assert!(matches!(
        f.service.get_features(&info_request(&["group"], 1)).await,
        Err(WmsError::LayerNotQueryable(_))
    ));
}

// ============================================================================
// Style reloading
// ============================================================================

fn touch_later(path: &Path, secs: u64) {
    let file = fs::OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(secs))
        .unwrap();
}

#[test]
fn test_changed_style_file_is_reloaded() {
    let f = fixture();
    let registry = f.service.registry();
    let path = f.dir.path().join("roads.xml");
    assert_eq!(registry.check_for_updates(), 0);

    fs::write(&path, cities_style()).unwrap();
    touch_later(&path, 10);
    assert_eq!(registry.check_for_updates(), 1);
    let style = registry.get("roads", None).unwrap();
    assert_eq!(style.feature_type, Some(QName::local("Cities")));
    assert_eq!(registry.check_for_updates(), 0);
}

#[test]
fn test_reloaded_named_style_becomes_default() {
    let f = fixture();
    let registry = f.service.registry();
    let path = f.dir.path().join("roads.xml");
    fs::write(&path, roads_style().replace("<se:Rule>", "<se:Name>day</se:Name><se:Rule>")).unwrap();
    touch_later(&path, 10);
    assert_eq!(registry.check_for_updates(), 1);
    assert!(Arc::ptr_eq(
        &registry.get("roads", None).unwrap(),
        &registry.get("roads", Some("day")).unwrap()
    ));

    fs::write(&path, cities_style().replace("<se:Rule>", "<se:Name>night</se:Name><se:Rule>")).unwrap();
    touch_later(&path, 20);
    assert_eq!(registry.check_for_updates(), 1);

    let default = registry.get("roads", None).unwrap();
    assert_eq!(default.name.as_deref(), Some("night"));
    assert_eq!(default.feature_type, Some(QName::local("Cities")));
    assert!(!registry.has("roads", Some("day")));
}

#[test]
fn test_broken_style_file_keeps_previous_style() {
    let f = fixture();
    let registry = f.service.registry();
    let path = f.dir.path().join("roads.xml");

    fs::write(&path, "<se:FeatureTypeStyle").unwrap();
    touch_later(&path, 10);
    assert_eq!(registry.check_for_updates(), 0);
    let style = registry.get("roads", None).unwrap();
    assert_eq!(style.feature_type, Some(QName::local("Roads")));
}

#[tokio::test]
async fn test_watcher_picks_up_changes() {
    let f = fixture();
    let registry = Arc::clone(f.service.registry());
    let handle = registry.spawn_watcher(std::time::Duration::from_millis(10));

    let path = f.dir.path().join("cities.xml");
    fs::write(&path, roads_style()).unwrap();
    touch_later(&path, 10);
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    handle.abort();

    let style = registry.get("cities", None).unwrap();
    assert_eq!(style.feature_type, Some(QName::local("Roads")));
}
