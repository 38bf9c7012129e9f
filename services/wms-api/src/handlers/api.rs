//! REST API handlers for inspecting the layer tree and its styles.
//!
//! Provides endpoints for:
//! - The layer tree with effective scale hints and options
//! - Style names registered per layer
//! - The layers and rules a map request would draw at a given scale
//! - Styles stored in the style database

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use map_service::{LayerId, LayerKind, LayerOptions, LayerRef, MapService, DEFAULT_STYLE};
use serde::Serialize;
use style_common::{WmsError, WmsResult};
use symbology::Style;
use tracing::{debug, info, instrument};

use super::common::{finite, parse_f64, split_list, ApiError};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ScaleRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct LayerNode {
    pub name: Option<String>,
    pub internal_name: String,
    pub title: Option<String>,
    #[serde(flatten)]
    pub kind: LayerKind,
    pub queryable: bool,
    pub scale: ScaleRange,
    pub options: LayerOptions,
    pub styles: Vec<String>,
    pub layers: Vec<LayerNode>,
}

#[derive(Debug, Serialize)]
pub struct StylesResponse {
    pub layer: String,
    pub styles: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct PlannedLayer {
    pub layer: String,
    pub style: Option<String>,
    pub active_rules: usize,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub scale: f64,
    pub layers: Vec<PlannedLayer>,
}

#[derive(Debug, Serialize)]
pub struct StoredStyleResponse {
    pub id: i32,
    pub name: Option<String>,
    pub feature_type: Option<String>,
    pub rules: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/layers - The layer tree
pub async fn layers_handler(Extension(state): Extension<Arc<AppState>>) -> Json<LayerNode> {
    let service = &state.service;
    Json(layer_node(service, service.tree().root()))
}

/// GET /api/styles/:layer - Style names registered for a layer
#[instrument(skip(state))]
pub async fn styles_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(layer): Path<String>,
) -> Result<Json<StylesResponse>, ApiError> {
    let found = state
        .service
        .layer(&layer)
        .ok_or_else(|| WmsError::LayerNotDefined(layer.clone()))?;
    let styles = state.service.registry().style_names(&found.internal_name);
    Ok(Json(StylesResponse { layer, styles }))
}

/// GET /api/plan?layers=a,b&styles=,x&scale=N - What a map request would draw
#[instrument(skip(state))]
pub async fn plan_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<PlanResponse>, ApiError> {
    let param = |name: &str| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };
    let layers = split_list(param("layers"));
    let styles = split_list(param("styles"));
    let scale = parse_f64("scale", param("scale"))?;

    let plan = build_plan(&state.service, &layers, &styles, scale)?;
    info!(layers = plan.layers.len(), scale, "Planned map request");
    Ok(Json(plan))
}

/// GET /api/db-styles/:id - A style stored in the style database
#[instrument(skip(state))]
pub async fn stored_style_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<StoredStyleResponse>, ApiError> {
    let reader = state
        .styles_db
        .as_ref()
        .ok_or_else(|| WmsError::ConfigError("No style database configured".to_string()))?;
    let style = reader.get_style(id).await.ok_or_else(|| WmsError::StyleNotDefined {
        layer: "database".to_string(),
        style: id.to_string(),
    })?;
    Ok(Json(StoredStyleResponse {
        id,
        name: style.name.clone(),
        feature_type: style.feature_type.as_ref().map(ToString::to_string),
        rules: style.rules.len(),
    }))
}

// ============================================================================
// Helpers
// ============================================================================

fn layer_node(service: &MapService, id: LayerId) -> LayerNode {
    let tree = service.tree();
    let layer = tree.get(id);
    LayerNode {
        name: layer.name.clone(),
        internal_name: layer.internal_name.clone(),
        title: layer.title.clone(),
        kind: layer.kind.clone(),
        queryable: layer.queryable,
        scale: ScaleRange {
            min: finite(layer.scale_hint.min),
            max: finite(layer.scale_hint.max),
        },
        options: layer.options.clone(),
        styles: service.registry().style_names(&layer.internal_name),
        layers: tree.children(id).iter().map(|&c| layer_node(service, c)).collect(),
    }
}

/// The layers a map request for `layers` with `styles` draws at `scale`.
///
/// Layers outside their scale hint are left out with their whole subtree;
/// children are listed with their default styles.
pub fn build_plan(service: &MapService, layers: &[String], styles: &[String], scale: f64) -> WmsResult<PlanResponse> {
    if layers.is_empty() {
        return Err(WmsError::MissingParameter("layers".to_string()));
    }
    if !styles.is_empty() && styles.len() != layers.len() {
        return Err(WmsError::InvalidParameter {
            param: "styles".to_string(),
            message: format!("{} styles given for {} layers", styles.len(), layers.len()),
        });
    }

    let refs: Vec<LayerRef> = layers
        .iter()
        .enumerate()
        .map(|(i, layer)| LayerRef::new(layer.as_str(), styles.get(i).map(String::as_str)))
        .collect();
    let resolved = service.resolve(&refs)?;

    let mut planned = Vec::new();
    for (layer, requested) in resolved.into_iter().zip(&refs) {
        let style_name = layer
            .style
            .as_ref()
            .map(|_| requested.style.clone().unwrap_or_else(|| DEFAULT_STYLE.to_string()));
        visit(service, layer.id, layer.style, style_name, scale, &mut planned);
    }
    Ok(PlanResponse {
        scale,
        layers: planned,
    })
}

fn visit(
    service: &MapService,
    id: LayerId,
    style: Option<Arc<Style>>,
    style_name: Option<String>,
    scale: f64,
    out: &mut Vec<PlannedLayer>,
) {
    let tree = service.tree();
    let layer = tree.get(id);
    if layer.scale_hint.contains(scale) {
        out.push(PlannedLayer {
            layer: layer.display_name().to_string(),
            style: style_name,
            active_rules: style.as_ref().map_or(0, |s| s.rules_at(scale).count()),
        });
    } else {
        debug!(layer = %layer.display_name(), scale, "Layer not visible at this scale");
    }
    if !service.descends_at(id, style.as_deref(), scale) {
        return;
    }
    for &child in tree.children(id) {
        let internal = &tree.get(child).internal_name;
        let child_style = service.registry().get(internal, None);
        let child_name = child_style.as_ref().map(|_| DEFAULT_STYLE.to_string());
        visit(service, child, child_style, child_name, scale, out);
    }
}
