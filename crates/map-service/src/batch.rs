//! Collecting the queries of several feature layers into one store request.
//!
//! When every requested layer is a feature layer and every feature type is
//! drawn by exactly one layer, all queries against a single store can be
//! issued at once and each returned feature dispatched by its type name.

use std::collections::HashMap;
use std::sync::Arc;

use style_common::QName;
use symbology::Style;
use tracing::debug;

use crate::layer::{LayerId, LayerKind, LayerTree};
use crate::paint::MapRequest;
use crate::service::{MapService, ResolvedLayer};
use crate::store::Query;

/// Queries per store plus the layer and style drawing each feature type.
#[derive(Debug, Default)]
pub struct BatchPlan {
    pub queries: HashMap<String, Vec<Query>>,
    pub layers: HashMap<QName, LayerId>,
    pub styles: HashMap<QName, Arc<Style>>,
}

/// True when the whole subtree of every layer in `roots` consists of feature layers.
pub fn batch_precondition(tree: &LayerTree, roots: &[LayerId]) -> bool {
    roots
        .iter()
        .flat_map(|&root| tree.subtree(root))
        .all(|id| tree.get(id).is_feature_layer())
}

/// Build a batch plan for the resolved layers of `request`.
///
/// Returns `None` when the layers cannot be batched: a non-feature layer,
/// an unavailable store, a style without a feature type, or a feature type
/// drawn by more than one layer.
pub fn collect_feature_queries(
    service: &MapService,
    resolved: &[ResolvedLayer],
    request: &MapRequest,
) -> Option<BatchPlan> {
    let roots: Vec<LayerId> = resolved.iter().map(|r| r.id).collect();
    if !batch_precondition(&service.tree, &roots) {
        return None;
    }

    let mut plan = BatchPlan::default();
    for layer in resolved {
        if !collect(service, layer.id, layer.style.clone(), request, &mut plan) {
            debug!("Layers cannot be painted with collected queries");
            return None;
        }
    }
    Some(plan)
}

fn collect(
    service: &MapService,
    id: LayerId,
    style: Option<Arc<Style>>,
    request: &MapRequest,
    plan: &mut BatchPlan,
) -> bool {
    let layer = service.tree.get(id);
    let LayerKind::Feature(store_name) = &layer.kind else {
        return false;
    };
    if !service.store(id).is_some_and(|s| s.is_available()) {
        return false;
    }
    let Some(style) = style else {
        return false;
    };
    let Some(feature_type) = style.feature_type.clone() else {
        return false;
    };
    if plan.layers.contains_key(&feature_type) {
        return false;
    }

    if !service.descends_at(id, Some(style.as_ref()), request.scale) {
        debug!(layer = %layer.display_name(), "No rules at this scale, not descending");
        return true;
    }

    if layer.scale_hint.contains(request.scale) {
        let queries = service.layer_queries(
            id,
            Some(style.as_ref()),
            request.bbox,
            request.filter_for(layer.name.as_deref()),
            request.scale,
        );
        plan.queries.entry(store_name.clone()).or_default().extend(queries);
        plan.layers.insert(feature_type.clone(), id);
        plan.styles.insert(feature_type, style);
    }

    service
        .tree
        .children(id)
        .iter()
        .all(|&child| collect(service, child, service.default_style(child), request, plan))
}
