//! Feature info: the features under a clicked pixel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use style_common::{BoundingBox, Feature, WmsError, WmsResult};
use symbology::Style;
use tracing::{debug, warn};

use crate::layer::LayerId;
use crate::service::{LayerRef, MapService};

/// A feature info request against a rendered map.
#[derive(Debug, Clone)]
pub struct FeatureInfoRequest {
    pub layers: Vec<LayerRef>,
    /// Extent of the rendered map.
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    /// Clicked pixel, origin top left.
    pub x: u32,
    pub y: u32,
    /// Maximum number of features returned.
    pub feature_count: usize,
    pub scale: f64,
}

impl FeatureInfoRequest {
    /// The map area covered by the clicked pixel grown by `radius` pixels.
    pub fn click_box(&self, radius: u32) -> BoundingBox {
        let res_x = self.bbox.width() / f64::from(self.width.max(1));
        let res_y = self.bbox.height() / f64::from(self.height.max(1));
        let radius = f64::from(radius);
        let x = f64::from(self.x);
        let y = f64::from(self.y);
        BoundingBox::new(
            self.bbox.min_x + (x - radius) * res_x,
            self.bbox.max_y - (y + 1.0 + radius) * res_y,
            self.bbox.min_x + (x + 1.0 + radius) * res_x,
            self.bbox.max_y - (y - radius) * res_y,
        )
    }
}

impl MapService {
    /// Query the features under the clicked pixel.
    ///
    /// Only queryable layers in scale contribute, following the same descent
    /// rule as painting. Duplicates are dropped and
    /// the result is truncated to the requested feature count.
    pub async fn get_features(&self, request: &FeatureInfoRequest) -> WmsResult<(Vec<Arc<dyn Feature>>, Vec<String>)> {
        let resolved = self.resolve(&request.layers)?;
        for layer in &resolved {
            let queryable = self
                .tree
                .subtree(layer.id)
                .into_iter()
                .any(|id| self.tree.get(id).queryable);
            if !queryable {
                return Err(WmsError::LayerNotQueryable(
                    self.tree.get(layer.id).display_name().to_string(),
                ));
            }
        }

        let mut features = Vec::new();
        let mut warnings = Vec::new();
        for layer in resolved {
            self.layer_features(layer.id, layer.style, request, &mut features, &mut warnings)
                .await;
        }

        let mut seen = HashSet::new();
        let mut features: Vec<_> = features
            .into_iter()
            .filter(|f| match f.id() {
                Some(id) => seen.insert(id.to_string()),
                None => true,
            })
            .collect();
        features.truncate(request.feature_count);
        debug!(count = features.len(), "Collected feature info");
        Ok((features, warnings))
    }

    fn layer_features<'a>(
        &'a self,
        id: LayerId,
        style: Option<Arc<Style>>,
        request: &'a FeatureInfoRequest,
        features: &'a mut Vec<Arc<dyn Feature>>,
        warnings: &'a mut Vec<String>,
    ) -> BoxFuture<'a, ()> {
        async move {
            let layer = self.tree.get(id);
            if layer.queryable && layer.scale_hint.contains(request.scale) {
                if let Some(store) = self.store(id).filter(|s| s.is_available()) {
                    let click_box = request.click_box(layer.options.feature_info_radius);
                    let queries = self.layer_queries(id, style.as_deref(), click_box, None, request.scale);
                    match store.query(&queries).await {
                        Ok(found) => features.extend(found),
                        Err(e) => {
                            warn!(error = %e, layer = %layer.display_name(), "Feature info query failed");
                            warnings.push(format!("Feature info for layer {} failed: {}", layer.display_name(), e));
                        }
                    }
                }
            }

            if !self.descends_at(id, style.as_deref(), request.scale) {
                return;
            }
            for &child in self.tree.children(id) {
                let child_style = match self.tree.get(child).name {
                    Some(_) => self.default_style(child),
                    None => None,
                };
                self.layer_features(child, child_style, request, &mut *features, &mut *warnings)
                    .await;
            }
        }
        .boxed()
    }
}

/// Group features by type name, in first seen order.
pub fn group_by_type(features: &[Arc<dyn Feature>]) -> Vec<(String, Vec<Arc<dyn Feature>>)> {
    let mut order = Vec::new();
    let mut groups: HashMap<String, Vec<Arc<dyn Feature>>> = HashMap::new();
    for feature in features {
        let key = feature.type_name().to_string();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(Arc::clone(feature));
    }
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key).map(|g| (key, g)))
        .collect()
}
