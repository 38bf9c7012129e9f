//! The map service: layer tree construction and style resolution.

use std::collections::HashMap;
use std::sync::Arc;

use style_common::{WmsError, WmsResult};
use symbology::Style;
use tracing::{debug, info, warn};

use crate::config::{LayerConfig, LayerSource, ServiceConfig};
use crate::layer::{derive_scale_hints, Layer, LayerId, LayerKind, LayerOptions, LayerTree, ScaleHint};
use crate::registry::StyleRegistry;
use crate::store::{FeatureStore, Query};

/// A requested layer with an optional style name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRef {
    pub layer: String,
    pub style: Option<String>,
}

impl LayerRef {
    pub fn new(layer: impl Into<String>, style: Option<&str>) -> Self {
        Self {
            layer: layer.into(),
            style: style.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }
}

/// A requested layer resolved against the tree and the style registry.
#[derive(Debug, Clone)]
pub struct ResolvedLayer {
    pub id: LayerId,
    pub style: Option<Arc<Style>>,
}

/// Layers, their styles and the stores they draw from.
pub struct MapService {
    pub(crate) tree: LayerTree,
    pub(crate) registry: Arc<StyleRegistry>,
    pub(crate) stores: HashMap<String, Arc<dyn FeatureStore>>,
}

struct TreeBuilder<'a> {
    layers: Vec<Layer>,
    registry: &'a StyleRegistry,
    nameless: usize,
    /// Hints derived from configuration, `None` until inherited.
    hints: Vec<Option<ScaleHint>>,
}

impl<'a> TreeBuilder<'a> {
    fn add(&mut self, config: &LayerConfig, parent: Option<LayerId>, inherited: &LayerOptions) -> LayerId {
        let id = LayerId(self.layers.len());
        let internal_name = match &config.name {
            Some(name) => name.clone(),
            None => {
                self.nameless += 1;
                format!("NamelessLayer_{}", self.nameless)
            }
        };
        self.register_styles(&internal_name, config);

        let kind = match &config.source {
            LayerSource::FeatureStore(store) => LayerKind::Feature(store.clone()),
            LayerSource::CoverageStore(store) => LayerKind::Raster(store.clone()),
            LayerSource::None => LayerKind::Empty,
        };
        let options = inherited.with_overrides(&config.options);

        self.layers.push(Layer {
            name: config.name.clone(),
            internal_name,
            title: config.title.clone(),
            kind,
            queryable: config.queryable,
            scale_hint: ScaleHint::UNBOUNDED,
            options: options.clone(),
            parent,
            children: Vec::new(),
        });
        self.hints.push(None);

        let children: Vec<LayerId> = config
            .layers
            .iter()
            .map(|child| self.add(child, Some(id), &options))
            .collect();

        let scales: Vec<_> = config.layers.iter().map(|c| c.scale).collect();
        for (child, hint) in children.iter().zip(derive_scale_hints(&scales)) {
            if let Some(hint) = hint {
                self.hints[child.0] = Some(hint);
            }
        }
        self.layers[id.0].children = children;
        id
    }

    fn register_styles(&self, layer: &str, config: &LayerConfig) {
        if let Some(path) = &config.style_file {
            if let Err(e) = self.registry.load(layer, path) {
                warn!(error = %e, layer, "Direct style could not be loaded");
            }
        }
        if let Some(path) = &config.sld_file {
            if let Err(e) = self.registry.load_sld(layer, path) {
                warn!(error = %e, layer, "SLD styles could not be loaded");
            }
        }
        if let Some(path) = &config.legend_style_file {
            if let Err(e) = self.registry.load_legend(layer, path) {
                warn!(error = %e, layer, "Legend style could not be loaded");
            }
        }
    }

    /// Give the root an unbounded hint if it has none, and every other
    /// layer without a hint its parent's.
    fn fill_inherited_information(&mut self, id: LayerId, parent_hint: Option<ScaleHint>) {
        let hint = self.hints[id.0]
            .or(parent_hint)
            .unwrap_or(ScaleHint::UNBOUNDED);
        self.layers[id.0].scale_hint = hint;
        let children = self.layers[id.0].children.clone();
        for child in children {
            self.fill_inherited_information(child, Some(hint));
        }
    }
}

impl MapService {
    /// Build the layer tree from `config`, loading all configured styles into `registry`.
    pub fn new(
        config: &ServiceConfig,
        registry: Arc<StyleRegistry>,
        stores: HashMap<String, Arc<dyn FeatureStore>>,
    ) -> Self {
        let mut builder = TreeBuilder {
            layers: Vec::new(),
            registry: &registry,
            nameless: 0,
            hints: Vec::new(),
        };
        let root = builder.add(&config.root, None, &LayerOptions::default());
        builder.hints[root.0] = derive_scale_hints(&[config.root.scale]).pop().flatten();
        builder.fill_inherited_information(root, None);

        let tree = LayerTree::new(builder.layers, root);
        for id in tree.subtree(root) {
            let layer = tree.get(id);
            if let LayerKind::Feature(store) = &layer.kind {
                if !stores.contains_key(store) {
                    warn!(layer = %layer.display_name(), store = %store, "Feature store is not configured, layer will be empty");
                }
            }
        }
        info!(layers = tree.len(), stores = stores.len(), "Map service initialized");

        Self { tree, registry, stores }
    }

    pub fn tree(&self) -> &LayerTree {
        &self.tree
    }

    pub fn registry(&self) -> &Arc<StyleRegistry> {
        &self.registry
    }

    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.tree.find(name).map(|id| self.tree.get(id))
    }

    /// The default style of a layer.
    pub(crate) fn default_style(&self, id: LayerId) -> Option<Arc<Style>> {
        self.registry.get(&self.tree.get(id).internal_name, None)
    }

    /// Resolve requested layers and styles.
    ///
    /// Unknown layers and unknown explicit style names are errors; a layer
    /// without any registered style resolves to no style.
    pub fn resolve(&self, refs: &[LayerRef]) -> WmsResult<Vec<ResolvedLayer>> {
        refs.iter()
            .map(|r| {
                let id = self
                    .tree
                    .find(&r.layer)
                    .ok_or_else(|| WmsError::LayerNotDefined(r.layer.clone()))?;
                let internal = &self.tree.get(id).internal_name;
                let style = match &r.style {
                    Some(name) => Some(self.registry.get(internal, Some(name)).ok_or_else(|| {
                        WmsError::StyleNotDefined {
                            layer: r.layer.clone(),
                            style: name.clone(),
                        }
                    })?),
                    None => self.registry.get(internal, None),
                };
                Ok(ResolvedLayer { id, style })
            })
            .collect()
    }

    pub(crate) fn store(&self, id: LayerId) -> Option<&Arc<dyn FeatureStore>> {
        match &self.tree.get(id).kind {
            LayerKind::Feature(store) => self.stores.get(store),
            _ => None,
        }
    }

    /// Queries painting layer `id` with `style` needs.
    ///
    /// A style bound to a feature type queries only that type, and nothing if
    /// the store does not know it; otherwise every type of the store is queried.
    pub(crate) fn layer_queries(
        &self,
        id: LayerId,
        style: Option<&Style>,
        bbox: style_common::BoundingBox,
        filter: Option<&style_common::Filter>,
        scale: f64,
    ) -> Vec<Query> {
        let layer = self.tree.get(id);
        let Some(store) = self.store(id) else {
            return Vec::new();
        };
        let max_features = layer.options.max_features;
        let query = |feature_type| Query {
            feature_type,
            bbox,
            filter: filter.cloned(),
            scale: scale.round(),
            max_features,
        };

        match style.and_then(|s| s.feature_type.clone()) {
            Some(name) => {
                if !store.has_feature_type(&name) {
                    warn!(feature_type = %name, layer = %layer.display_name(), "Feature type from style is not known to the feature store");
                    return Vec::new();
                }
                vec![query(name)]
            }
            None => {
                debug!(layer = %layer.display_name(), "Style has no feature type, querying all types of the store");
                store.feature_types().into_iter().map(query).collect()
            }
        }
    }
}
