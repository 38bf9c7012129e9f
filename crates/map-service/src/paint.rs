//! Painting a map: walking the requested layers and rendering their features.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use style_common::{BoundingBox, EvalContext, Feature, Filter, Geometry, WmsError, WmsResult};
use symbology::{AnySymbolizer, RasterStyling, Style, Styling, TextStyling};
use tracing::{debug, warn};

use crate::batch::{collect_feature_queries, BatchPlan};
use crate::layer::{LayerId, LayerKind, LayerOptions};
use crate::service::{LayerRef, MapService};

/// The renderer gave up, usually because the request timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupted;

impl fmt::Display for Interrupted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("rendering was interrupted")
    }
}

impl From<Interrupted> for WmsError {
    fn from(_: Interrupted) -> Self {
        WmsError::Timeout
    }
}

/// Draws evaluated symbols onto a canvas.
pub trait Renderer {
    /// Switch rendering hints before a layer is drawn.
    fn apply_options(&mut self, _options: &LayerOptions) {}

    /// Draw a point, line or polygon styling value.
    fn render(&mut self, styling: &Styling<'_>, geometry: &Geometry) -> Result<(), Interrupted>;

    /// Draw a coverage with a raster styling value.
    fn render_raster(&mut self, coverage: &str, styling: &RasterStyling) -> Result<(), Interrupted>;
}

/// Draws labels.
pub trait TextRenderer {
    fn render_text(&mut self, styling: &TextStyling, text: &str, geometry: &Geometry) -> Result<(), Interrupted>;
}

/// A label waiting to be drawn after all other symbols.
#[derive(Debug, Clone)]
pub struct Label {
    pub styling: TextStyling,
    pub text: String,
    pub geometry: Geometry,
}

/// A map drawing request.
#[derive(Debug, Clone)]
pub struct MapRequest {
    pub layers: Vec<LayerRef>,
    pub bbox: BoundingBox,
    pub width: u32,
    pub height: u32,
    /// Scale denominator.
    pub scale: f64,
    /// Extra filters per layer name.
    pub filters: HashMap<String, Filter>,
    /// Environment values for the `env` function.
    pub env: HashMap<String, String>,
}

impl MapRequest {
    pub fn new(layers: Vec<LayerRef>, bbox: BoundingBox, width: u32, height: u32, scale: f64) -> Self {
        Self {
            layers,
            bbox,
            width,
            height,
            scale,
            filters: HashMap::new(),
            env: HashMap::new(),
        }
    }

    /// The evaluation context for this request.
    pub fn context(&self) -> EvalContext {
        EvalContext {
            scale: self.scale,
            env: self.env.clone(),
        }
    }

    pub(crate) fn filter_for(&self, layer: Option<&str>) -> Option<&Filter> {
        layer.and_then(|name| self.filters.get(name))
    }
}

/// Evaluate `style` for one feature, drawing symbols and collecting labels.
pub fn render_feature<R: Renderer + ?Sized>(
    feature: &dyn Feature,
    style: &Style,
    ctx: &EvalContext,
    renderer: &mut R,
    labels: &mut Vec<Label>,
) -> Result<(), Interrupted> {
    for evaluated in style.evaluate(feature, ctx) {
        let Some(geometry) = evaluated.geometry(feature) else {
            debug!(
                symbolizer = evaluated.symbolizer.kind(),
                geometry = ?evaluated.symbolizer.geometry(),
                "Feature has no geometry for symbolizer"
            );
            continue;
        };
        match &evaluated.styling {
            Styling::Text(styling) => {
                if let Some(text) = evaluated.label.filter(|t| !t.is_empty()) {
                    labels.push(Label {
                        styling: styling.clone().into_owned(),
                        text,
                        geometry: geometry.clone(),
                    });
                }
            }
            Styling::Raster(_) => debug!("Raster symbolizer ignored for vector feature"),
            other => renderer.render(other, geometry)?,
        }
    }
    Ok(())
}

impl MapService {
    /// Paint all requested layers, then all collected labels.
    ///
    /// Returns warnings for the client. Unknown layers or styles are errors;
    /// feature store problems are logged and skipped.
    pub async fn paint_map<P>(&self, request: &MapRequest, painter: &mut P) -> WmsResult<Vec<String>>
    where
        P: Renderer + TextRenderer + Send,
    {
        let resolved = self.resolve(&request.layers)?;
        let ctx = request.context();
        let mut labels = Vec::new();
        let mut warnings = Vec::new();

        match collect_feature_queries(self, &resolved, request) {
            Some(plan) if plan.queries.len() == 1 => {
                debug!("Using collected queries for better performance");
                self.paint_batch(plan, &ctx, painter, &mut labels).await?;
            }
            _ => {
                debug!("Not using collected queries");
                for layer in resolved {
                    painter.apply_options(&self.tree.get(layer.id).options);
                    let layer_warnings = self
                        .paint_layer(layer.id, layer.style, request, &ctx, painter, &mut labels)
                        .await?;
                    warnings.extend(layer_warnings);
                }
            }
        }

        for label in &labels {
            painter.render_text(&label.styling, &label.text, &label.geometry)?;
        }
        Ok(warnings)
    }

    async fn paint_batch<P>(
        &self,
        plan: BatchPlan,
        ctx: &EvalContext,
        painter: &mut P,
        labels: &mut Vec<Label>,
    ) -> WmsResult<()>
    where
        P: Renderer + TextRenderer + Send,
    {
        let Some((store_name, queries)) = plan.queries.into_iter().next() else {
            return Ok(());
        };
        if queries.is_empty() {
            warn!("No queries were found for the requested layers");
            return Ok(());
        }
        let Some(store) = self.stores.get(&store_name) else {
            return Ok(());
        };
        let features = match store.query(&queries).await {
            Ok(features) => features,
            Err(e) => {
                warn!(error = %e, store = %store_name, "Data could not be fetched from the feature store");
                return Ok(());
            }
        };
        for feature in features {
            let name = feature.type_name();
            let (Some(layer), Some(style)) = (plan.layers.get(name), plan.styles.get(name)) else {
                continue;
            };
            painter.apply_options(&self.tree.get(*layer).options);
            render_feature(feature.as_ref(), style, ctx, painter, labels)?;
        }
        Ok(())
    }

    /// Whether the children of `id` are visited at `scale`.
    ///
    /// Children are visited whatever the visibility of their parent, except
    /// below a feature layer whose style has no rules at this scale.
    pub fn descends_at(&self, id: LayerId, style: Option<&Style>, scale: f64) -> bool {
        let feature_layer = self.tree.get(id).is_feature_layer();
        !(feature_layer && style.is_some_and(|s| s.is_empty_at(scale)))
    }

    /// Paint one layer and its descendants.
    ///
    /// A layer outside its scale hint is not drawn, but its children still
    /// are unless [`MapService::descends_at`] says otherwise. Children are
    /// painted with their default styles.
    pub(crate) fn paint_layer<'a, P>(
        &'a self,
        id: LayerId,
        style: Option<Arc<Style>>,
        request: &'a MapRequest,
        ctx: &'a EvalContext,
        painter: &'a mut P,
        labels: &'a mut Vec<Label>,
    ) -> BoxFuture<'a, WmsResult<Vec<String>>>
    where
        P: Renderer + TextRenderer + Send + 'a,
    {
        async move {
            let layer = self.tree.get(id);
            let mut warnings = Vec::new();
            debug!(layer = %layer.display_name(), hint = %layer.scale_hint, scale = request.scale, "Scale settings");
            if !layer.scale_hint.contains(request.scale) {
                debug!(layer = %layer.display_name(), "Not showing layer because of its scale constraint");
            } else {
                match &layer.kind {
                    LayerKind::Feature(_) => {
                        self.paint_features(id, style.as_deref(), request, ctx, painter, labels)
                            .await?
                    }
                    LayerKind::Raster(coverage) => {
                        if let Some(style) = &style {
                            for symbolizer in style.select(None, ctx) {
                                if let AnySymbolizer::Raster(raster) = symbolizer {
                                    painter.render_raster(coverage, raster.base())?;
                                }
                            }
                        }
                    }
                    LayerKind::Empty => {}
                }
            }

            if !self.descends_at(id, style.as_deref(), request.scale) {
                debug!(layer = %layer.display_name(), "Style has no rules at this scale, not descending");
                return Ok(warnings);
            }
            for &child in self.tree.children(id) {
                let child_style = self.default_style(child);
                let child_warnings = self
                    .paint_layer(child, child_style, request, ctx, &mut *painter, &mut *labels)
                    .await?;
                warnings.extend(child_warnings);
            }
            Ok(warnings)
        }
        .boxed()
    }

    async fn paint_features<P>(
        &self,
        id: LayerId,
        style: Option<&Style>,
        request: &MapRequest,
        ctx: &EvalContext,
        painter: &mut P,
        labels: &mut Vec<Label>,
    ) -> WmsResult<()>
    where
        P: Renderer + TextRenderer + Send,
    {
        let layer = self.tree.get(id);
        let Some(store) = self.store(id).filter(|s| s.is_available()) else {
            debug!(layer = %layer.display_name(), "Layer is not available, since its feature store is unavailable");
            return Ok(());
        };
        let Some(style) = style else {
            warn!(layer = %layer.display_name(), "Layer has no style, nothing to paint");
            return Ok(());
        };

        let queries = self.layer_queries(
            id,
            Some(style),
            request.bbox,
            request.filter_for(layer.name.as_deref()),
            request.scale,
        );
        if queries.is_empty() {
            warn!(layer = %layer.display_name(), "No queries were generated, is the configuration correct?");
            return Ok(());
        }

        let features = match store.query(&queries).await {
            Ok(features) => features,
            Err(e) => {
                warn!(error = %e, layer = %layer.display_name(), "Data could not be fetched from the feature store");
                return Ok(());
            }
        };

        let max = layer.options.max_features;
        for (count, feature) in features.iter().enumerate() {
            render_feature(feature.as_ref(), style, ctx, painter, labels)?;
            if max.is_some_and(|max| count + 1 >= max) {
                debug!(layer = %layer.display_name(), max = ?max, "Reached max features for layer, stopping");
                break;
            }
        }
        Ok(())
    }
}
