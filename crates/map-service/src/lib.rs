//! Map service core: the layer tree, style registry and map painting.
//!
//! A [`MapService`] is built from a [`ServiceConfig`]. It loads all
//! configured styles into a shared [`StyleRegistry`], derives the scale
//! band of every layer and paints maps through a caller supplied
//! [`Renderer`].

pub mod batch;
pub mod config;
pub mod feature_info;
pub mod layer;
pub mod paint;
pub mod registry;
pub mod service;
pub mod store;

pub use batch::{batch_precondition, collect_feature_queries, BatchPlan};
pub use config::{LayerConfig, LayerSource, ServiceConfig};
pub use feature_info::{group_by_type, FeatureInfoRequest};
pub use layer::{
    derive_scale_hints, Antialias, Interpolation, Layer, LayerId, LayerKind, LayerOptions,
    LayerTree, OptionOverrides, Quality, ScaleConfig, ScaleHint,
};
pub use paint::{render_feature, Interrupted, Label, MapRequest, Renderer, TextRenderer};
pub use registry::{StyleRegistry, DEFAULT_STYLE};
pub use service::{LayerRef, MapService, ResolvedLayer};
pub use store::{FeatureStore, Query};
