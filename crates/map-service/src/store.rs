//! Access to feature stores.

use std::sync::Arc;

use async_trait::async_trait;
use style_common::{BoundingBox, Feature, Filter, QName, WmsResult};

/// A query against one feature type of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub feature_type: QName,
    pub bbox: BoundingBox,
    pub filter: Option<Filter>,
    /// Scale denominator, rounded.
    pub scale: f64,
    /// `None` for no limit.
    pub max_features: Option<usize>,
}

/// A source of features, queried per map or feature info request.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// The feature types this store serves.
    fn feature_types(&self) -> Vec<QName>;

    fn has_feature_type(&self, name: &QName) -> bool {
        self.feature_types().iter().any(|t| t == name)
    }

    /// Whether the store can currently answer queries.
    fn is_available(&self) -> bool {
        true
    }

    /// Run several queries at once, returning the features of all of them.
    async fn query(&self, queries: &[Query]) -> WmsResult<Vec<Arc<dyn Feature>>>;
}
