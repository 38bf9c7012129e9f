//! Common types shared by the styling engine and the map service:
//! errors, qualified names, features, expressions and filters.

pub mod bbox;
pub mod context;
pub mod error;
pub mod expression;
pub mod feature;
pub mod filter;
pub mod qname;

pub use bbox::BoundingBox;
pub use context::EvalContext;
pub use error::{EvalError, EvalResult, WmsError, WmsResult};
pub use expression::Expression;
pub use feature::{Feature, Geometry, SimpleFeature, Value};
pub use filter::{ComparisonOp, Filter};
pub use qname::QName;
