//! HTTP request handlers.
//!
//! - `api`: layer tree, style and map plan inspection
//! - `health`: liveness check
//! - `common`: error responses and parameter parsing

pub mod api;
pub mod common;
pub mod health;

pub use api::{layers_handler, plan_handler, stored_style_handler, styles_handler};
pub use common::ApiError;
pub use health::health_handler;
