//! Error types for the styling engine and the map service.

use thiserror::Error;

/// Result type alias using WmsError.
pub type WmsResult<T> = Result<T, WmsError>;

/// Result type alias for expression and filter evaluation.
pub type EvalResult<T> = Result<T, EvalError>;

/// Request-level error, reported to clients with an OGC exception code.
#[derive(Debug, Error)]
pub enum WmsError {
    // === Protocol Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Layer not defined: {0}")]
    LayerNotDefined(String),

    #[error("Layer is not queryable: {0}")]
    LayerNotQueryable(String),

    #[error("Style '{style}' is not defined for layer '{layer}'")]
    StyleNotDefined { layer: String, style: String },

    // === Data Errors ===
    #[error("Feature store error: {0}")]
    StoreError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // === Infrastructure Errors ===
    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Request timeout")]
    Timeout,
}

impl WmsError {
    /// Get the OGC WMS exception code for this error.
    pub fn wms_exception_code(&self) -> &'static str {
        match self {
            WmsError::MissingParameter(_) => "MissingParameterValue",
            WmsError::InvalidParameter { .. } => "InvalidParameterValue",
            WmsError::LayerNotDefined(_) => "LayerNotDefined",
            WmsError::LayerNotQueryable(_) => "LayerNotQueryable",
            WmsError::StyleNotDefined { .. } => "StyleNotDefined",
            _ => "NoApplicableCode",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            WmsError::MissingParameter(_)
            | WmsError::InvalidParameter { .. }
            | WmsError::LayerNotQueryable(_) => 400,

            WmsError::LayerNotDefined(_) | WmsError::StyleNotDefined { .. } => 404,

            WmsError::Timeout => 504,

            _ => 500,
        }
    }
}

impl From<std::io::Error> for WmsError {
    fn from(err: std::io::Error) -> Self {
        WmsError::InternalError(err.to_string())
    }
}

/// Recoverable failure while evaluating an expression or filter against a feature.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Value '{0}' is not numeric")]
    NotNumeric(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function '{name}' expects {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
}
