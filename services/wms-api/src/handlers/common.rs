//! Shared handler utilities: error responses and parameter parsing.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use style_common::WmsError;
use tracing::warn;

/// JSON body of an error response, carrying the OGC exception code.
#[derive(Debug, Serialize)]
pub struct ExceptionBody {
    pub code: &'static str,
    pub message: String,
}

/// A [`WmsError`] turned into an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub WmsError);

impl From<WmsError> for ApiError {
    fn from(err: WmsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }
        let body = ExceptionBody {
            code: self.0.wms_exception_code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Split a comma separated parameter. Empty entries are kept, so
/// `styles=,night` names the default style for the first layer.
pub fn split_list(value: Option<&str>) -> Vec<String> {
    match value {
        None | Some("") => Vec::new(),
        Some(v) => v.split(',').map(|s| s.trim().to_string()).collect(),
    }
}

/// Parse a required numeric parameter.
pub fn parse_f64(name: &str, value: Option<&str>) -> Result<f64, WmsError> {
    let value = value.ok_or_else(|| WmsError::MissingParameter(name.to_string()))?;
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| WmsError::InvalidParameter {
            param: name.to_string(),
            message: format!("'{}' is not a number", value),
        })
}

/// A finite bound, or `None` for an open end.
pub fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_keeps_empty_entries() {
        assert_eq!(split_list(Some(",night")), vec!["", "night"]);
        assert!(split_list(Some("")).is_empty());
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn test_parse_f64() {
        assert_eq!(parse_f64("scale", Some("2500")).unwrap(), 2500.0);
        assert!(matches!(parse_f64("scale", None), Err(WmsError::MissingParameter(_))));
        assert!(matches!(
            parse_f64("scale", Some("big")),
            Err(WmsError::InvalidParameter { .. })
        ));
    }
}
