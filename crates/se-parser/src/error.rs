//! Structural parse errors.
//!
//! Problems with a single attribute are logged and recovered where they
//! occur; only errors that make the whole style unusable end up here.

use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("Document has no root element")]
    Empty,

    #[error("Unexpected element '{found}' at {location}, expected {expected}")]
    Unexpected {
        expected: String,
        found: String,
        location: String,
    },

    #[error("Missing element '{element}' in '{parent}' at {location}")]
    Missing {
        element: String,
        parent: String,
        location: String,
    },

    #[error("Invalid {what} at {location}: {message}")]
    Invalid {
        what: String,
        location: String,
        message: String,
    },

    #[error("Failed to read '{path}': {message}")]
    Resource { path: String, message: String },
}
