//! Namespace-qualified names for feature types and properties.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A qualified name. Equality ignores prefixes, only namespace and local part count.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    pub namespace: Option<String>,
    pub local: String,
}

impl QName {
    /// A name without namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    /// A name in the given namespace.
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            local: local.into(),
        }
    }

    /// Parse Clark notation (`{ns}local`) or a bare local name.
    ///
    /// A `prefix:local` form keeps only the local part since the prefix
    /// cannot be resolved without the document context.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('{') {
            if let Some((ns, local)) = rest.split_once('}') {
                return Self::new(ns, local);
            }
        }
        match s.split_once(':') {
            Some((_, local)) => Self::local(local),
            None => Self::local(s),
        }
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}
