//! Request-scoped evaluation context.

use std::collections::HashMap;

/// Values a filter or expression may read besides the feature itself.
///
/// Built once per map request and passed down explicitly to every
/// evaluation call.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    /// Scale denominator of the current request.
    pub scale: f64,
    /// Environment variables supplied with the request (`ENV` parameter).
    pub env: HashMap<String, String>,
}

impl EvalContext {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            env: HashMap::new(),
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Look up an environment variable, case-insensitively.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env
            .get(key)
            .or_else(|| {
                self.env
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}
