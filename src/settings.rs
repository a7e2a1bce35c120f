//! Named application settings.
//!
//! Settings are a flat map from a human-readable name to a JSON value, read
//! by the framework when it builds the router and per request by the init
//! middleware. Unknown names are stored untouched so applications can keep
//! their own values next to the framework's.

use std::collections::HashMap;

use serde_json::Value;

/// Route paths compare case-sensitively. Default: enabled.
pub const CASE_SENSITIVE_ROUTING: &str = "case sensitive routing";

/// `/users` and `/users/` are different routes. Default: enabled.
pub const STRICT_ROUTING: &str = "strict routing";

/// Indentation width used by [`Response::json`](crate::Response::json).
/// Unset means compact output.
pub const JSON_SPACES: &str = "json spaces";

/// Adds `X-Powered-By: strata` to every response. Default: enabled.
pub const X_POWERED_BY: &str = "x-powered-by";

/// Largest request body, in bytes, the listener reads before dispatch.
/// Default: [`DEFAULT_BODY_LIMIT`].
pub const BODY_LIMIT: &str = "body limit";

pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024; // 2MB

#[derive(Clone, Debug, Default)]
pub struct Settings {
    values: HashMap<String, Value>,
}

impl Settings {
    /// The defaults an [`Application`](crate::Application) starts with.
    pub fn defaults() -> Self {
        let mut settings = Self::default();
        settings.set(CASE_SENSITIVE_ROUTING, true);
        settings.set(STRICT_ROUTING, true);
        settings.set(X_POWERED_BY, true);
        settings.set(BODY_LIMIT, DEFAULT_BODY_LIMIT);
        settings
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    /// Whether `name` holds a truthy value. Missing settings are disabled.
    ///
    /// `false`, `null`, `0`, and `""` are falsy; everything else is truthy.
    pub fn enabled(&self, name: &str) -> bool {
        match self.values.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(_) | Value::Object(_)) => true,
        }
    }

    pub fn disabled(&self, name: &str) -> bool {
        !self.enabled(name)
    }

    /// The request body limit. Falls back to the default when the setting is
    /// missing or not a byte count.
    pub fn body_limit(&self) -> usize {
        self.values
            .get(BODY_LIMIT)
            .and_then(Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(DEFAULT_BODY_LIMIT)
    }
}
