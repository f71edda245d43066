//! Connect options and the option resolver.
//!
//! [`ConnectOptions`] is what a caller hands to `connect()`. The resolver
//! turns it into [`TransportOptions`], the mapping actually passed to the
//! driver: built-in defaults overlaid with the caller's tuning keys, minus
//! the fields that only concern the supervisor (URI and logger).
//!
//! ```ignore
//! let options = ConnectOptions::new("mongodb://db:27017/app")
//!     .with_transport("socketTimeoutMS", 45_000)
//!     .with_transport("tls", serde_json::json!({ "enabled": true }));
//!
//! let resolved = resolve_transport_options(&options);
//! assert_eq!(resolved.get("ssl"), Some(&serde_json::json!(false)));
//! assert!(resolved.get("dbUri").is_none());
//! ```

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::logging::Logger;

/// Keys that never reach the driver.
const STRIPPED_KEYS: [&str; 3] = ["dbUri", "db_uri", "logger"];

/// Built-in transport defaults. Timeouts of `0` mean "never time out".
pub fn default_transport_options() -> Map<String, Value> {
    let defaults = json!({
        "ssl": false,
        "keepAlive": 30000,
        "socketTimeoutMS": 0,
        "serverSelectionTimeoutMS": 0,
        "autoReconnect": true,
    });
    match defaults {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Options supplied by the caller of `connect()`.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Logical database URI handed to the driver's connect call.
    pub db_uri: String,

    /// Logger override. Defaults to the `tracing`-backed logger.
    pub logger: Option<Arc<dyn Logger>>,

    /// Turns on verbose driver tracing. Hurts performance.
    pub debug: bool,

    /// Driver tuning (timeouts, TLS, pool size, ...). Unknown keys pass through.
    pub transport: Map<String, Value>,
}

impl ConnectOptions {
    pub fn new(db_uri: impl Into<String>) -> Self {
        Self {
            db_uri: db_uri.into(),
            ..Default::default()
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets one transport key, replacing any previous value.
    pub fn with_transport(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.transport.insert(key.into(), value.into());
        self
    }

    pub fn with_transport_map(mut self, transport: Map<String, Value>) -> Self {
        self.transport = transport;
        self
    }
}

/// Options handed to the driver, already merged and stripped.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct TransportOptions(Map<String, Value>);

impl TransportOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolves the driver options for a connect call.
///
/// Pure: the same `ConnectOptions` always yields the same result.
pub fn resolve_transport_options(options: &ConnectOptions) -> TransportOptions {
    let mut resolved = default_transport_options();
    merge_into(&mut resolved, &options.transport);
    for key in STRIPPED_KEYS {
        resolved.remove(key);
    }
    TransportOptions(resolved)
}

/// Overlays `overlay` onto `base`. Objects merge recursively; any other
/// value replaces what was there.
fn merge_into(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::TracingLogger;

    #[test]
    fn test_defaults_when_nothing_supplied() {
        let resolved = resolve_transport_options(&ConnectOptions::new("db://x"));
        assert_eq!(resolved.as_map(), &default_transport_options());
        assert_eq!(resolved.get_bool("ssl"), Some(false));
        assert_eq!(resolved.get_u64("keepAlive"), Some(30000));
    }

    #[test]
    fn test_caller_values_win() {
        let options = ConnectOptions::new("db://x")
            .with_transport("ssl", true)
            .with_transport("socketTimeoutMS", 45_000);
        let resolved = resolve_transport_options(&options);
        assert_eq!(resolved.get_bool("ssl"), Some(true));
        assert_eq!(resolved.get_u64("socketTimeoutMS"), Some(45_000));
        assert_eq!(resolved.get_u64("serverSelectionTimeoutMS"), Some(0));
    }

    #[test]
    fn test_uri_and_logger_are_stripped() {
        let options = ConnectOptions::new("db://x")
            .with_logger(Arc::new(TracingLogger::new()))
            .with_transport("dbUri", "db://other")
            .with_transport("db_uri", "db://other")
            .with_transport("logger", "stdout");
        let resolved = resolve_transport_options(&options);
        assert!(resolved.get("dbUri").is_none());
        assert!(resolved.get("db_uri").is_none());
        assert!(resolved.get("logger").is_none());
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let options = ConnectOptions::new("db://x").with_transport("maxPoolSize", 20);
        let resolved = resolve_transport_options(&options);
        assert_eq!(resolved.get_u64("maxPoolSize"), Some(20));
    }

    #[test]
    fn test_nested_objects_merge_deeply() {
        let mut transport = Map::new();
        transport.insert("tls".into(), json!({ "caFile": "/etc/ca.pem" }));
        let base = ConnectOptions::new("db://x").with_transport_map(transport);
        let first = resolve_transport_options(&base);

        let mut more = Map::new();
        more.insert("tls".into(), json!({ "allowInvalidHostnames": true }));
        let mut target = first.into_map();
        merge_into(&mut target, &more);

        assert_eq!(
            target.get("tls"),
            Some(&json!({ "caFile": "/etc/ca.pem", "allowInvalidHostnames": true }))
        );
    }

    #[test]
    fn test_non_object_replaces_object() {
        let mut base = Map::new();
        base.insert("tls".into(), json!({ "enabled": true }));
        let mut overlay = Map::new();
        overlay.insert("tls".into(), json!(false));
        merge_into(&mut base, &overlay);
        assert_eq!(base.get("tls"), Some(&json!(false)));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let options = ConnectOptions::new("db://x")
            .with_transport("keepAlive", 1000)
            .with_transport("appName", "svc");
        assert_eq!(
            resolve_transport_options(&options),
            resolve_transport_options(&options)
        );
    }
}
