//! The logger collaborator.
//!
//! Callers may hand the supervisor their own logger through
//! [`ConnectOptions`](crate::options::ConnectOptions). When they don't, the
//! supervisor logs through [`TracingLogger`], which forwards to the `tracing`
//! macros so output ends up wherever the host installed its subscriber.

use std::{fmt, sync::Arc};

use serde_json::{Map, Value};

/// Log severity, including the `fatal` level `tracing` does not have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leveled logging with an optional structured context object.
pub trait Logger: Send + Sync + fmt::Debug {
    fn log(&self, level: Level, message: &str, context: Option<&Value>);

    /// Derives a logger that attaches `fields` to every record.
    fn child(&self, fields: Map<String, Value>) -> Arc<dyn Logger>;

    fn debug(&self, message: &str, context: Option<&Value>) {
        self.log(Level::Debug, message, context);
    }

    fn info(&self, message: &str, context: Option<&Value>) {
        self.log(Level::Info, message, context);
    }

    fn warn(&self, message: &str, context: Option<&Value>) {
        self.log(Level::Warn, message, context);
    }

    fn error(&self, message: &str, context: Option<&Value>) {
        self.log(Level::Error, message, context);
    }

    fn fatal(&self, message: &str, context: Option<&Value>) {
        self.log(Level::Fatal, message, context);
    }
}

/// Default logger backed by `tracing`.
///
/// `fatal` records are emitted at ERROR level with `fatal = true`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    fields: Map<String, Value>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: Option<&Value>) {
        let fields = Value::Object(self.fields.clone());
        let context = context.cloned().unwrap_or(Value::Null);
        match level {
            Level::Debug => tracing::debug!(%fields, %context, "{}", message),
            Level::Info => tracing::info!(%fields, %context, "{}", message),
            Level::Warn => tracing::warn!(%fields, %context, "{}", message),
            Level::Error => tracing::error!(%fields, %context, "{}", message),
            Level::Fatal => tracing::error!(fatal = true, %fields, %context, "{}", message),
        }
    }

    fn child(&self, fields: Map<String, Value>) -> Arc<dyn Logger> {
        let mut merged = self.fields.clone();
        merged.extend(fields);
        Arc::new(TracingLogger { fields: merged })
    }
}


#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{testing::RecordingLogger, *};

    #[test]
    fn test_level_ordering() {
        assert!(Level::Fatal > Level::Error);
        assert!(Level::Info > Level::Debug);
        assert_eq!(Level::Warn.to_string(), "warn");
    }

    #[test]
    fn test_child_merges_fields() {
        let root = TracingLogger::new();
        let mut fields = Map::new();
        fields.insert("package".into(), json!("connwarden"));
        let child = root.child(fields);
        // Logging through the child must not panic without a subscriber.
        child.fatal("Connection error", Some(&json!({ "error": "boom" })));
    }

    #[test]
    fn test_convenience_methods_record_levels() {
        let logger = RecordingLogger::new();
        logger.debug("d", None);
        logger.info("i", None);
        logger.warn("w", None);
        logger.error("e", None);
        logger.fatal("f", Some(&json!({ "k": 1 })));

        let levels: Vec<Level> = logger.records().iter().map(|r| r.level).collect();
        assert_eq!(
            levels,
            vec![Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Fatal]
        );
        assert_eq!(logger.records()[4].context, Some(json!({ "k": 1 })));
    }

    #[test]
    fn test_recording_child_shares_records() {
        let logger = RecordingLogger::new();
        let mut fields = Map::new();
        fields.insert("package".into(), json!("connwarden"));
        let child = logger.child(fields);
        child.info("hello", None);

        let records = logger.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields.get("package"), Some(&json!("connwarden")));
    }
}
