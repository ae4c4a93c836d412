//! Structured logging initialization.
//!
//! Two subscriber layers split by destination, producing JSON records with a
//! fixed key set: `msg`, `lvl`, `ts`, `caller`, `stack`.

use std::fmt;
use std::fs::{self, File};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::Settings;
use crate::types::SyncError;

/// Fixed path used when `-log2std` is not set.
pub const LOG_FILE_PATH: &str = "tmp/log.txt";

/// Initialize the global `tracing` subscriber per `settings.log2std` and
/// `settings.log_level`.
pub fn init(settings: &Settings) -> Result<(), SyncError> {
    let env_filter = EnvFilter::try_new(settings.log_level.as_tracing_filter())
        .map_err(|e| SyncError::Config(format!("invalid log filter: {e}")))?;

    if settings.log2std {
        let stdout_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .compact();
        let stderr_errors = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(tracing_subscriber::filter::LevelFilter::ERROR)
            .compact();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .with(stderr_errors)
            .try_init()
            .map_err(|e| SyncError::Config(format!("failed to install logger: {e}")))?;
    } else {
        let path = Path::new(LOG_FILE_PATH);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(SyncError::Io)?;
        }
        let file = File::create(path).map_err(SyncError::Io)?;

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .event_format(DsyncJsonFormat);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .try_init()
            .map_err(|e| SyncError::Config(format!("failed to install logger: {e}")))?;
    }

    Ok(())
}

/// A `FormatEvent` producing exactly the fixed key set: `msg`, `lvl`, `ts`,
/// `caller`, `stack`. Serialized through `serde_json` rather than
/// hand-rolled string escaping.
struct DsyncJsonFormat;

impl<S, N> FormatEvent<S, N> for DsyncJsonFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let mut fields = Map::new();
        let mut visitor = JsonFieldVisitor { fields: &mut fields };
        event.record(&mut visitor);

        let msg = fields
            .remove("message")
            .unwrap_or_else(|| Value::String(String::new()));

        let caller = match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => format!("{file}:{line}"),
            (Some(file), None) => file.to_string(),
            _ => metadata.target().to_string(),
        };

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        let mut record = Map::new();
        record.insert("ts".to_string(), Value::from(now.as_secs_f64()));
        record.insert("lvl".to_string(), Value::String(level_key(*metadata.level()).to_string()));
        record.insert("caller".to_string(), Value::String(caller));
        record.insert("msg".to_string(), msg);
        // No per-call stack capture is wired up; the key stays in the fixed
        // set but is left empty.
        record.insert("stack".to_string(), Value::String(String::new()));
        for (key, value) in fields {
            record.entry(key).or_insert(value);
        }

        let line = serde_json::to_string(&record).map_err(|_| fmt::Error)?;
        writeln!(writer, "{line}")
    }
}

struct JsonFieldVisitor<'a> {
    fields: &'a mut Map<String, Value>,
}

impl tracing::field::Visit for JsonFieldVisitor<'_> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields
            .insert(field.name().to_string(), Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }
}

fn level_key(level: Level) -> &'static str {
    match level {
        Level::TRACE | Level::DEBUG => "DEBUG",
        Level::INFO => "INFO",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
    }
}
