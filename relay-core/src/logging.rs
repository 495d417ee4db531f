use crate::config::{LogFormat, LogOutput, LoggingConfig};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        format::{JsonFields, Writer},
        writer::BoxMakeWriter,
        FmtContext, FormatEvent, FormatFields, FormattedFields, MakeWriter,
    },
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Field names whose values never reach the log output when redaction is on
const SENSITIVE_KEYS: [&str; 5] = ["password", "secret", "token", "credential", "auth"];

/// Structured log entry for JSON output
#[derive(Debug, Serialize)]
pub struct StructuredLogEntry {
    /// Timestamp in RFC3339 format
    pub timestamp: String,
    pub level: String,
    /// Component/module name
    pub component: String,
    pub message: String,
    /// Spans the event was emitted in, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<SpanEntry>,
    #[serde(flatten)]
    pub fields: HashMap<String, serde_json::Value>,
}

/// One enclosing span and the fields recorded on it
#[derive(Debug, Serialize)]
pub struct SpanEntry {
    pub name: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,
}

/// Custom JSON formatter for structured logging
pub struct JsonFormatter {
    redact_sensitive: bool,
}

impl JsonFormatter {
    pub fn new(redact_sensitive: bool) -> Self {
        Self { redact_sensitive }
    }

    fn redact_fields(&self, fields: &mut HashMap<String, serde_json::Value>) {
        if !self.redact_sensitive {
            return;
        }

        for (key, value) in fields.iter_mut() {
            let key_lower = key.to_lowercase();
            if SENSITIVE_KEYS.iter().any(|&sensitive| key_lower.contains(sensitive)) {
                *value = serde_json::Value::String("[REDACTED]".to_string());
            }
        }
    }

    /// Decode the fields stored on a span. They are JSON when the layer
    /// records spans with [`JsonFields`]; anything else is kept as `raw`.
    fn span_fields(&self, recorded: &str) -> HashMap<String, serde_json::Value> {
        if recorded.is_empty() {
            return HashMap::new();
        }

        let mut fields = match serde_json::from_str::<HashMap<String, serde_json::Value>>(recorded) {
            Ok(fields) => fields,
            Err(_) => {
                let lower = recorded.to_lowercase();
                let raw = if self.redact_sensitive
                    && SENSITIVE_KEYS.iter().any(|&sensitive| lower.contains(sensitive))
                {
                    "[REDACTED]".to_string()
                } else {
                    recorded.to_string()
                };
                HashMap::from([("raw".to_string(), serde_json::Value::String(raw))])
            }
        };
        self.redact_fields(&mut fields);
        fields
    }
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();

        let spans = match ctx.event_scope() {
            Some(scope) => scope
                .from_root()
                .map(|span| {
                    let fields = span
                        .extensions()
                        .get::<FormattedFields<N>>()
                        .map(|recorded| self.span_fields(&recorded.fields))
                        .unwrap_or_default();
                    SpanEntry {
                        name: span.name().to_string(),
                        fields,
                    }
                })
                .collect(),
            None => Vec::new(),
        };

        let mut fields = HashMap::new();
        event.record(&mut JsonFieldVisitor::new(&mut fields));
        self.redact_fields(&mut fields);

        let message = fields
            .remove("message")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let entry = StructuredLogEntry {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: metadata.level().to_string().to_uppercase(),
            component: metadata.target().to_string(),
            message,
            spans,
            fields,
        };

        let json = serde_json::to_string(&entry).map_err(|_| fmt::Error)?;
        writeln!(writer, "{}", json)
    }
}

/// Visitor for collecting event fields into a HashMap
struct JsonFieldVisitor<'a> {
    fields: &'a mut HashMap<String, serde_json::Value>,
}

impl<'a> JsonFieldVisitor<'a> {
    fn new(fields: &'a mut HashMap<String, serde_json::Value>) -> Self {
        Self { fields }
    }
}

impl<'a> tracing::field::Visit for JsonFieldVisitor<'a> {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::String(format!("{:?}", value)),
        );
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::String(value.to_string()),
        );
    }

    fn record_i64(&mut self, field: &tracing::field::Field, value: i64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_u64(&mut self, field: &tracing::field::Field, value: u64) {
        self.fields.insert(
            field.name().to_string(),
            serde_json::Value::Number(serde_json::Number::from(value)),
        );
    }

    fn record_bool(&mut self, field: &tracing::field::Field, value: bool) {
        self.fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, Box<dyn std::error::Error + Send + Sync>> {
    let mut filter = EnvFilter::try_new(&config.level)?;
    for (component, level) in &config.component_levels {
        filter = filter.add_directive(format!("{}={}", component, level).parse()?);
    }
    Ok(filter)
}

/// JSON output layer. Span fields are recorded as JSON so the formatter can
/// attach them to every event emitted inside the span.
pub fn json_layer<S, W>(
    redact_sensitive: bool,
    writer: W,
) -> tracing_subscriber::fmt::Layer<S, JsonFields, JsonFormatter, W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + 'static,
{
    tracing_subscriber::fmt::layer()
        .fmt_fields(JsonFields::new())
        .event_format(JsonFormatter::new(redact_sensitive))
        .with_writer(writer)
}

/// Initialize the logging system with the given configuration
pub fn init_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = build_filter(config)?;

    let (writer, ansi) = match &config.output {
        LogOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        LogOutput::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
    };

    let layer = match config.format {
        LogFormat::Json => json_layer(config.redact_sensitive_data, writer).boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(ansi)
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry().with(filter).with(layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct CapturedOutput(Arc<Mutex<Vec<u8>>>);

    impl CapturedOutput {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for CapturedOutput {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_json(redact: bool, emit: impl FnOnce()) -> serde_json::Value {
        let output = CapturedOutput::default();
        let writer = output.clone();
        let subscriber =
            tracing_subscriber::registry().with(json_layer(redact, move || writer.clone()));
        tracing::subscriber::with_default(subscriber, emit);

        let contents = output.contents();
        assert_eq!(contents.lines().count(), 1, "unexpected output: {}", contents);
        serde_json::from_str(contents.trim_end()).unwrap()
    }

    #[test]
    fn test_json_lines_carry_connection_span_fields() {
        let line = capture_json(true, || {
            let span = tracing::info_span!(
                "connection",
                id = "c0ffee-1234",
                peer = %"1.2.3.4:5",
                pool_password = "hunter2"
            );
            let _entered = span.enter();
            tracing::info!(value = 7u64, "Share 7 classified Accepted");
        });

        assert_eq!(line["level"], "INFO");
        assert_eq!(line["message"], "Share 7 classified Accepted");
        assert_eq!(line["value"], 7);
        assert_eq!(line["spans"][0]["name"], "connection");
        assert_eq!(line["spans"][0]["fields"]["id"], "c0ffee-1234");
        assert_eq!(line["spans"][0]["fields"]["peer"], "1.2.3.4:5");
        assert_eq!(line["spans"][0]["fields"]["pool_password"], "[REDACTED]");
    }

    #[test]
    fn test_json_lines_outside_spans_have_no_span_list() {
        let line = capture_json(true, || tracing::warn!("Port 6661 is in use"));
        assert_eq!(line["level"], "WARN");
        assert!(line.get("spans").is_none());
    }

    #[test]
    fn test_field_redaction() {
        let formatter = JsonFormatter::new(true);
        let mut fields = HashMap::new();
        fields.insert("pool_password".to_string(), serde_json::json!("hunter2"));
        fields.insert("rpc_auth".to_string(), serde_json::json!("rpcuser:rpcpassword"));
        fields.insert("pool_url".to_string(), serde_json::json!("stratum+tcp://p"));

        formatter.redact_fields(&mut fields);

        assert_eq!(fields["pool_password"], serde_json::json!("[REDACTED]"));
        assert_eq!(fields["rpc_auth"], serde_json::json!("[REDACTED]"));
        assert_eq!(fields["pool_url"], serde_json::json!("stratum+tcp://p"));
    }

    #[test]
    fn test_redaction_can_be_disabled() {
        let formatter = JsonFormatter::new(false);
        let mut fields = HashMap::new();
        fields.insert("password".to_string(), serde_json::json!("hunter2"));
        formatter.redact_fields(&mut fields);
        assert_eq!(fields["password"], serde_json::json!("hunter2"));
    }

    #[test]
    fn test_filter_accepts_component_levels() {
        let mut config = LoggingConfig::default();
        config
            .component_levels
            .insert("relay_core::server".to_string(), "debug".to_string());
        assert!(build_filter(&config).is_ok());

        config
            .component_levels
            .insert("relay_core::connection".to_string(), "loud".to_string());
        assert!(build_filter(&config).is_err());
    }
}
