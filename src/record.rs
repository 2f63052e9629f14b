//! Telemetry records and their DJSON wire encoding.
//!
//! A [`Record`] carries a process-unique tag, a last-touch instant used by
//! the resender to age entries out of the pending-ack cache, and the encoded
//! payload. The wire form is a length-prefixed JSON array line:
//!
//! ```text
//! 110
//! ["syslog",53,3,[["timestamp","FT_TIME"],["message","FT_STRING"]],[[1475129808,541868180],"This is a message"]]
//! ```
//!
//! [`DjsonBuilder`] accumulates typed fields and resolves the schema id
//! through the process-wide [`SchemaRegistry`](crate::schema::SchemaRegistry).

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::error::ShipError;
use crate::schema::SchemaRegistry;

/// Tags must be unique for the lifetime of the process; a shared counter
/// keeps them monotonically increasing across all producer threads.
static TAG_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_tag() -> String {
    (TAG_COUNTER.fetch_add(1, Ordering::Relaxed) + 1).to_string()
}

/// One telemetry record, shared between the ingestion queue, the pending-ack
/// cache, and the worker threads.
pub struct Record {
    tag: String,
    touched: Mutex<Instant>,
    source: String,
    schema_and_data: String,
    encoded: OnceCell<String>,
}

impl Record {
    /// Build a record from a pre-composed `schemaId,schemaArray,dataArray`
    /// body, as produced by an upstream encoder.
    pub fn djson(
        source: impl Into<String>,
        schema_and_data: impl Into<String>,
    ) -> Result<Self, ShipError> {
        let source = source.into();
        let schema_and_data = schema_and_data.into();
        if source.is_empty() {
            return Err(ShipError::InvalidArgument(
                "record source must not be empty".into(),
            ));
        }
        if schema_and_data.is_empty() {
            return Err(ShipError::InvalidArgument(
                "record body must not be empty".into(),
            ));
        }
        Ok(Self {
            tag: next_tag(),
            touched: Mutex::new(Instant::now()),
            source,
            schema_and_data,
            encoded: OnceCell::new(),
        })
    }

    /// The record's process-unique decimal tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Refresh the last-touch instant.
    pub fn touch(&self) {
        *self.touched.lock() = Instant::now();
    }

    /// Milliseconds since the record was last touched. Construction counts
    /// as the first touch.
    pub fn age_ms(&self) -> u64 {
        self.touched.lock().elapsed().as_millis() as u64
    }

    /// The full wire encoding. Composed on first call and cached; the tag
    /// never changes, so neither does the encoding.
    pub fn wire(&self) -> &str {
        self.encoded.get_or_init(|| {
            let body = format!("[\"{}\",{},{}]", self.source, self.tag, self.schema_and_data);
            format!("{}\n{}", body.len(), body)
        })
    }

    pub fn wire_bytes(&self) -> &[u8] {
        self.wire().as_bytes()
    }
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("tag", &self.tag)
            .field("source", &self.source)
            .finish()
    }
}

/// A typed field value. The type tokens form a closed set understood by the
/// collector.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Double(f64),
    /// A timestamp, encoded on the wire as `[seconds,nanoseconds]`.
    Time { secs: i64, nanos: u32 },
    Str(String),
}

impl FieldValue {
    pub(crate) fn type_token(&self) -> &'static str {
        match self {
            FieldValue::Bool(_) => "FT_BOOL",
            FieldValue::Int32(_) => "FT_INT32",
            FieldValue::Int64(_) => "FT_INT64",
            FieldValue::Double(_) => "FT_DOUBLE",
            FieldValue::Time { .. } => "FT_TIME",
            FieldValue::Str(_) => "FT_STRING",
        }
    }

    fn write_to(&self, out: &mut String) {
        match self {
            FieldValue::Bool(v) => out.push_str(if *v { "true" } else { "false" }),
            FieldValue::Int32(v) => {
                let _ = write!(out, "{v}");
            }
            FieldValue::Int64(v) => {
                let _ = write!(out, "{v}");
            }
            FieldValue::Double(v) => {
                let _ = write!(out, "{v}");
            }
            FieldValue::Time { secs, nanos } => {
                let _ = write!(out, "[{secs},{nanos}]");
            }
            FieldValue::Str(v) => out.push_str(&json_quote(v)),
        }
    }
}

fn json_quote(value: &str) -> String {
    serde_json::to_string(value).expect("JSON string encoding is infallible")
}

/// Builder accumulating typed fields into a [`Record`].
#[derive(Clone, Debug)]
pub struct DjsonBuilder {
    source: String,
    fields: Vec<(String, FieldValue)>,
}

impl DjsonBuilder {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            fields: Vec::new(),
        }
    }

    /// Start a builder for an ETW-shaped record: the provider GUID and the
    /// event id are mandatory and always come first.
    pub fn etw(source: impl Into<String>, guid: impl Into<String>, event_id: i32) -> Self {
        Self::new(source)
            .str_field("GUID", guid)
            .int32_field("EventId", event_id)
    }

    pub fn field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push((name.into(), value));
        self
    }

    pub fn bool_field(self, name: impl Into<String>, value: bool) -> Self {
        self.field(name, FieldValue::Bool(value))
    }

    pub fn int32_field(self, name: impl Into<String>, value: i32) -> Self {
        self.field(name, FieldValue::Int32(value))
    }

    pub fn int64_field(self, name: impl Into<String>, value: i64) -> Self {
        self.field(name, FieldValue::Int64(value))
    }

    pub fn double_field(self, name: impl Into<String>, value: f64) -> Self {
        self.field(name, FieldValue::Double(value))
    }

    pub fn time_field(self, name: impl Into<String>, secs: i64, nanos: u32) -> Self {
        self.field(name, FieldValue::Time { secs, nanos })
    }

    pub fn str_field(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.field(name, FieldValue::Str(value.into()))
    }

    /// Resolve the schema against the process-wide registry and build the
    /// record.
    pub fn build(self) -> Result<Record, ShipError> {
        self.build_with(SchemaRegistry::global())
    }

    pub(crate) fn build_with(self, registry: &SchemaRegistry) -> Result<Record, ShipError> {
        if self.fields.is_empty() {
            return Err(ShipError::InvalidArgument(
                "record must contain at least one field".into(),
            ));
        }
        if self.fields.iter().any(|(name, _)| name.is_empty()) {
            return Err(ShipError::InvalidArgument(
                "field names must not be empty".into(),
            ));
        }

        let pairs: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.type_token()))
            .collect();
        let (schema_id, schema_encoding) = registry.resolve(&pairs)?;

        let mut data = String::from("[");
        for (i, (_, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                data.push(',');
            }
            value.write_to(&mut data);
        }
        data.push(']');

        Record::djson(
            self.source,
            format!("{schema_id},{schema_encoding},{data}"),
        )
    }
}
