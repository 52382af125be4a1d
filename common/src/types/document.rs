use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Canonical timestamp format written to the destination store:
/// ISO-8601 with milliseconds, always UTC.
pub const CREATED_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Conventional name of the creation-timestamp field on source documents.
pub const CREATED_DATE_FIELD: &str = "date_created";

/// One source document: an ordered field -> value mapping.
///
/// Field order is preserved end to end (serde_json is built with
/// `preserve_order`). Documents are owned transiently by the pipeline and
/// are never mutated after being handed to the destination writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self { fields: Map::new() }
    }

    pub fn from_value(value: Value) -> Result<Self, AppError> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(AppError::MalformedResponse(format!(
                "expected a JSON object document, got: {other}"
            ))),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: &str, value: Value) {
        self.fields.insert(field.to_string(), value);
    }

    /// A field counts as present only when it holds a non-null value.
    pub fn has_field(&self, field: &str) -> bool {
        matches!(self.fields.get(field), Some(value) if !value.is_null())
    }

    /// Extracts the textual content of a field. Scalar values are rendered
    /// directly; a list of scalars is joined with newlines.
    pub fn field_text(&self, field: &str) -> Option<String> {
        fn scalar_text(value: &Value) -> Option<String> {
            match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            }
        }

        match self.fields.get(field)? {
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            other => scalar_text(other),
        }
    }

    /// Rewrites the creation-timestamp field to [`CREATED_DATE_FORMAT`].
    ///
    /// The source may deliver the value as epoch milliseconds or as a native
    /// ISO date string; both normalize to the identical output for the same
    /// instant. Absent or unparseable values are left untouched.
    pub fn normalize_created_date(&mut self, field: &str) {
        let Some(normalized) = self.fields.get(field).and_then(normalize_date_value) else {
            return;
        };
        self.fields.insert(field.to_string(), Value::String(normalized));
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_date_value(value: &Value) -> Option<String> {
    let instant: DateTime<Utc> = match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_i64()?)?,
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        _ => return None,
    };
    Some(instant.format(CREATED_DATE_FORMAT).to_string())
}
