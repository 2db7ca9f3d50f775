//! Newline-delimited messages emitted by the upstream extractor.

use serde_json::{Map, Value as JsonValue};
use std::collections::HashSet;
use tracing::warn;

use crate::record::{record_from_json, Record, Value};

/// One parsed input line
#[derive(Debug)]
pub enum Message {
    Schema(SchemaMessage),
    Record(RecordMessage),
    State(JsonValue),
}

#[derive(Debug)]
pub struct SchemaMessage {
    pub stream: String,
    pub schema: JsonValue,
    pub key_properties: Vec<String>,
}

#[derive(Debug)]
pub struct RecordMessage {
    pub stream: String,
    pub record: Map<String, JsonValue>,
}

#[derive(Debug)]
pub enum MessageError {
    Json(String),
    MissingField(&'static str),
    UnknownType(String),
    UnknownStream(String),
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageError::Json(e) => write!(f, "invalid message JSON: {}", e),
            MessageError::MissingField(field) => write!(f, "message is missing '{}'", field),
            MessageError::UnknownType(t) => write!(f, "unknown message type '{}'", t),
            MessageError::UnknownStream(s) => {
                write!(f, "record for stream '{}' arrived before its schema", s)
            }
        }
    }
}

impl std::error::Error for MessageError {}

impl Message {
    /// Parse a single input line.
    pub fn parse(line: &str) -> Result<Message, MessageError> {
        let value: JsonValue =
            serde_json::from_str(line).map_err(|e| MessageError::Json(e.to_string()))?;
        let JsonValue::Object(mut obj) = value else {
            return Err(MessageError::Json("message is not an object".to_string()));
        };

        let kind = match obj.remove("type") {
            Some(JsonValue::String(kind)) => kind,
            _ => return Err(MessageError::MissingField("type")),
        };

        match kind.as_str() {
            "SCHEMA" => {
                let stream = take_string(&mut obj, "stream")?;
                let schema = obj
                    .remove("schema")
                    .ok_or(MessageError::MissingField("schema"))?;
                let key_properties = match obj.remove("key_properties") {
                    Some(JsonValue::Array(keys)) => keys
                        .into_iter()
                        .filter_map(|k| k.as_str().map(str::to_string))
                        .collect(),
                    _ => Vec::new(),
                };
                Ok(Message::Schema(SchemaMessage {
                    stream,
                    schema,
                    key_properties,
                }))
            }
            "RECORD" => {
                let stream = take_string(&mut obj, "stream")?;
                let record = match obj.remove("record") {
                    Some(JsonValue::Object(record)) => record,
                    _ => return Err(MessageError::MissingField("record")),
                };
                Ok(Message::Record(RecordMessage { stream, record }))
            }
            "STATE" => Ok(Message::State(obj.remove("value").unwrap_or(JsonValue::Null))),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }
}

fn take_string(obj: &mut Map<String, JsonValue>, field: &'static str) -> Result<String, MessageError> {
    match obj.remove(field) {
        Some(JsonValue::String(s)) if !s.is_empty() => Ok(s),
        _ => Err(MessageError::MissingField(field)),
    }
}

impl SchemaMessage {
    /// Top-level properties declared with `"format": "date-time"`.
    pub fn datetime_fields(&self) -> HashSet<String> {
        self.schema
            .get("properties")
            .and_then(JsonValue::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, prop)| {
                        prop.get("format").and_then(JsonValue::as_str) == Some("date-time")
                    })
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl RecordMessage {
    /// Convert into a record, turning `datetime_fields` into timestamps.
    /// Values that fail to parse stay strings.
    pub fn into_record(self, datetime_fields: &HashSet<String>) -> Record {
        let mut record = record_from_json(self.record);
        for field in datetime_fields {
            let Some(value) = record.get_mut(field) else {
                continue;
            };
            if let Value::String(raw) = value {
                match Value::parse_timestamp(raw) {
                    Some(ts) => *value = ts,
                    None => warn!(
                        stream = %self.stream,
                        field = %field,
                        "could not parse date-time value, sending as-is"
                    ),
                }
            }
        }
        record
    }
}
