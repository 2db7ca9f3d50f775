// src/record.rs
//! Record values and their JSON encoding.
//!
//! Records arrive from the upstream extractor as JSON, but some fields carry
//! richer types: numbers outside the 64-bit integer range keep their source
//! text untouched, and schema-declared `date-time` fields become timestamps.
//! On the way out fractional numbers, decimals and timestamps are written as
//! strings; oversized integers stay bare JSON numbers.

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::ser::{Error as _, SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Number, Value as JsonValue};

/// Ordered field name -> value mapping.
pub type Record = IndexMap<String, Value>;

/// A single field value inside a record.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    UInteger(u64),
    Float(f64),
    Decimal(Decimal),
    /// A JSON number exactly as it was written upstream
    Number(Number),
    String(String),
    Timestamp(DateTime<FixedOffset>),
    Array(Vec<Value>),
    Object(Record),
}

/// Errors raised while turning records into a request body
#[derive(Debug)]
pub enum EncodeError {
    /// The value has no JSON representation (e.g. NaN)
    Unrepresentable(String),
    /// Single-record delivery was handed the wrong number of records
    RecordCount(usize),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncodeError::Unrepresentable(msg) => write!(f, "value is not JSON serializable: {}", msg),
            EncodeError::RecordCount(n) => {
                write!(f, "single-record delivery expects 1 record, got {}", n)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

impl Value {
    /// Convert a decoded JSON value, keeping non-`i64`/`u64` numbers as written.
    pub fn from_json(value: JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => number_value(&n),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items.into_iter().map(Value::from_json).collect()),
            JsonValue::Object(map) => Value::Object(record_from_json(map)),
        }
    }

    /// Parse a `date-time` string into a timestamp.
    ///
    /// RFC 3339 is tried first; an offset-less `YYYY-MM-DDTHH:MM:SS[.f]` is
    /// read as UTC. Returns `None` when neither form matches.
    pub fn parse_timestamp(raw: &str) -> Option<Value> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(Value::Timestamp(ts));
        }
        ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| Value::Timestamp(naive.and_utc().fixed_offset()))
    }
}

/// Convert a decoded JSON object into a record, preserving field order.
pub fn record_from_json(map: serde_json::Map<String, JsonValue>) -> Record {
    map.into_iter()
        .map(|(k, v)| (k, Value::from_json(v)))
        .collect()
}

fn number_value(n: &Number) -> Value {
    if let Some(i) = n.as_i64() {
        return Value::Integer(i);
    }
    if let Some(u) = n.as_u64() {
        return Value::UInteger(u);
    }
    // With arbitrary_precision the number holds its source text, so no digits
    // are lost and exponents like 1e400 never go through f64
    Value::Number(n.clone())
}

fn is_integral(text: &str) -> bool {
    !text.contains(['.', 'e', 'E'])
}

/// ISO-8601 form used for timestamps on the wire.
pub fn iso8601(ts: &DateTime<FixedOffset>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::UInteger(u) => serializer.serialize_u64(*u),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => Err(S::Error::custom(format!("non-finite float {}", f))),
            Value::Decimal(d) => serializer.serialize_str(&d.to_string()),
            Value::Number(n) => {
                // Display yields the source text under arbitrary_precision
                let text = n.to_string();
                if is_integral(&text) {
                    n.serialize(serializer)
                } else {
                    serializer.serialize_str(&text)
                }
            }
            Value::String(s) => serializer.serialize_str(s),
            Value::Timestamp(ts) => serializer.serialize_str(&iso8601(ts)),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Object(record) => {
                let mut map = serializer.serialize_map(Some(record.len()))?;
                for (k, v) in record {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

/// Encode any serializable payload (a record or a slice of records) as JSON.
pub fn encode_json<T: Serialize + ?Sized>(payload: &T) -> Result<Bytes, EncodeError> {
    serde_json::to_vec(payload)
        .map(Bytes::from)
        .map_err(|e| EncodeError::Unrepresentable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn parse_record(json: &str) -> Record {
        match serde_json::from_str::<JsonValue>(json).unwrap() {
            JsonValue::Object(map) => record_from_json(map),
            other => panic!("expected object, got {}", other),
        }
    }

    #[test]
    fn decimal_serializes_as_string_with_scale() {
        let mut record = Record::new();
        record.insert("price".into(), Value::Decimal(Decimal::from_str("12.50").unwrap()));

        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"price":"12.50"}"#);
    }

    #[test]
    fn fractional_json_numbers_keep_their_text() {
        let record = parse_record(r#"{"price": 12.50, "qty": 3, "big": 18446744073709551615}"#);

        assert!(matches!(&record["price"], Value::Number(n) if n.to_string() == "12.50"));
        assert_eq!(record["qty"], Value::Integer(3));
        assert_eq!(record["big"], Value::UInteger(u64::MAX));

        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"price":"12.50","qty":3,"big":18446744073709551615}"#);
    }

    #[test]
    fn exponent_numbers_are_written_as_given() {
        let record = parse_record(r#"{"x": 1.5e3, "tiny": 1e-40}"#);

        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"x":"1.5e3","tiny":"1e-40"}"#);
    }

    #[test]
    fn long_fraction_keeps_every_digit() {
        let record = parse_record(r#"{"x": 0.123456789012345678901234567890123}"#);

        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"x":"0.123456789012345678901234567890123"}"#);
    }

    #[test]
    fn integer_beyond_u64_stays_a_bare_number() {
        let record =
            parse_record(r#"{"x": 123456789012345678901234567890, "neg": -98765432109876543210}"#);

        let body = encode_json(&record).unwrap();
        assert_eq!(
            &body[..],
            br#"{"x":123456789012345678901234567890,"neg":-98765432109876543210}"#
        );
    }

    #[test]
    fn exponent_beyond_f64_range_still_encodes() {
        let record = parse_record(r#"{"x": 1e400}"#);

        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"x":"1e400"}"#);
    }

    #[test]
    fn batch_of_records_encodes_as_array() {
        let records = vec![parse_record(r#"{"id": 1}"#), parse_record(r#"{"id": 2.0}"#)];

        let body = encode_json(&records).unwrap();
        assert_eq!(&body[..], br#"[{"id":1},{"id":"2.0"}]"#);
    }

    #[test]
    fn timestamp_serializes_as_iso8601() {
        let ts = Value::parse_timestamp("2024-03-01T12:30:45.123456+02:00").unwrap();
        let mut record = Record::new();
        record.insert("at".into(), ts);

        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"at":"2024-03-01T12:30:45.123456+02:00"}"#);
    }

    #[test]
    fn naive_timestamp_is_read_as_utc() {
        let ts = Value::parse_timestamp("2024-03-01T12:30:45").unwrap();
        match ts {
            Value::Timestamp(t) => assert_eq!(iso8601(&t), "2024-03-01T12:30:45+00:00"),
            other => panic!("expected timestamp, got {:?}", other),
        }
        assert!(Value::parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn non_finite_float_is_an_encoding_error() {
        let mut record = Record::new();
        record.insert("ratio".into(), Value::Float(f64::NAN));

        let err = encode_json(&record).unwrap_err();
        assert!(matches!(err, EncodeError::Unrepresentable(_)));
    }

    #[test]
    fn field_order_is_preserved() {
        let record = parse_record(r#"{"z": 1, "a": 2, "m": {"y": true, "b": null}}"#);
        let body = encode_json(&record).unwrap();
        assert_eq!(&body[..], br#"{"z":1,"a":2,"m":{"y":true,"b":null}}"#);
    }

    #[test]
    fn decode_then_encode_is_stable() {
        let mut record = Record::new();
        record.insert("price".into(), Value::Decimal(Decimal::from_str("12.50").unwrap()));
        record.insert(
            "at".into(),
            Value::parse_timestamp("2024-03-01T12:30:45Z").unwrap(),
        );
        record.insert("tags".into(), Value::Array(vec![Value::String("a".into()), Value::Null]));
        let wide = parse_record(r#"{"n": 123456789012345678901234567890}"#);
        record.insert("wide".into(), wide["n"].clone());

        let first = encode_json(&record).unwrap();
        let reparsed = parse_record(std::str::from_utf8(&first).unwrap());
        let second = encode_json(&reparsed).unwrap();
        assert_eq!(first, second);
    }
}
