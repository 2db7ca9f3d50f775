// src/delivery/mod.rs
//! Batch vs single-record delivery.
//!
//! A [`Delivery`] decides where a context goes and what its body looks like.
//! The variant is picked once from configuration (`api_batching`).

pub mod request;

use bytes::Bytes;
use std::sync::Arc;

use crate::record::{encode_json, EncodeError, Record};

pub use request::{PreparedRequest, RequestBuilder};

/// Records flushed together for one stream.
#[derive(Clone, Debug)]
pub struct BatchContext {
    pub stream: String,
    pub records: Vec<Record>,
}

impl BatchContext {
    pub fn new(stream: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            stream: stream.into(),
            records,
        }
    }

    /// Context carrying exactly one record.
    pub fn single(stream: impl Into<String>, record: Record) -> Self {
        Self::new(stream, vec![record])
    }
}

/// Capability interface for a delivery variant.
pub trait Delivery: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Full endpoint URL for a stream, before query parameters.
    fn endpoint(&self, base_url: &str, stream: &str) -> String;

    /// Serialized request body for the context.
    fn body(&self, context: &BatchContext) -> Result<Bytes, EncodeError>;

    /// Headers merged under the base headers. None by default.
    fn extra_headers(&self, _stream: &str) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Query parameters. None by default.
    fn url_params(&self, _stream: &str) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// `PUT {base}/datasets/{stream}/records` with a JSON array body
#[derive(Clone, Copy, Debug, Default)]
pub struct BatchDelivery;

/// `PUT {base}/datasets/{stream}/record` with a JSON object body
#[derive(Clone, Copy, Debug, Default)]
pub struct RecordDelivery;

impl Delivery for BatchDelivery {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn endpoint(&self, base_url: &str, stream: &str) -> String {
        format!("{}/datasets/{}/records", base_url, stream)
    }

    fn body(&self, context: &BatchContext) -> Result<Bytes, EncodeError> {
        encode_json(&context.records)
    }
}

impl Delivery for RecordDelivery {
    fn name(&self) -> &'static str {
        "record"
    }

    fn endpoint(&self, base_url: &str, stream: &str) -> String {
        format!("{}/datasets/{}/record", base_url, stream)
    }

    fn body(&self, context: &BatchContext) -> Result<Bytes, EncodeError> {
        match context.records.as_slice() {
            [record] => encode_json(record),
            other => Err(EncodeError::RecordCount(other.len())),
        }
    }
}

/// Pick the delivery variant for the `api_batching` setting.
pub fn delivery_for(batching: bool) -> Arc<dyn Delivery> {
    if batching {
        Arc::new(BatchDelivery)
    } else {
        Arc::new(RecordDelivery)
    }
}
