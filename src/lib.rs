// src/lib.rs
//! Pipeline target that delivers records to the Matterbeam HTTP API.
//!
//! Records are read as newline-delimited messages, grouped per stream, and
//! sent with an authenticated `PUT` to `{api_url}/datasets/{stream}/records`
//! (or `/record` when batching is off). Transient failures are retried with
//! exponential backoff; client errors fail the run.

pub mod config;
pub mod delivery;
pub mod logging;
pub mod message;
pub mod record;
pub mod sink;
pub mod target;

pub use config::{ConfigError, SinkConfig};
pub use delivery::{BatchContext, BatchDelivery, Delivery, PreparedRequest, RecordDelivery};
pub use record::{Record, Value};
pub use sink::{DeliveryError, HttpSink, RetryConfig, Transport};
pub use target::{RunSummary, Target, TargetError};

// Re-export tracing for use in other modules
pub use tracing;
