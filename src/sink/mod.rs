// src/sink/mod.rs
//! The delivery sink: build, send, validate, retry.

mod error;
pub mod retry;
pub mod transport;
pub mod validate;

pub use error::DeliveryError;
pub use retry::{with_retry, BackoffStrategy, IsRetryable, RetryConfig};
pub use transport::{HttpTransport, ResponseInfo, Transport, TransportSettings};
pub use validate::ResponseValidator;

use std::sync::Arc;
use tracing::{debug, error};

use crate::config::SinkConfig;
use crate::delivery::{delivery_for, BatchContext, Delivery, RequestBuilder};
use crate::record::Record;

/// Per-flush entry point: one instance per stream, each with its own
/// transport (and therefore its own connection pool).
pub struct HttpSink {
    builder: RequestBuilder,
    transport: Arc<dyn Transport>,
    validator: ResponseValidator,
    retry: RetryConfig,
}

impl HttpSink {
    /// Build a sink from configuration, with the delivery variant selected by
    /// `api_batching` and a fresh reqwest transport.
    pub fn from_config(config: &SinkConfig) -> Result<Self, DeliveryError> {
        let transport = Arc::new(HttpTransport::new(TransportSettings::from_config(config)));
        Self::with_transport(config, transport)
    }

    /// Same as [`HttpSink::from_config`] but sending through `transport`.
    pub fn with_transport(
        config: &SinkConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, DeliveryError> {
        let builder = RequestBuilder::new(
            &config.api_url,
            &config.api_token,
            delivery_for(config.api_batching),
        )?;
        let retry = RetryConfig {
            max_attempts: config.max_attempts,
            ..RetryConfig::default()
        };

        Ok(Self {
            builder,
            transport,
            validator: ResponseValidator::new(config.extra_retry_statuses.clone()),
            retry,
        })
    }

    /// Replace the retry policy (tests use a zero-delay backoff).
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn delivery(&self) -> &dyn Delivery {
        self.builder.delivery()
    }

    /// Deliver a batch of records in one request.
    #[tracing::instrument(
        name = "process_batch",
        skip(self, context),
        fields(
            stream = %context.stream,
            record_count = context.records.len(),
            delivery = self.delivery().name(),
        )
    )]
    pub async fn process_batch(&self, context: &BatchContext) -> Result<(), DeliveryError> {
        let request = self.builder.build(context).inspect_err(|e| {
            error!(error = %e, "failed to build request");
        })?;

        let result = with_retry(&self.retry, || async {
            let response = self.transport.send(&request).await?;
            if let Err(e) = self.validator.validate(&response) {
                if !response.body.is_empty() {
                    debug!(status = response.status.as_u16(), response_body = %response.body, "error response body");
                }
                return Err(e);
            }
            Ok::<(), DeliveryError>(())
        })
        .await;

        match &result {
            Ok(()) => debug!("response received successfully"),
            Err(e) => error!(error = %e, "delivery failed"),
        }
        result
    }

    /// Deliver a single record.
    pub async fn process_record(&self, stream: &str, record: Record) -> Result<(), DeliveryError> {
        self.process_batch(&BatchContext::single(stream, record)).await
    }
}
