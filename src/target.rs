// src/target.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::config::SinkConfig;
use crate::delivery::BatchContext;
use crate::message::{Message, MessageError};
use crate::record::Record;
use crate::sink::{DeliveryError, HttpSink, HttpTransport, Transport, TransportSettings};

/// Builds the transport for each new stream sink
pub type TransportFactory = Box<dyn Fn() -> Arc<dyn Transport> + Send + Sync>;

#[derive(Debug)]
pub enum TargetError {
    Io(std::io::Error),
    Message { line: usize, source: MessageError },
    Delivery { stream: String, source: DeliveryError },
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetError::Io(e) => write!(f, "failed to read input: {}", e),
            TargetError::Message { line, source } => write!(f, "line {}: {}", line, source),
            TargetError::Delivery { stream, source } => {
                write!(f, "stream '{}': {}", stream, source)
            }
        }
    }
}

impl std::error::Error for TargetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TargetError::Io(e) => Some(e),
            TargetError::Message { source, .. } => Some(source),
            TargetError::Delivery { source, .. } => Some(source),
        }
    }
}

/// Per-stream delivery counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub records: usize,
    pub requests: usize,
}

/// Result of a completed run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub streams: BTreeMap<String, StreamSummary>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.streams.values().map(|s| s.records).sum()
    }
}

struct StreamState {
    sink: HttpSink,
    datetime_fields: HashSet<String>,
    buffer: Vec<Record>,
    summary: StreamSummary,
}

/// Drives message intake and per-stream delivery.
pub struct Target {
    config: SinkConfig,
    make_transport: TransportFactory,
    streams: HashMap<String, StreamState>,
}

impl Target {
    /// Each stream gets its own reqwest transport.
    pub fn new(config: SinkConfig) -> Self {
        let settings = TransportSettings::from_config(&config);
        Self::with_transport_factory(
            config,
            Box::new(move || Arc::new(HttpTransport::new(settings.clone())) as Arc<dyn Transport>),
        )
    }

    pub fn with_transport_factory(config: SinkConfig, make_transport: TransportFactory) -> Self {
        Self {
            config,
            make_transport,
            streams: HashMap::new(),
        }
    }

    /// Consume every line of `reader`, flushing as batches fill and once more at
    /// end of input. Stops at the first error.
    pub async fn run<R>(mut self, reader: R) -> Result<RunSummary, TargetError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut line_no = 0;

        while let Some(line) = lines.next_line().await.map_err(TargetError::Io)? {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let message = Message::parse(&line).map_err(|source| TargetError::Message {
                line: line_no,
                source,
            })?;
            self.handle(message, line_no).await?;
        }

        self.flush_all().await?;

        let summary = RunSummary {
            streams: self
                .streams
                .into_iter()
                .map(|(name, state)| (name, state.summary))
                .collect(),
        };
        info!(
            streams = summary.streams.len(),
            records = summary.total_records(),
            "all records delivered"
        );
        Ok(summary)
    }

    async fn handle(&mut self, message: Message, line_no: usize) -> Result<(), TargetError> {
        match message {
            Message::Schema(schema) => {
                let datetime_fields = schema.datetime_fields();
                if let Some(state) = self.streams.get_mut(&schema.stream) {
                    // Schema change: deliver what was buffered under the old one
                    flush(&schema.stream, state).await?;
                    state.datetime_fields = datetime_fields;
                    return Ok(());
                }

                let sink = HttpSink::with_transport(&self.config, (self.make_transport)())
                    .map_err(|source| TargetError::Delivery {
                        stream: schema.stream.clone(),
                        source,
                    })?;
                debug!(
                    stream = %schema.stream,
                    delivery = sink.delivery().name(),
                    key_properties = ?schema.key_properties,
                    "sink created"
                );
                self.streams.insert(
                    schema.stream,
                    StreamState {
                        sink,
                        datetime_fields,
                        buffer: Vec::new(),
                        summary: StreamSummary::default(),
                    },
                );
                Ok(())
            }
            Message::Record(msg) => {
                let Some(state) = self.streams.get_mut(&msg.stream) else {
                    return Err(TargetError::Message {
                        line: line_no,
                        source: MessageError::UnknownStream(msg.stream),
                    });
                };
                let stream = msg.stream.clone();
                let record = msg.into_record(&state.datetime_fields);

                if self.config.api_batching {
                    state.buffer.push(record);
                    if state.buffer.len() >= self.config.batch_size_rows {
                        flush(&stream, state).await?;
                    }
                } else {
                    state
                        .sink
                        .process_record(&stream, record)
                        .await
                        .map_err(|source| TargetError::Delivery {
                            stream: stream.clone(),
                            source,
                        })?;
                    state.summary.records += 1;
                    state.summary.requests += 1;
                }
                Ok(())
            }
            Message::State(_) => {
                debug!("ignoring STATE message");
                Ok(())
            }
        }
    }

    async fn flush_all(&mut self) -> Result<(), TargetError> {
        let mut names: Vec<String> = self.streams.keys().cloned().collect();
        names.sort();
        for name in names {
            if let Some(state) = self.streams.get_mut(&name) {
                flush(&name, state).await?;
            }
        }
        Ok(())
    }
}

async fn flush(stream: &str, state: &mut StreamState) -> Result<(), TargetError> {
    if state.buffer.is_empty() {
        return Ok(());
    }
    let context = BatchContext::new(stream, std::mem::take(&mut state.buffer));
    state
        .sink
        .process_batch(&context)
        .await
        .map_err(|source| {
            warn!(stream, records = context.records.len(), "batch was not delivered");
            TargetError::Delivery {
                stream: stream.to_string(),
                source,
            }
        })?;
    state.summary.records += context.records.len();
    state.summary.requests += 1;
    Ok(())
}
