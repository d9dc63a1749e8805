//! Schema-checked, asynchronous publication of mapped videos to Kafka.
//!
//! [`EventPublisher::publish`] encodes synchronously and hands the payload to
//! a [`Transport`], which answers with a [`DeliveryHandle`]. A watcher task per
//! handle logs the outcome as soon as the broker reports it. Nothing waits for
//! those watchers until [`EventPublisher::drain`].
use anyhow::Context;
use apache_avro::schema::SchemaKind;
use apache_avro::types::Value as AvroValue;
use apache_avro::Schema;
use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt};
use rdkafka::config::ClientConfig;
use rdkafka::error::KafkaResult;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config;
use crate::model::MappedEvent;
use crate::registry::RegisteredSchema;

/// Confluent wire format: magic byte, 4-byte big-endian schema id, Avro body.
const CONFLUENT_MAGIC: u8 = 0x00;
const CONFLUENT_HEADER_SIZE: usize = 5;

#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("registered schema is a {0:?}, expected a record")]
    NotARecord(SchemaKind),
    #[error("schema field `{0}` has no event counterpart and is not nullable")]
    UnmappedField(String),
    #[error("value of `{field}` does not fit schema type {expected:?}")]
    TypeMismatch { field: String, expected: SchemaKind },
    #[error("Avro encoding failed: {0}")]
    Avro(#[from] apache_avro::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Pending,
    Acknowledged { partition: i32, offset: i64 },
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, DeliveryOutcome::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub event: MappedEvent,
    pub outcome: DeliveryOutcome,
}

/// Resolves once the broker has acknowledged or rejected one message.
pub type DeliveryHandle = BoxFuture<'static, DeliveryOutcome>;

/// The broker side of the publisher.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Enqueue one message without waiting for the broker.
    fn submit(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryHandle;

    /// Push everything still queued locally to the broker, waiting at most `timeout`.
    async fn flush(&self, timeout: Duration) -> anyhow::Result<()>;
}

pub struct KafkaTransport {
    producer: FutureProducer,
}

impl KafkaTransport {
    pub fn from_config(cfg: &config::Kafka) -> KafkaResult<Self> {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &cfg.bootstrap_servers)
            .set("message.timeout.ms", cfg.message_timeout_ms.to_string());
        for (key, value) in &cfg.properties {
            client.set(key, value);
        }
        Ok(Self {
            producer: client.create()?,
        })
    }
}

#[async_trait]
impl Transport for KafkaTransport {
    fn submit(&self, topic: &str, key: &str, payload: Vec<u8>) -> DeliveryHandle {
        let record = FutureRecord::to(topic).key(key).payload(&payload);
        let sent = self.producer.send_result(record);
        match sent {
            Ok(delivery) => async move {
                match delivery.await {
                    Ok(Ok((partition, offset))) => DeliveryOutcome::Acknowledged { partition, offset },
                    Ok(Err((err, _message))) => DeliveryOutcome::Failed(err.to_string()),
                    Err(_canceled) => {
                        DeliveryOutcome::Failed("producer dropped before delivery report".into())
                    }
                }
            }
            .boxed(),
            // Local queue full or message too large: never reaches the broker.
            Err((err, _record)) => {
                future::ready(DeliveryOutcome::Failed(format!("enqueue failed: {err}"))).boxed()
            }
        }
    }

    async fn flush(&self, timeout: Duration) -> anyhow::Result<()> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .context("flush task panicked")?
            .context("producer flush did not complete")
    }
}

/// What `drain` observed. Resolved records keep submission order.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub records: Vec<DeliveryRecord>,
    /// Keys whose delivery was still pending when the drain budget ran out.
    pub unresolved: Vec<String>,
}

impl DrainReport {
    pub fn acknowledged(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, DeliveryOutcome::Acknowledged { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, DeliveryOutcome::Failed(_)))
            .count()
    }

    /// Every submitted message was acknowledged.
    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty() && self.failed() == 0
    }
}

pub struct EventPublisher {
    transport: Arc<dyn Transport>,
    topic: String,
    schema: RegisteredSchema,
    drain_timeout: Duration,
    pending: Vec<(String, JoinHandle<DeliveryRecord>)>,
}

impl EventPublisher {
    pub fn new(
        transport: Arc<dyn Transport>,
        topic: impl Into<String>,
        schema: RegisteredSchema,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            topic: topic.into(),
            schema,
            drain_timeout,
            pending: Vec::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Deliveries submitted and not yet collected by `drain`.
    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    /// Encode `event` and submit it keyed by its id. Does not wait for the broker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish(&mut self, event: MappedEvent) -> Result<(), SerializationError> {
        let payload = encode_event(&self.schema, &event)?;
        let key = event.id.clone();
        let handle = self.transport.submit(&self.topic, &key, payload);
        let topic = self.topic.clone();
        let watcher = tokio::spawn(async move {
            let outcome = handle.await;
            match &outcome {
                DeliveryOutcome::Acknowledged { partition, offset } => {
                    debug!(%topic, key = %event.id, partition, offset, "delivered");
                }
                DeliveryOutcome::Failed(reason) => {
                    warn!(%topic, key = %event.id, %reason, "delivery failed");
                }
                DeliveryOutcome::Pending => {}
            }
            DeliveryRecord { event, outcome }
        });
        self.pending.push((key, watcher));
        Ok(())
    }

    /// Wait until every submitted delivery has resolved or the drain budget is spent.
    ///
    /// Consumes the publisher, so it can run only once.
    pub async fn drain(mut self) -> DrainReport {
        let deadline = tokio::time::Instant::now() + self.drain_timeout;
        info!(outstanding = self.pending.len(), topic = %self.topic, "draining deliveries");

        if let Err(err) = self.transport.flush(self.drain_timeout).await {
            warn!(?err, "flush before drain failed");
        }

        let mut report = DrainReport::default();
        for (key, mut watcher) in self.pending.drain(..) {
            match tokio::time::timeout_at(deadline, &mut watcher).await {
                Ok(Ok(record)) => report.records.push(record),
                Ok(Err(err)) => {
                    warn!(%key, ?err, "delivery watcher ended abnormally");
                    report.unresolved.push(key);
                }
                Err(_) => {
                    watcher.abort();
                    report.unresolved.push(key);
                }
            }
        }

        info!(
            acknowledged = report.acknowledged(),
            failed = report.failed(),
            unresolved = report.unresolved.len(),
            "drain finished"
        );
        report
    }
}

/// Encode `event` against the record schema in Confluent wire format.
///
/// Schema fields are matched case-insensitively by name: `TITLE`, `VIEWS`,
/// `LIKES`, `COMMENTS` (and `ID`/`VIDEO_ID` when present). Any other field must
/// be nullable and is written as null.
pub fn encode_event(schema: &RegisteredSchema, event: &MappedEvent) -> Result<Vec<u8>, SerializationError> {
    let Schema::Record(record) = &schema.schema else {
        return Err(SerializationError::NotARecord(SchemaKind::from(&schema.schema)));
    };

    let mut fields = Vec::with_capacity(record.fields.len());
    for field in &record.fields {
        let source = match field.name.to_ascii_uppercase().as_str() {
            "TITLE" => Some(Field::Text(&event.title)),
            "ID" | "VIDEO_ID" => Some(Field::Text(&event.id)),
            "VIEWS" => Some(Field::Count(event.views)),
            "LIKES" => Some(Field::Count(event.likes)),
            "COMMENTS" => Some(Field::Count(event.comments)),
            _ => None,
        };
        let value = shape(&field.name, source, &field.schema)?;
        fields.push((field.name.clone(), value));
    }

    let datum = apache_avro::to_avro_datum(&schema.schema, AvroValue::Record(fields))?;
    let mut out = Vec::with_capacity(CONFLUENT_HEADER_SIZE + datum.len());
    out.push(CONFLUENT_MAGIC);
    out.extend_from_slice(&schema.id.to_be_bytes());
    out.extend_from_slice(&datum);
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
enum Field<'a> {
    Text(&'a str),
    Count(u64),
}

fn shape(name: &str, source: Option<Field<'_>>, schema: &Schema) -> Result<AvroValue, SerializationError> {
    let mismatch = || SerializationError::TypeMismatch {
        field: name.to_string(),
        expected: SchemaKind::from(schema),
    };

    match (source, schema) {
        (_, Schema::Union(variants)) => {
            for (idx, variant) in variants.variants().iter().enumerate() {
                let is_null = matches!(variant, Schema::Null);
                if source.is_some() == is_null {
                    continue;
                }
                if let Ok(value) = shape(name, source, variant) {
                    return Ok(AvroValue::Union(idx as u32, Box::new(value)));
                }
            }
            match source {
                Some(_) => Err(mismatch()),
                None => Err(SerializationError::UnmappedField(name.to_string())),
            }
        }
        (None, Schema::Null) => Ok(AvroValue::Null),
        (None, _) => Err(SerializationError::UnmappedField(name.to_string())),
        (Some(Field::Text(s)), Schema::String) => Ok(AvroValue::String(s.to_string())),
        (Some(Field::Count(n)), Schema::Long) => i64::try_from(n).map(AvroValue::Long).map_err(|_| mismatch()),
        (Some(Field::Count(n)), Schema::Int) => i32::try_from(n).map(AvroValue::Int).map_err(|_| mismatch()),
        (Some(_), _) => Err(mismatch()),
    }
}
