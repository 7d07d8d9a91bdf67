//! Broker client construction.
//!
//! Everything librdkafka-specific lives here: client configuration with
//! the security and statistics knobs, the producing client behind
//! [`RecordSink`], and the subscribed consumer. The producer's context
//! forwards every confirmation and statistics document into the event
//! drain's channel; the consumer's context hands statistics straight to
//! the handler since its lifetime is not tied to the drain.

use crate::config::{Config, SecurityConfig};
use crate::producer::drain::{ClientEvent, DeliveryOutcome};
use crate::producer::{RecordSink, SubmitError};
use crate::report::librd::LibrdStatsHandler;
use crate::trace::Destination;
use anyhow::{Context as _, Result};
use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Client contexts
// ---------------------------------------------------------------------------

/// Context for the producing client; the sole writer into the drain channel.
pub struct ProbeContext {
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl ProbeContext {
    pub fn new(events: mpsc::UnboundedSender<ClientEvent>) -> Self {
        Self { events }
    }

    fn forward(&self, event: ClientEvent) {
        // A closed channel means the drain is gone and the run is over.
        let _ = self.events.send(event);
    }
}

impl ClientContext for ProbeContext {
    fn stats_raw(&self, statistics: &[u8]) {
        self.forward(ClientEvent::Stats(statistics.to_vec()));
    }

    fn error(&self, error: KafkaError, reason: &str) {
        self.forward(ClientEvent::ClientError(format!("{error}: {reason}")));
    }
}

impl ProducerContext for ProbeContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _delivery_opaque: ()) {
        let outcome = match delivery_result {
            Ok(message) => outcome_from(message, None),
            Err((err, message)) => outcome_from(message, Some(err.to_string())),
        };
        self.forward(ClientEvent::Delivery(outcome));
    }
}

fn outcome_from(message: &BorrowedMessage<'_>, error: Option<String>) -> DeliveryOutcome {
    DeliveryOutcome {
        payload: message.payload().map(<[u8]>::to_vec),
        destination: Destination {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        },
        error,
    }
}

/// Context for the consuming client. Statistics go straight to the handler;
/// the consumer outlives the producer-side drain during catch-up.
pub struct SubscriberContext {
    stats: Option<Arc<LibrdStatsHandler>>,
}

impl SubscriberContext {
    pub fn new(stats: Option<Arc<LibrdStatsHandler>>) -> Self {
        Self { stats }
    }
}

impl ClientContext for SubscriberContext {
    fn stats_raw(&self, statistics: &[u8]) {
        if let Some(handler) = &self.stats {
            handler.handle(statistics);
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        warn!(%error, reason, "consuming client reported an error");
    }
}

impl ConsumerContext for SubscriberContext {}

// ---------------------------------------------------------------------------
// Producing sink
// ---------------------------------------------------------------------------

/// [`RecordSink`] over a threaded producer. Dropping the sink releases the
/// client, which closes the drain channel once delivery callbacks stop.
pub struct KafkaSink {
    producer: ThreadedProducer<ProbeContext>,
    topic: String,
}

impl RecordSink for KafkaSink {
    fn submit(&self, frame: &[u8]) -> Result<(), SubmitError> {
        let record: BaseRecord<'_, (), [u8]> = BaseRecord::to(&self.topic).payload(frame);
        self.producer
            .send(record)
            .map_err(|(err, _)| SubmitError::Rejected(err.to_string()))
    }

    fn flush(&self, timeout: Duration) -> Result<(), SubmitError> {
        self.producer.flush(timeout).map_err(|err| match err {
            KafkaError::Flush(RDKafkaErrorCode::OperationTimedOut) => SubmitError::FlushTimedOut,
            other => SubmitError::Rejected(other.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

pub fn build_producer_sink(
    cfg: &Config,
    events: mpsc::UnboundedSender<ClientEvent>,
) -> Result<KafkaSink> {
    let mut client = base_client_config(cfg);
    client.set(
        "request.required.acks",
        cfg.producer.request_required_acks.to_string(),
    );
    let producer: ThreadedProducer<ProbeContext> = client
        .create_with_context(ProbeContext::new(events))
        .context("creating producer client")?;
    Ok(KafkaSink {
        producer,
        topic: cfg.producer.topic.clone(),
    })
}

pub fn build_consumer(
    cfg: &Config,
    stats: Option<Arc<LibrdStatsHandler>>,
) -> Result<StreamConsumer<SubscriberContext>> {
    let mut client = base_client_config(cfg);
    client.set("group.id", effective_group_id(&cfg.consumer.group_id));
    client.set("auto.offset.reset", &cfg.consumer.offset_reset);
    let consumer: StreamConsumer<SubscriberContext> = client
        .create_with_context(SubscriberContext::new(stats))
        .context("creating consumer client")?;
    consumer
        .subscribe(&[cfg.producer.topic.as_str()])
        .with_context(|| format!("subscribing to {}", cfg.producer.topic))?;
    Ok(consumer)
}

fn base_client_config(cfg: &Config) -> ClientConfig {
    let mut client = ClientConfig::new();
    client.set("bootstrap.servers", &cfg.producer.brokers);
    if cfg.librd_stats.enabled {
        client.set(
            "statistics.interval.ms",
            cfg.librd_stats.interval_ms.to_string(),
        );
    }
    apply_security(&mut client, &cfg.security);
    client
}

fn apply_security(client: &mut ClientConfig, security: &SecurityConfig) {
    if security.protocol.is_empty() {
        return;
    }
    client.set("security.protocol", &security.protocol);
    for (key, value) in [
        ("ssl.ca.location", &security.ca_location),
        ("ssl.certificate.location", &security.certificate_location),
        ("ssl.key.location", &security.key_location),
        ("ssl.key.password", &security.key_password),
    ] {
        if !value.is_empty() {
            client.set(key, value);
        }
    }
}

/// An empty group id gets a generated one so parallel probe runs never
/// join each other's group and steal partitions.
fn effective_group_id(configured: &str) -> String {
    if configured.is_empty() {
        format!("kafprobe-{}", Uuid::new_v4())
    } else {
        configured.to_string()
    }
}
