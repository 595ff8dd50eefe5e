use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    error::{KafkaError, RDKafkaErrorCode},
    message::{Header, OwnedHeaders},
    producer::{FutureProducer, FutureRecord, Producer},
    util::Timeout,
};
use std::sync::Arc;
use std::time::Duration;

use super::sink::{EventSink, OutboundEvent, PublishError};
use crate::event_sourcing::DomainEvent;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes outbox events to a Redpanda (Kafka API) topic.
///
/// Records are keyed by entity id so a consumer sees each entity's events
/// in order within a partition.
pub struct RedpandaSink {
    producer: FutureProducer,
    topic: String,
    circuit_breaker: CircuitBreaker,
}

impl RedpandaSink {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, PublishError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .set("enable.idempotence", "true")
            .create()
            .map_err(|e| PublishError::Unavailable(format!("Failed to create Redpanda producer: {e}")))?;

        let cb_config = CircuitBreakerConfig {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 3,
        };

        Ok(Self {
            producer,
            topic: topic.to_string(),
            circuit_breaker: CircuitBreaker::new(cb_config),
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.circuit_breaker = self.circuit_breaker.with_metrics(metrics);
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub async fn get_circuit_breaker_state(&self) -> CircuitState {
        self.circuit_breaker.get_state().await
    }

    async fn send_one<E: DomainEvent>(&self, event: &OutboundEvent<E>) -> Result<(), PublishError> {
        let payload = envelope(event)?;
        let key = event.entity_id.to_string();
        let event_id = event.event_id.to_string();

        let result = self
            .circuit_breaker
            .call(async {
                let headers = OwnedHeaders::new()
                    .insert(Header {
                        key: "event_type",
                        value: Some(event.event_type.as_str()),
                    })
                    .insert(Header {
                        key: "event_id",
                        value: Some(event_id.as_str()),
                    });

                let record = FutureRecord::to(&self.topic)
                    .key(&key)
                    .payload(&payload)
                    .headers(headers);

                self.producer
                    .send(record, Timeout::After(SEND_TIMEOUT))
                    .await
                    .map(|_| ())
                    .map_err(|(e, _)| e)
            })
            .await;

        match result {
            Ok(()) => {
                tracing::debug!(
                    topic = %self.topic,
                    event_id = %event.event_id,
                    event_type = %event.event_type,
                    "Published to Redpanda"
                );
                Ok(())
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::error!(topic = %self.topic, "Circuit breaker open - Redpanda unavailable");
                Err(PublishError::Unavailable("circuit breaker open".into()))
            }
            Err(CircuitBreakerError::OperationFailed(e)) => Err(send_failure(event.event_id, e)),
        }
    }
}

/// A delivery report that never arrived is a timeout; anything else the
/// broker refused is a rejection.
fn send_failure(event_id: uuid::Uuid, error: KafkaError) -> PublishError {
    match error {
        KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut) => {
            PublishError::Timeout(SEND_TIMEOUT)
        }
        other => PublishError::Rejected {
            event_id,
            reason: other.to_string(),
        },
    }
}

/// JSON body of one record: metadata plus the variant payload under `data`.
pub fn envelope<E: DomainEvent>(event: &OutboundEvent<E>) -> Result<String, PublishError> {
    let body = serde_json::json!({
        "event_id": event.event_id,
        "entity_id": event.entity_id,
        "entity_type": event.entity_type,
        "event_type": event.event_type,
        "occurred_at": event.occurred_at,
        "data": event.event.encode()?,
    });
    Ok(body.to_string())
}

#[async_trait]
impl<E: DomainEvent> EventSink<E> for RedpandaSink {
    async fn publish(&self, events: &[OutboundEvent<E>]) -> Result<(), PublishError> {
        for event in events {
            self.send_one(event).await?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(Timeout::After(FLUSH_TIMEOUT)))
            .await
            .map_err(|e| PublishError::Unavailable(format!("Flush task failed: {e}")))?
            .map_err(|e| PublishError::Unavailable(format!("Flush failed: {e}")))?;
        tracing::info!(topic = %self.topic, "Redpanda producer flushed");
        Ok(())
    }
}
