use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::ClientConfig;
use rdkafka::config::RDKafkaLogLevel;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use tracing::{debug, error};

use crate::{Error, Result};

/// How long librdkafka keeps retrying a message before reporting it as failed.
const MESSAGE_TIMEOUT_MS: &str = "5000";

/// How long [KafkaProducer::send] waits for room in the local queue.
const ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct KafkaProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// Any supported kafka client configuration options from
    /// https://docs.confluent.io/platform/current/clients/librdkafka/html/md_CONFIGURATION.html
    pub kafka_raw_config: HashMap<String, String>,
}

/// Outcome of a single send, as reported by the broker.
#[derive(Debug)]
pub enum DeliveryStatus {
    Delivered {
        topic: String,
        partition: i32,
        offset: i64,
    },
    Failed(Error),
}

pub struct KafkaProducer {
    topic: String,
    producer: Arc<FutureProducer>,
}

pub fn new_producer(config: KafkaProducerConfig) -> Result<KafkaProducer> {
    let mut client_config = ClientConfig::new();
    crate::apply_raw_config(&mut client_config, &config.kafka_raw_config);
    client_config
        .set("bootstrap.servers", config.brokers.join(","))
        .set("message.timeout.ms", MESSAGE_TIMEOUT_MS)
        .set("client.id", "pavel")
        .set_log_level(RDKafkaLogLevel::Warning);

    let producer: FutureProducer = client_config.create().map_err(|e| Error::Connection {
        server: config.brokers.join(","),
        error: e.to_string(),
    })?;

    Ok(KafkaProducer {
        topic: config.topic,
        producer: Arc::new(producer),
    })
}

impl KafkaProducer {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sends one message without key or partition and waits for its delivery report. Each send
    /// owns its delivery future, so reports of other in-flight sends can never be mistaken for
    /// this one.
    pub async fn send(&self, payload: &[u8]) -> DeliveryStatus {
        let record: FutureRecord<'_, (), [u8]> = FutureRecord::to(&self.topic).payload(payload);
        match self.producer.send(record, ENQUEUE_TIMEOUT).await {
            Ok((partition, offset)) => {
                debug!(topic = self.topic, partition, offset, "Delivered message");
                DeliveryStatus::Delivered {
                    topic: self.topic.clone(),
                    partition,
                    offset,
                }
            }
            Err((e, _)) => {
                error!(?e, topic = self.topic, "Sending payload to Kafka topic");
                DeliveryStatus::Failed(Error::Kafka(e.to_string()))
            }
        }
    }

    /// Waits until every queued message got its delivery report. `flush` blocks inside
    /// librdkafka, so it runs on the blocking pool.
    pub async fn close(self, timeout: Duration) -> Result<()> {
        let producer = Arc::clone(&self.producer);
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| Error::Other(format!("Waiting for producer flush to complete: {e:?}")))?
            .map_err(|e| Error::Kafka(format!("Failed to flush producer: {e}")))
    }
}

/// Expose methods so that pavel-core doesn't have to depend on rdkafka.
#[cfg(feature = "kafka-tests-utils")]
pub mod test_utils {
    use rdkafka::ClientConfig;
    use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
    use rdkafka::producer::{FutureProducer, FutureRecord};
    use std::time::Duration;
    use uuid::Uuid;

    pub const BROKER: &str = "localhost:9092";

    pub async fn setup_test_topic(partitions: i32) -> String {
        let topic_name = format!(
            "pavel_test_topic_{}",
            Uuid::new_v4().to_string().replace("-", "")
        );

        let admin_client = ClientConfig::new()
            .set("bootstrap.servers", BROKER)
            .create::<AdminClient<_>>()
            .expect("Failed to create admin client");

        let topic_config = NewTopic::new(
            topic_name.as_str(),
            partitions,
            TopicReplication::Fixed(1),
        );
        let _ = admin_client
            .create_topics(&[topic_config], &AdminOptions::new())
            .await
            .expect("Failed to create topic");

        topic_name
    }

    pub async fn produce_test_messages(topic: &str, payloads: &[&str]) {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", BROKER)
            .create()
            .expect("Failed to create producer");
        for payload in payloads {
            let record: FutureRecord<'_, (), str> = FutureRecord::to(topic).payload(*payload);
            producer
                .send(record, Duration::from_secs(5))
                .await
                .expect("Failed to send message");
        }
    }
}
