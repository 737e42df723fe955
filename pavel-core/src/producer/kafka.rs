use bytes::Bytes;
use pavel_kafka::producer::{DeliveryStatus, KafkaProducer, KafkaProducerConfig, new_producer};

use crate::config::ProducerConfig;
use crate::producer::Publisher;

impl From<&ProducerConfig> for KafkaProducerConfig {
    fn from(config: &ProducerConfig) -> Self {
        KafkaProducerConfig {
            brokers: config.brokers.clone(),
            topic: config.topic.clone(),
            kafka_raw_config: config.settings.kafka_raw_config.clone(),
        }
    }
}

pub(crate) fn new_kafka_producer(config: &ProducerConfig) -> crate::Result<KafkaProducer> {
    Ok(new_producer(config.into())?)
}

impl Publisher for KafkaProducer {
    fn topic(&self) -> &str {
        KafkaProducer::topic(self)
    }

    async fn publish(&mut self, payload: Bytes) -> DeliveryStatus {
        self.send(&payload).await
    }
}
