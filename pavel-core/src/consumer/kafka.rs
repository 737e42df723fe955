use pavel_kafka::TopicPartition;
use pavel_kafka::consumer::{ConsumerEvent, KafkaConsumer, KafkaConsumerConfig};

use crate::config::ConsumerConfig;
use crate::consumer::EventSource;

impl From<&ConsumerConfig> for KafkaConsumerConfig {
    fn from(config: &ConsumerConfig) -> Self {
        KafkaConsumerConfig {
            brokers: config.brokers.clone(),
            topic: config.topic.clone(),
            consumer_group: config.settings.consumer_group.clone(),
            // end-of-partition events only matter when the run stops once drained
            partition_eof: !config.listen,
            kafka_raw_config: config.settings.kafka_raw_config.clone(),
        }
    }
}

pub(crate) fn new_kafka_consumer(config: &ConsumerConfig) -> crate::Result<KafkaConsumer> {
    Ok(KafkaConsumer::connect(config.into())?)
}

impl EventSource for KafkaConsumer {
    async fn next_event(&mut self) -> Option<ConsumerEvent> {
        KafkaConsumer::next_event(self).await
    }

    fn assign(&mut self, partitions: Vec<TopicPartition>) -> crate::Result<()> {
        Ok(KafkaConsumer::assign(self, partitions)?)
    }

    fn unassign(&mut self) -> crate::Result<()> {
        Ok(KafkaConsumer::unassign(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;

    #[test]
    fn test_kafka_consumer_config_from_consumer_config() {
        let settings = Settings {
            consumer_group: "exporter".to_string(),
            ..Default::default()
        };
        let config =
            ConsumerConfig::new("localhost:9092", "lines", None, false, "earliest", settings)
                .unwrap();
        let kafka_config = KafkaConsumerConfig::from(&config);
        assert_eq!(kafka_config.consumer_group, "exporter");
        assert_eq!(kafka_config.topic, "lines");
        assert!(kafka_config.partition_eof);

        let config = ConsumerConfig::new(
            "localhost:9092",
            "lines",
            None,
            true,
            "earliest",
            Settings::default(),
        )
        .unwrap();
        assert!(!KafkaConsumerConfig::from(&config).partition_eof);
    }

    #[cfg(feature = "kafka-tests")]
    #[tokio::test]
    async fn test_consume_topic_into_file() {
        use crate::consumer::{StopReason, consume_until};
        use pavel_kafka::producer::test_utils;
        use tokio_util::sync::CancellationToken;

        let topic = test_utils::setup_test_topic(1).await;
        test_utils::produce_test_messages(&topic, &["x", "y"]).await;

        let out = tempfile::NamedTempFile::new().unwrap();
        let settings = Settings {
            consumer_group: format!("pavel-test-{topic}"),
            ..Default::default()
        };
        let config = ConsumerConfig::new(
            test_utils::BROKER,
            &topic,
            Some(out.path().to_path_buf()),
            false,
            "earliest",
            settings,
        )
        .unwrap();

        let summary = consume_until(config, CancellationToken::new())
            .await
            .expect("Failed to consume");
        assert_eq!(summary.reason, StopReason::Drained);
        assert_eq!(summary.messages, 2);
        assert_eq!(std::fs::read_to_string(out.path()).unwrap(), "x\ny\n");
    }
}
