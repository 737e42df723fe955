use std::collections::HashMap;
use std::path::PathBuf;

use pavel_kafka::StartOffset;
use tracing::warn;

use crate::error::{Error, Result};

const ENV_CONSUMER_GROUP: &str = "PAVEL_CONSUMER_GROUP";
const ENV_KAFKA_CONFIG: &str = "PAVEL_KAFKA_CONFIG";

const DEFAULT_CONSUMER_GROUP: &str = "pavel";
/// Offset token used when `--offset` is not given.
pub const DEFAULT_OFFSET: &str = "earliest";

/// Settings that are read from the environment rather than the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub consumer_group: String,
    /// Raw librdkafka properties, applied to both the producer and the consumer.
    pub kafka_raw_config: HashMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            kafka_raw_config: HashMap::new(),
        }
    }
}

impl Settings {
    pub fn load(
        env_vars: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Result<Self> {
        let env_vars: HashMap<String, String> = env_vars
            .into_iter()
            .map(|(key, val)| (key.into(), val.into()))
            .filter(|(key, _val)| [ENV_CONSUMER_GROUP, ENV_KAFKA_CONFIG].contains(&key.as_str()))
            .collect();

        let mut settings = Settings::default();
        if let Some(group) = env_vars.get(ENV_CONSUMER_GROUP) {
            if group.trim().is_empty() {
                return Err(Error::Config(format!("{ENV_CONSUMER_GROUP} is set but empty")));
            }
            settings.consumer_group = group.trim().to_string();
        }
        if let Some(raw) = env_vars.get(ENV_KAFKA_CONFIG) {
            settings.kafka_raw_config = parse_raw_config(raw)?;
        }
        Ok(settings)
    }
}

/// Parses `key=value` pairs separated by commas, e.g. `linger.ms=5,acks=all`.
fn parse_raw_config(raw: &str) -> Result<HashMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => {
                Ok((key.trim().to_string(), value.trim().to_string()))
            }
            _ => Err(Error::Config(format!(
                "Invalid entry {pair:?} in {ENV_KAFKA_CONFIG}, expected key=value"
            ))),
        })
        .collect()
}

fn parse_brokers(broker: &str) -> Result<Vec<String>> {
    let brokers: Vec<String> = broker
        .split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect();
    if brokers.is_empty() {
        return Err(Error::Config("Broker address is empty".to_string()));
    }
    Ok(brokers)
}

fn validate_topic(topic: &str) -> Result<String> {
    if topic.trim().is_empty() {
        return Err(Error::Config("Topic name is empty".to_string()));
    }
    Ok(topic.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    /// File whose lines are published.
    pub input: PathBuf,
    pub settings: Settings,
}

impl ProducerConfig {
    pub fn new(
        broker: &str,
        topic: &str,
        input: impl Into<PathBuf>,
        settings: Settings,
    ) -> Result<Self> {
        Ok(ProducerConfig {
            brokers: parse_brokers(broker)?,
            topic: validate_topic(topic)?,
            input: input.into(),
            settings,
        })
    }
}

/// Where consumed payloads are appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub output: OutputTarget,
    /// Keep consuming after all partitions are drained.
    pub listen: bool,
    /// Offset applied to every assigned partition. `None` keeps whatever the broker suggests.
    pub start_offset: Option<StartOffset>,
    pub settings: Settings,
}

impl ConsumerConfig {
    /// A malformed offset token is not an error, the broker default is used instead.
    pub fn new(
        broker: &str,
        topic: &str,
        output: Option<PathBuf>,
        listen: bool,
        offset: &str,
        settings: Settings,
    ) -> Result<Self> {
        let start_offset = match offset.parse::<StartOffset>() {
            Ok(start_offset) => Some(start_offset),
            Err(e) => {
                warn!(%e, "Ignoring offset, partitions start from the broker default");
                None
            }
        };
        Ok(ConsumerConfig {
            brokers: parse_brokers(broker)?,
            topic: validate_topic(topic)?,
            output: output.map_or(OutputTarget::Stdout, OutputTarget::File),
            listen,
            start_offset,
            settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::load(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.consumer_group, "pavel");
        assert!(settings.kafka_raw_config.is_empty());
    }

    #[test]
    fn test_settings_load_from_env() {
        let settings = Settings::load([
            ("PAVEL_CONSUMER_GROUP", "exporter"),
            ("PAVEL_KAFKA_CONFIG", "linger.ms=5, security.protocol = SSL ,"),
            ("UNRELATED", "value"),
        ])
        .unwrap();
        assert_eq!(settings.consumer_group, "exporter");
        assert_eq!(
            settings.kafka_raw_config,
            HashMap::from([
                ("linger.ms".to_string(), "5".to_string()),
                ("security.protocol".to_string(), "SSL".to_string()),
            ])
        );
    }

    #[test]
    fn test_settings_rejects_malformed_raw_config() {
        let err = Settings::load([("PAVEL_KAFKA_CONFIG", "linger.ms")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = Settings::load([("PAVEL_KAFKA_CONFIG", "=5")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let err = Settings::load([("PAVEL_CONSUMER_GROUP", " ")]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_producer_config() {
        let config = ProducerConfig::new(
            "localhost:9092, other:9092",
            "lines",
            "input.txt",
            Settings::default(),
        )
        .unwrap();
        assert_eq!(config.brokers, vec!["localhost:9092", "other:9092"]);
        assert_eq!(config.input, PathBuf::from("input.txt"));

        assert!(ProducerConfig::new("", "lines", "input.txt", Settings::default()).is_err());
        assert!(ProducerConfig::new("localhost:9092", " ", "in", Settings::default()).is_err());
    }

    #[test]
    fn test_consumer_config_offsets() {
        let config = ConsumerConfig::new(
            "localhost:9092",
            "lines",
            None,
            false,
            DEFAULT_OFFSET,
            Settings::default(),
        )
        .unwrap();
        assert_eq!(config.start_offset, Some(StartOffset::Beginning));
        assert_eq!(config.output, OutputTarget::Stdout);

        let config = ConsumerConfig::new(
            "localhost:9092",
            "lines",
            Some(PathBuf::from("out.txt")),
            true,
            "banana",
            Settings::default(),
        )
        .unwrap();
        assert_eq!(config.start_offset, None);
        assert_eq!(config.output, OutputTarget::File(PathBuf::from("out.txt")));
        assert!(config.listen);
    }
}
