use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use rdkafka::ClientConfig;
use rdkafka::Offset;
use tracing::info;

pub mod consumer;
pub mod producer;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Connecting to Kafka {server} - {error}")]
    Connection { server: String, error: String },

    #[error("Subscribing to {topic} - {error}")]
    Subscribe { topic: String, error: String },

    #[error("Kafka - {0}")]
    Kafka(String),

    #[error("Invalid offset token {0:?}")]
    InvalidOffset(String),

    #[error("Polling task terminated")]
    PollerTerminated,

    #[error("{0}")]
    Other(String),
}

/// Message represents a message received from Kafka.
#[derive(Debug, Clone, PartialEq)]
pub struct KafkaMessage {
    /// The topic name.
    pub topic: String,
    /// The user payload.
    pub value: Bytes,
    /// The partition number.
    pub partition: i32,
    /// The offset of the message.
    pub offset: i64,
}

/// Starting position applied to a partition when it gets assigned.
///
/// The accepted tokens follow the librdkafka vocabulary so that `--offset` behaves the same way
/// as `auto.offset.reset` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOffset {
    /// Oldest message still retained in the partition.
    Beginning,
    /// Only messages produced after the assignment.
    End,
    /// The offset committed for the consumer group.
    Stored,
    /// Leave it to the broker (`auto.offset.reset`).
    Invalid,
    /// An absolute offset.
    Offset(i64),
    /// N messages before the end of the partition.
    Tail(i64),
}

impl FromStr for StartOffset {
    type Err = Error;

    fn from_str(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "earliest" | "beginning" | "smallest" => Ok(StartOffset::Beginning),
            "latest" | "end" | "largest" => Ok(StartOffset::End),
            "stored" => Ok(StartOffset::Stored),
            "unset" | "invalid" => Ok(StartOffset::Invalid),
            other => match other.parse::<i64>() {
                Ok(offset) if offset >= 0 => Ok(StartOffset::Offset(offset)),
                Ok(offset) => offset
                    .checked_neg()
                    .map(StartOffset::Tail)
                    .ok_or_else(|| Error::InvalidOffset(token.to_string())),
                Err(_) => Err(Error::InvalidOffset(token.to_string())),
            },
        }
    }
}

impl fmt::Display for StartOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartOffset::Beginning => write!(f, "beginning"),
            StartOffset::End => write!(f, "end"),
            StartOffset::Stored => write!(f, "stored"),
            StartOffset::Invalid => write!(f, "unset"),
            StartOffset::Offset(offset) => write!(f, "{offset}"),
            StartOffset::Tail(count) => write!(f, "-{count}"),
        }
    }
}

impl From<StartOffset> for Offset {
    fn from(value: StartOffset) -> Self {
        match value {
            StartOffset::Beginning => Offset::Beginning,
            StartOffset::End => Offset::End,
            StartOffset::Stored => Offset::Stored,
            StartOffset::Invalid => Offset::Invalid,
            StartOffset::Offset(offset) => Offset::Offset(offset),
            StartOffset::Tail(count) => Offset::OffsetTail(count),
        }
    }
}

impl From<Offset> for StartOffset {
    fn from(value: Offset) -> Self {
        match value {
            Offset::Beginning => StartOffset::Beginning,
            Offset::End => StartOffset::End,
            Offset::Stored => StartOffset::Stored,
            Offset::Offset(offset) => StartOffset::Offset(offset),
            Offset::OffsetTail(count) => StartOffset::Tail(count),
            Offset::Invalid => StartOffset::Invalid,
        }
    }
}

/// A partition of a topic along with the offset consumption should start from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
    pub offset: StartOffset,
}

/// Applies user supplied librdkafka properties. The caller sets its mandatory properties
/// afterwards so they cannot be overridden.
/// https://docs.confluent.io/platform/current/clients/librdkafka/html/md_CONFIGURATION.html
pub(crate) fn apply_raw_config(client_config: &mut ClientConfig, raw: &HashMap<String, String>) {
    if raw.is_empty() {
        return;
    }
    let mut pairs: Vec<String> = raw.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    info!("Applying user-specified kafka config: {}", pairs.join(", "));
    for (key, value) in raw {
        client_config.set(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_offsets() {
        assert_eq!(
            "earliest".parse::<StartOffset>().unwrap(),
            StartOffset::Beginning
        );
        assert_eq!(
            "Beginning".parse::<StartOffset>().unwrap(),
            StartOffset::Beginning
        );
        assert_eq!("latest".parse::<StartOffset>().unwrap(), StartOffset::End);
        assert_eq!("largest".parse::<StartOffset>().unwrap(), StartOffset::End);
        assert_eq!("stored".parse::<StartOffset>().unwrap(), StartOffset::Stored);
        assert_eq!("unset".parse::<StartOffset>().unwrap(), StartOffset::Invalid);
    }

    #[test]
    fn test_parse_numeric_offsets() {
        assert_eq!("42".parse::<StartOffset>().unwrap(), StartOffset::Offset(42));
        assert_eq!("0".parse::<StartOffset>().unwrap(), StartOffset::Offset(0));
        assert_eq!("-10".parse::<StartOffset>().unwrap(), StartOffset::Tail(10));
    }

    #[test]
    fn test_parse_malformed_offset() {
        let err = "banana".parse::<StartOffset>().unwrap_err();
        assert!(matches!(err, Error::InvalidOffset(token) if token == "banana"));
        assert!("".parse::<StartOffset>().is_err());
        assert!("12abc".parse::<StartOffset>().is_err());
    }

    #[test]
    fn test_rdkafka_offset_conversion() {
        assert_eq!(Offset::from(StartOffset::Beginning), Offset::Beginning);
        assert_eq!(Offset::from(StartOffset::Tail(5)), Offset::OffsetTail(5));
        assert_eq!(StartOffset::from(Offset::Offset(7)), StartOffset::Offset(7));
        assert_eq!(StartOffset::from(Offset::Invalid), StartOffset::Invalid);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for offset in [
            StartOffset::Beginning,
            StartOffset::End,
            StartOffset::Stored,
            StartOffset::Invalid,
            StartOffset::Offset(3),
            StartOffset::Tail(4),
        ] {
            assert_eq!(offset.to_string().parse::<StartOffset>().unwrap(), offset);
        }
    }

    #[test]
    fn test_apply_raw_config() {
        let mut client_config = ClientConfig::new();
        let raw = HashMap::from([("linger.ms".to_string(), "10".to_string())]);
        apply_raw_config(&mut client_config, &raw);
        assert_eq!(client_config.get("linger.ms"), Some("10"));
    }
}
