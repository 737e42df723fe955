use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Config Error - {0}")]
    Config(String),

    #[error("Connection Error - {0}")]
    Connection(String),

    #[error("Subscribe Error - {0}")]
    Subscribe(String),

    #[error("Input Error - {0}")]
    Input(String),

    #[error("Output Error - {0}")]
    Output(String),

    #[error("Kafka Error - {0}")]
    Kafka(String),

    #[error("OneShot Receiver Error - {0}")]
    ActorPatternRecv(String),

    #[error("Signal Error - {0}")]
    Signal(String),
}

impl From<pavel_kafka::Error> for Error {
    fn from(value: pavel_kafka::Error) -> Self {
        match value {
            pavel_kafka::Error::Connection { server, error } => {
                Error::Connection(format!("Failed to connect to Kafka server: {server} - {error}"))
            }
            pavel_kafka::Error::Subscribe { topic, error } => {
                Error::Subscribe(format!("Failed to subscribe to topic {topic}: {error}"))
            }
            pavel_kafka::Error::Kafka(e) => Error::Kafka(e),
            pavel_kafka::Error::InvalidOffset(token) => {
                Error::Config(format!("Invalid offset {token:?}"))
            }
            pavel_kafka::Error::PollerTerminated => {
                Error::ActorPatternRecv("Kafka polling thread terminated".to_string())
            }
            pavel_kafka::Error::Other(e) => Error::Kafka(e),
        }
    }
}
