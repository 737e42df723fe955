use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use rdkafka::client::ClientContext;
use rdkafka::config::{ClientConfig, RDKafkaLogLevel};
use rdkafka::consumer::{BaseConsumer, Consumer, ConsumerContext, Rebalance};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::TopicPartitionList;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Error, KafkaMessage, Result, StartOffset, TopicPartition};

/// How long a single poll blocks before the polling thread checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Events buffered between the polling thread and the consumer.
const EVENT_CHANNEL_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub struct KafkaConsumerConfig {
    /// The list of Kafka brokers to connect to.
    pub brokers: Vec<String>,
    /// The Kafka topic to consume messages from.
    pub topic: String,
    /// The consumer group to use for the Kafka consumer.
    pub consumer_group: String,
    /// Whether end-of-partition events should be emitted.
    pub partition_eof: bool,
    /// Any supported kafka client configuration options from
    /// https://docs.confluent.io/platform/current/clients/librdkafka/html/md_CONFIGURATION.html
    pub kafka_raw_config: HashMap<String, String>,
}

/// Everything the consumer can observe, in the order librdkafka produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumerEvent {
    /// Partitions were assigned to this member. Has to be answered with
    /// [KafkaConsumer::assign] before the next event is read.
    Assigned(Vec<TopicPartition>),
    /// Partitions were taken away. Has to be answered with [KafkaConsumer::unassign].
    Revoked(Vec<TopicPartition>),
    Message(KafkaMessage),
    /// No more messages are currently available on the partition.
    PartitionEof(TopicPartition),
    Error(String),
}

/// Answers the polling thread waits for while it is inside a rebalance callback.
enum RebalanceReply {
    Assign(Vec<TopicPartition>),
    Unassign,
}

/// Events as they travel over the channel. Rebalances carry the way back to the callback.
enum PolledEvent {
    Assigned {
        partitions: Vec<TopicPartition>,
        respond_to: oneshot::Sender<RebalanceReply>,
    },
    Revoked {
        partitions: Vec<TopicPartition>,
        respond_to: oneshot::Sender<RebalanceReply>,
    },
    Other(ConsumerEvent),
}

// The context runs on the polling thread. Rebalances are handed to the consumer and the
// callback blocks until the application decided what to assign; librdkafka applies the
// assignment once `pre_rebalance` returns.
struct EventContext {
    events: mpsc::Sender<PolledEvent>,
}

impl ClientContext for EventContext {
    // Served from `poll` on the polling thread, so blocking until the loop makes room is safe.
    // Once the consumer is closing the channel is closed and the send fails immediately.
    fn error(&self, error: KafkaError, reason: &str) {
        error!(?error, reason, "librdkafka client error");
        let _ = self
            .events
            .blocking_send(PolledEvent::Other(ConsumerEvent::Error(format!(
                "{error}: {reason}"
            ))));
    }
}

impl ConsumerContext for EventContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        info!("Pre rebalance {:?}", rebalance);
        match rebalance {
            Rebalance::Assign(tpl) => {
                let (tx, rx) = oneshot::channel();
                let event = PolledEvent::Assigned {
                    partitions: partitions_of(tpl),
                    respond_to: tx,
                };
                if self.events.blocking_send(event).is_err() {
                    return;
                }
                match rx.blocking_recv() {
                    Ok(RebalanceReply::Assign(partitions)) => apply_offsets(tpl, &partitions),
                    Ok(RebalanceReply::Unassign) => {
                        warn!("Assignment answered with unassign, keeping suggested offsets")
                    }
                    Err(_) => warn!("Consumer went away during assignment"),
                }
            }
            Rebalance::Revoke(tpl) => {
                let (tx, rx) = oneshot::channel();
                let event = PolledEvent::Revoked {
                    partitions: partitions_of(tpl),
                    respond_to: tx,
                };
                if self.events.blocking_send(event).is_ok() {
                    let _ = rx.blocking_recv();
                }
            }
            Rebalance::Error(e) => {
                let _ = self
                    .events
                    .blocking_send(PolledEvent::Other(ConsumerEvent::Error(format!(
                        "Rebalance failed: {e}"
                    ))));
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        info!("Post rebalance {:?}", rebalance);
    }

    fn commit_callback(&self, result: KafkaResult<()>, _offsets: &TopicPartitionList) {
        debug!("Committing offsets: {:?}", result);
    }
}

fn partitions_of(tpl: &TopicPartitionList) -> Vec<TopicPartition> {
    tpl.elements()
        .iter()
        .map(|elem| TopicPartition {
            topic: elem.topic().to_string(),
            partition: elem.partition(),
            offset: elem.offset().into(),
        })
        .collect()
}

fn apply_offsets(tpl: &TopicPartitionList, decided: &[TopicPartition]) {
    for mut elem in tpl.elements() {
        let Some(part) = decided
            .iter()
            .find(|p| p.topic == elem.topic() && p.partition == elem.partition())
        else {
            continue;
        };
        if let Err(e) = elem.set_offset(part.offset.into()) {
            warn!(
                ?e,
                topic = part.topic,
                partition = part.partition,
                "Failed to set start offset, keeping the suggested one"
            );
        }
    }
}

impl From<&BorrowedMessage<'_>> for KafkaMessage {
    fn from(message: &BorrowedMessage<'_>) -> Self {
        KafkaMessage {
            topic: message.topic().to_string(),
            // The rdkafka doc says that the payload can be None if there is no payload.
            value: message
                .payload()
                .map(Bytes::copy_from_slice)
                .unwrap_or_default(),
            partition: message.partition(),
            offset: message.offset(),
        }
    }
}

type PavelConsumer = BaseConsumer<EventContext>;

/// Polls librdkafka on a dedicated thread and forwards every event. The thread owns the
/// consumer, dropping it on exit closes the consumer and leaves the group.
fn poll_events(
    consumer: PavelConsumer,
    topic: String,
    events: mpsc::Sender<PolledEvent>,
    cancel_token: CancellationToken,
) {
    while !cancel_token.is_cancelled() {
        let event = match consumer.poll(POLL_INTERVAL) {
            None => continue,
            Some(Ok(message)) => ConsumerEvent::Message(KafkaMessage::from(&message)),
            Some(Err(KafkaError::PartitionEOF(partition))) => {
                let offset = consumer
                    .position()
                    .ok()
                    .and_then(|tpl| {
                        tpl.find_partition(&topic, partition)
                            .map(|elem| StartOffset::from(elem.offset()))
                    })
                    .unwrap_or(StartOffset::End);
                ConsumerEvent::PartitionEof(TopicPartition {
                    topic: topic.clone(),
                    partition,
                    offset,
                })
            }
            Some(Err(e)) => ConsumerEvent::Error(e.to_string()),
        };
        if events.blocking_send(PolledEvent::Other(event)).is_err() {
            break;
        }
    }
    debug!("Kafka polling thread stopped, closing consumer");
}

/// A group member subscribed to one topic, exposing librdkafka's callbacks and poll results as
/// one ordered stream of [ConsumerEvent]s.
pub struct KafkaConsumer {
    events: mpsc::Receiver<PolledEvent>,
    pending_rebalance: Option<oneshot::Sender<RebalanceReply>>,
    cancel_token: CancellationToken,
    poller: Option<JoinHandle<()>>,
}

impl KafkaConsumer {
    /// Creates the consumer and subscribes to the topic. Subscription errors are returned here
    /// rather than surfacing later as events.
    pub fn connect(config: KafkaConsumerConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("session.timeout.ms", "6000")
            .set("auto.offset.reset", "earliest");
        crate::apply_raw_config(&mut client_config, &config.kafka_raw_config);
        client_config
            .set("group.id", &config.consumer_group)
            .set("bootstrap.servers", config.brokers.join(","))
            .set("enable.partition.eof", config.partition_eof.to_string())
            .set_log_level(RDKafkaLogLevel::Warning);

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
        let context = EventContext { events: tx.clone() };
        let consumer: PavelConsumer =
            client_config
                .create_with_context(context)
                .map_err(|err| Error::Connection {
                    server: config.brokers.join(","),
                    error: err.to_string(),
                })?;

        // NOTE: Subscribing to a non-existent topic will not return an error, librdkafka
        // reports it through the error callback once the metadata arrives.
        consumer
            .subscribe(&[config.topic.as_str()])
            .map_err(|err| Error::Subscribe {
                topic: config.topic.clone(),
                error: err.to_string(),
            })?;

        let cancel_token = CancellationToken::new();
        let poller_token = cancel_token.clone();
        let topic = config.topic;
        let poller = std::thread::Builder::new()
            .name("pavel-kafka-poller".to_string())
            .spawn(move || poll_events(consumer, topic, tx, poller_token))
            .map_err(|e| Error::Other(format!("Failed to start Kafka polling thread: {e}")))?;

        info!("Starting Kafka consumer...");
        Ok(Self {
            events: rx,
            pending_rebalance: None,
            cancel_token,
            poller: Some(poller),
        })
    }

    /// Returns the next event, `None` once the polling thread is gone.
    pub async fn next_event(&mut self) -> Option<ConsumerEvent> {
        // an unanswered rebalance would block the polling thread forever
        if let Some(respond_to) = self.pending_rebalance.take() {
            warn!("Rebalance was not answered, accepting the suggested assignment");
            let _ = respond_to.send(RebalanceReply::Unassign);
        }
        match self.events.recv().await? {
            PolledEvent::Assigned {
                partitions,
                respond_to,
            } => {
                self.pending_rebalance = Some(respond_to);
                Some(ConsumerEvent::Assigned(partitions))
            }
            PolledEvent::Revoked {
                partitions,
                respond_to,
            } => {
                self.pending_rebalance = Some(respond_to);
                Some(ConsumerEvent::Revoked(partitions))
            }
            PolledEvent::Other(event) => Some(event),
        }
    }

    /// Answers the pending [ConsumerEvent::Assigned] with the partitions and start offsets to
    /// consume from.
    pub fn assign(&mut self, partitions: Vec<TopicPartition>) -> Result<()> {
        let respond_to = self
            .pending_rebalance
            .take()
            .ok_or_else(|| Error::Other("No assignment is pending".to_string()))?;
        respond_to
            .send(RebalanceReply::Assign(partitions))
            .map_err(|_| Error::PollerTerminated)
    }

    /// Answers the pending [ConsumerEvent::Revoked]; librdkafka releases the partitions.
    pub fn unassign(&mut self) -> Result<()> {
        let respond_to = self
            .pending_rebalance
            .take()
            .ok_or_else(|| Error::Other("No revocation is pending".to_string()))?;
        respond_to
            .send(RebalanceReply::Unassign)
            .map_err(|_| Error::PollerTerminated)
    }

    /// Stops the polling thread and waits for the consumer to leave the group.
    pub async fn close(mut self) -> Result<()> {
        self.cancel_token.cancel();
        // dropping the responder and closing the channel unblocks a polling thread waiting in
        // a rebalance callback, including the revocation issued while the consumer closes
        self.pending_rebalance = None;
        self.events.close();
        let Some(poller) = self.poller.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || poller.join())
            .await
            .map_err(|e| Error::Other(format!("Waiting for polling thread: {e:?}")))?
            .map_err(|_| Error::Other("Kafka polling thread panicked".to_string()))
    }
}

impl Drop for KafkaConsumer {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
