use std::collections::HashMap;
use std::fmt;

use pavel_kafka::consumer::ConsumerEvent;
use pavel_kafka::{StartOffset, TopicPartition};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ConsumerConfig;
use crate::error::Result;
use crate::lines::LineWriter;
use crate::shutdown;

/// [Kafka] group consumer, the only event source the command line uses.
///
/// [Kafka]: https://kafka.apache.org/
pub(crate) mod kafka;

/// Ordered stream of consumer events. Assignments and revocations have to be answered before
/// the next event is requested.
#[trait_variant::make(EventSource: Send)]
#[allow(dead_code)]
pub(crate) trait LocalEventSource {
    /// Next event, `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<ConsumerEvent>;

    /// Commits the assignment, with the start offsets to use.
    fn assign(&mut self, partitions: Vec<TopicPartition>) -> Result<()>;

    /// Releases the current assignment.
    fn unassign(&mut self) -> Result<()>;
}

/// Why a consume run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT or SIGTERM.
    Signal,
    /// Every assigned partition reached its end and `--listen` is off.
    Drained,
    /// The broker client reported an error.
    BrokerError(String),
    /// The client stopped producing events.
    StreamClosed,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Signal => write!(f, "signal"),
            StopReason::Drained => write!(f, "drained"),
            StopReason::BrokerError(e) => write!(f, "broker error: {e}"),
            StopReason::StreamClosed => write!(f, "stream closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopState {
    /// Subscribed, nothing received yet.
    Subscribing,
    Running,
    Terminated(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumeSummary {
    /// Number of payloads written to the output.
    pub messages: usize,
    pub reason: StopReason,
}

/// Subscribes to the topic and appends every payload as a line to the output until a signal
/// arrives, the broker reports an error, or (without `--listen`) every partition is drained.
pub async fn consume(config: ConsumerConfig) -> Result<ConsumeSummary> {
    let cancel_token = CancellationToken::new();
    let shutdown_handle = shutdown::cancel_on_signal(cancel_token.clone())?;
    let result = consume_until(config, cancel_token).await;
    shutdown_handle.abort();
    result
}

pub(crate) async fn consume_until(
    config: ConsumerConfig,
    cancel_token: CancellationToken,
) -> Result<ConsumeSummary> {
    let source = format!("{}/{}", config.brokers.join(","), config.topic);
    if config.listen {
        info!("Listening to {source}");
    } else {
        info!("Consuming messages from {source}");
    }

    let mut output = LineWriter::open(&config.output).await?;
    let mut consumer = match kafka::new_kafka_consumer(&config) {
        Ok(consumer) => consumer,
        Err(e) => {
            let _ = output.close().await;
            return Err(e);
        }
    };

    let consumed = ConsumeLoop::new(config.listen, config.start_offset)
        .run(&mut consumer, &mut output, cancel_token)
        .await;

    // released on every exit path, before any error is reported
    let consumer_closed = consumer.close().await;
    let output_closed = output.close().await;
    let summary = consumed?;
    consumer_closed?;
    output_closed?;

    info!(
        messages = summary.messages,
        reason = %summary.reason,
        "Finished consuming"
    );
    match summary.reason {
        StopReason::BrokerError(e) => Err(crate::Error::Kafka(e)),
        _ => Ok(summary),
    }
}

/// Tracks which assigned partitions have reached their end since their last message.
#[derive(Debug, Default)]
struct DrainTracker {
    at_end: HashMap<(String, i32), bool>,
}

impl DrainTracker {
    fn assigned(&mut self, partitions: &[TopicPartition]) {
        for part in partitions {
            self.at_end
                .insert((part.topic.clone(), part.partition), false);
        }
    }

    fn revoked(&mut self, partitions: &[TopicPartition]) {
        for part in partitions {
            self.at_end.remove(&(part.topic.clone(), part.partition));
        }
    }

    fn received(&mut self, topic: &str, partition: i32) {
        self.mark(topic, partition, false);
    }

    fn reached_end(&mut self, topic: &str, partition: i32) {
        self.mark(topic, partition, true);
    }

    // events of partitions that are not assigned (any more) are not tracked
    fn mark(&mut self, topic: &str, partition: i32, at_end: bool) {
        if let Some(state) = self.at_end.get_mut(&(topic.to_string(), partition)) {
            *state = at_end;
        }
    }

    fn all_drained(&self) -> bool {
        !self.at_end.is_empty() && self.at_end.values().all(|at_end| *at_end)
    }
}

/// The single threaded consume loop. Exactly one event, or the cancellation, is handled per
/// iteration and it is handled completely before the next one is awaited.
pub(crate) struct ConsumeLoop {
    listen: bool,
    start_offset: Option<StartOffset>,
    drain: DrainTracker,
    messages: usize,
}

impl ConsumeLoop {
    pub(crate) fn new(listen: bool, start_offset: Option<StartOffset>) -> Self {
        Self {
            listen,
            start_offset,
            drain: DrainTracker::default(),
            messages: 0,
        }
    }

    pub(crate) async fn run<S: EventSource>(
        mut self,
        source: &mut S,
        output: &mut LineWriter,
        cancel_token: CancellationToken,
    ) -> Result<ConsumeSummary> {
        let mut state = LoopState::Subscribing;
        loop {
            state = tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Shutdown requested, stopping consumer");
                    LoopState::Terminated(StopReason::Signal)
                }

                event = source.next_event() => match event {
                    Some(event) => self.dispatch(&state, event, source, output).await?,
                    None => LoopState::Terminated(StopReason::StreamClosed),
                },
            };

            if let LoopState::Terminated(reason) = state {
                return Ok(ConsumeSummary {
                    messages: self.messages,
                    reason,
                });
            }
        }
    }

    async fn dispatch<S: EventSource>(
        &mut self,
        state: &LoopState,
        event: ConsumerEvent,
        source: &mut S,
        output: &mut LineWriter,
    ) -> Result<LoopState> {
        if *state == LoopState::Subscribing {
            debug!("First event received, consumer is running");
        }

        match event {
            ConsumerEvent::Assigned(mut partitions) => {
                if let Some(start_offset) = self.start_offset {
                    for part in partitions.iter_mut() {
                        part.offset = start_offset;
                    }
                }
                info!(?partitions, "Assigning partitions");
                self.drain.assigned(&partitions);
                source.assign(partitions)?;
            }
            ConsumerEvent::Revoked(partitions) => {
                info!(?partitions, "Partitions revoked");
                self.drain.revoked(&partitions);
                source.unassign()?;
            }
            ConsumerEvent::Message(message) => {
                output.write_line(&message.value).await?;
                self.messages += 1;
                self.drain.received(&message.topic, message.partition);
            }
            ConsumerEvent::PartitionEof(part) => {
                debug!(topic = part.topic, partition = part.partition, "Reached end of partition");
                if !self.listen {
                    self.drain.reached_end(&part.topic, part.partition);
                    if self.drain.all_drained() {
                        return Ok(LoopState::Terminated(StopReason::Drained));
                    }
                }
            }
            ConsumerEvent::Error(e) => {
                error!("Error: {e}");
                return Ok(LoopState::Terminated(StopReason::BrokerError(e)));
            }
        }
        Ok(LoopState::Running)
    }
}
