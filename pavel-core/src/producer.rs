use std::time::Duration;

use bytes::Bytes;
use pavel_kafka::producer::DeliveryStatus;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{error, info};

use crate::config::ProducerConfig;
use crate::error::{Error, Result};
use crate::lines::LineReader;

/// [Kafka] producer, the only publisher the command line uses.
///
/// [Kafka]: https://kafka.apache.org/
pub(crate) mod kafka;

/// Upper bound for delivering whatever is still queued when the input is exhausted.
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

/// Publishes a payload and resolves once the broker reported the outcome of that payload.
#[trait_variant::make(Publisher: Send)]
#[allow(dead_code)]
pub(crate) trait LocalPublisher {
    /// Topic the messages end up in.
    fn topic(&self) -> &str;

    async fn publish(&mut self, payload: Bytes) -> DeliveryStatus;
}

/// Counts of a finished produce run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProduceSummary {
    pub sent: usize,
    pub delivered: usize,
    pub failed: usize,
}

/// Publishes every line of the input file to the topic, one message per line, and writes a
/// delivery report line per message to stdout.
pub async fn produce(config: ProducerConfig) -> Result<ProduceSummary> {
    let mut lines = LineReader::open(&config.input).await?;
    let mut producer = kafka::new_kafka_producer(&config)?;
    info!(
        brokers = config.brokers.join(","),
        topic = config.topic,
        input = %config.input.display(),
        "Created producer"
    );

    let mut report = tokio::io::stdout();
    let published = publish_lines(&mut producer, &mut lines, &mut report).await;

    // flush even when reading the input failed half way, delivered messages stay delivered
    let closed = producer.close(FLUSH_TIMEOUT).await;
    let summary = published?;
    closed?;

    info!(
        sent = summary.sent,
        delivered = summary.delivered,
        failed = summary.failed,
        "Finished producing"
    );
    Ok(summary)
}

/// Sends line after line. The next line is only read once the previous message got its
/// delivery report, so reports come out in input order. Failed deliveries are reported and
/// skipped.
pub(crate) async fn publish_lines<P, R, W>(
    publisher: &mut P,
    lines: &mut LineReader<R>,
    report: &mut W,
) -> Result<ProduceSummary>
where
    P: Publisher,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut summary = ProduceSummary::default();
    while let Some(line) = lines.next_line().await? {
        summary.sent += 1;
        let status_line = match publisher.publish(line).await {
            DeliveryStatus::Delivered {
                topic,
                partition,
                offset,
            } => {
                summary.delivered += 1;
                format!("Delivered message to topic {topic} [{partition}] at offset {offset}\n")
            }
            DeliveryStatus::Failed(e) => {
                summary.failed += 1;
                error!(%e, topic = publisher.topic(), "Delivery failed");
                format!("Delivery failed: {e}\n")
            }
        };
        report
            .write_all(status_line.as_bytes())
            .await
            .map_err(|e| Error::Output(format!("Failed to write delivery report: {e}")))?;
    }
    report
        .flush()
        .await
        .map_err(|e| Error::Output(format!("Failed to write delivery report: {e}")))?;
    Ok(summary)
}
