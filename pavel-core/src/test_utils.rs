//! In-memory publishers and event sources for exercising the pipelines without a broker.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use pavel_kafka::consumer::ConsumerEvent;
use pavel_kafka::producer::DeliveryStatus;
use pavel_kafka::{KafkaMessage, StartOffset, TopicPartition};
use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

use crate::consumer::EventSource;
use crate::producer::Publisher;

const TEST_TOPIC: &str = "lines";

/// Delivers everything to partition 0 unless the payload matches `fail_on`.
pub(crate) struct FakePublisher {
    topic: String,
    fail_on: Option<Bytes>,
    next_offset: i64,
    report: Option<SharedReport>,
    /// Every payload handed to [Publisher::publish], in order.
    pub(crate) published: Vec<Bytes>,
    /// Report lines already written each time a payload was handed over.
    pub(crate) reports_seen: Vec<usize>,
}

impl FakePublisher {
    pub(crate) fn new(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            fail_on: None,
            next_offset: 0,
            report: None,
            published: vec![],
            reports_seen: vec![],
        }
    }

    pub(crate) fn watch_report(mut self, report: SharedReport) -> Self {
        self.report = Some(report);
        self
    }

    pub(crate) fn fail_on(mut self, payload: &'static str) -> Self {
        self.fail_on = Some(Bytes::from_static(payload.as_bytes()));
        self
    }
}

impl Publisher for FakePublisher {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&mut self, payload: Bytes) -> DeliveryStatus {
        if let Some(report) = &self.report {
            self.reports_seen.push(report.lines());
        }
        self.published.push(payload.clone());
        tokio::task::yield_now().await;

        if self.fail_on.as_ref() == Some(&payload) {
            return DeliveryStatus::Failed(pavel_kafka::Error::Kafka(
                "Message production error: MessageTimedOut (Local: Message timed out)".to_string(),
            ));
        }
        let offset = self.next_offset;
        self.next_offset += 1;
        DeliveryStatus::Delivered {
            topic: self.topic.clone(),
            partition: 0,
            offset,
        }
    }
}

/// Report stream that can still be inspected while a publisher is writing to it.
#[derive(Clone, Default)]
pub(crate) struct SharedReport(Arc<Mutex<Vec<u8>>>);

impl SharedReport {
    pub(crate) fn lines(&self) -> usize {
        self.0.lock().unwrap().iter().filter(|b| **b == b'\n').count()
    }

    pub(crate) fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl AsyncWrite for SharedReport {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Hands out a scripted list of events and records how they were answered.
pub(crate) struct FakeEventSource {
    events: VecDeque<ConsumerEvent>,
    cancel_when_exhausted: Option<CancellationToken>,
    watched_output: Option<PathBuf>,
    /// Lines present in the watched output each time an event was requested.
    pub(crate) observed_lines: Vec<usize>,
    pub(crate) assignments: Vec<Vec<TopicPartition>>,
    pub(crate) unassigned: usize,
}

impl FakeEventSource {
    pub(crate) fn new(events: Vec<ConsumerEvent>) -> Self {
        Self {
            events: events.into(),
            cancel_when_exhausted: None,
            watched_output: None,
            observed_lines: vec![],
            assignments: vec![],
            unassigned: 0,
        }
    }

    /// Once the script is exhausted, cancel the token and block, like a listening consumer
    /// that receives a signal.
    pub(crate) fn cancel_when_exhausted(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_when_exhausted = Some(cancel_token);
        self
    }

    pub(crate) fn watch_output(&mut self, path: &Path) {
        self.watched_output = Some(path.to_path_buf());
    }

    pub(crate) fn remaining(&self) -> usize {
        self.events.len()
    }
}

impl EventSource for FakeEventSource {
    async fn next_event(&mut self) -> Option<ConsumerEvent> {
        if let Some(path) = &self.watched_output {
            let written = std::fs::read(path).unwrap_or_default();
            self.observed_lines
                .push(written.iter().filter(|b| **b == b'\n').count());
        }
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        match &self.cancel_when_exhausted {
            Some(cancel_token) => {
                cancel_token.cancel();
                std::future::pending().await
            }
            None => None,
        }
    }

    fn assign(&mut self, partitions: Vec<TopicPartition>) -> crate::Result<()> {
        self.assignments.push(partitions);
        Ok(())
    }

    fn unassign(&mut self) -> crate::Result<()> {
        self.unassigned += 1;
        Ok(())
    }
}

pub(crate) fn partition(partition: i32) -> TopicPartition {
    TopicPartition {
        topic: TEST_TOPIC.to_string(),
        partition,
        offset: StartOffset::Invalid,
    }
}

pub(crate) fn message(partition: i32, payload: &'static str) -> ConsumerEvent {
    ConsumerEvent::Message(KafkaMessage {
        topic: TEST_TOPIC.to_string(),
        value: Bytes::from_static(payload.as_bytes()),
        partition,
        offset: 0,
    })
}

pub(crate) fn eof(partition: i32) -> ConsumerEvent {
    ConsumerEvent::PartitionEof(TopicPartition {
        topic: TEST_TOPIC.to_string(),
        partition,
        offset: StartOffset::End,
    })
}
