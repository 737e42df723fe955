pub use self::error::{Error, Result};

mod error;

/// Command line and environment derived settings for both commands.
pub mod config;

/// Newline delimited file input and output.
mod lines;

/// Reads a file line by line and publishes each line as one message, reporting every delivery
/// on stdout before the next line is read.
pub mod producer;
pub use crate::producer::{ProduceSummary, produce};

/// Subscribes to a topic and appends every message payload as a line to a file or stdout,
/// until drained or interrupted.
pub mod consumer;
pub use crate::consumer::{ConsumeSummary, StopReason, consume};

mod shutdown;

#[cfg(test)]
mod test_utils;
