//! Newline delimited input and output. Lines are treated as raw bytes, nothing is decoded.

use std::path::Path;

use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Split};

use crate::config::OutputTarget;
use crate::error::{Error, Result};

/// Reads one line at a time, without the trailing `\n` or `\r\n`.
pub(crate) struct LineReader<R> {
    segments: Split<BufReader<R>>,
}

impl LineReader<File> {
    pub(crate) async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| Error::Input(format!("Failed to open {}: {e}", path.display())))?;
        Ok(Self::new(file))
    }
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            segments: BufReader::new(reader).split(b'\n'),
        }
    }

    /// Returns the next line, `None` at the end of the input.
    pub(crate) async fn next_line(&mut self) -> Result<Option<Bytes>> {
        let segment = self
            .segments
            .next_segment()
            .await
            .map_err(|e| Error::Input(format!("Failed to read line: {e}")))?;
        Ok(segment.map(|mut line| {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            Bytes::from(line)
        }))
    }
}

/// Appends payloads as lines and flushes after every line.
pub(crate) struct LineWriter {
    inner: Box<dyn AsyncWrite + Send + Unpin>,
}

impl LineWriter {
    /// Opens the output for appending. Files are created when missing and never truncated.
    pub(crate) async fn open(target: &OutputTarget) -> Result<Self> {
        match target {
            OutputTarget::Stdout => Ok(Self::new(tokio::io::stdout())),
            OutputTarget::File(path) => {
                let file = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(path)
                    .await
                    .map_err(|e| {
                        Error::Output(format!("Failed to open {}: {e}", path.display()))
                    })?;
                Ok(Self::new(file))
            }
        }
    }

    pub(crate) fn new(inner: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self {
            inner: Box::new(inner),
        }
    }

    /// Writes the payload followed by `\n`. The line is flushed before this returns.
    pub(crate) async fn write_line(&mut self, payload: &[u8]) -> Result<()> {
        let mut line = Vec::with_capacity(payload.len() + 1);
        line.extend_from_slice(payload);
        line.push(b'\n');
        self.inner
            .write_all(&line)
            .await
            .map_err(|e| Error::Output(format!("Failed to write line: {e}")))?;
        self.inner
            .flush()
            .await
            .map_err(|e| Error::Output(format!("Failed to flush output: {e}")))
    }

    pub(crate) async fn close(mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| Error::Output(format!("Failed to close output: {e}")))
    }
}
