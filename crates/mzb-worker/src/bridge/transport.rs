//! Channel transport between the worker and the node.
//!
//! A FIFO only carries data one way, so the channel owns two halves:
//! - **writer**: the FIFO named by the node, opened read-write so the
//!   open never waits for a reader
//! - **reader**: where responses arrive, stdin by default or a second FIFO

use std::path::Path;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::codec::FrameCodec;
use super::protocol::{OutgoingFrame, ResponseFrame, ResponseStatus, parse_line_count};
use crate::config::{ResponseSource, WorkerConfig};
use crate::error::{BridgeError, Result};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Exclusive owner of the worker's channel handles.
pub struct Channel {
    reader: FramedRead<BoxedReader, FrameCodec>,
    writer: FramedWrite<BoxedWriter, FrameCodec>,
}

impl Channel {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            reader: FramedRead::new(Box::new(reader), FrameCodec::new()),
            writer: FramedWrite::new(Box::new(writer), FrameCodec::new()),
        }
    }

    /// Resolve the FIFO path from the environment and open the channel.
    ///
    /// The path is looked up before anything is opened.
    pub async fn open(config: &WorkerConfig) -> Result<Self> {
        let path = config.channel_path()?;
        Self::open_path(&path, &config.responses).await
    }

    pub async fn open_path(path: &Path, responses: &ResponseSource) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Opening worker channel");
        let writer = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(|e| {
                BridgeError::configuration(format!(
                    "cannot open channel {}: {e}",
                    path.display()
                ))
            })?;

        let channel = match responses {
            ResponseSource::Stdin => Self::new(tokio::io::stdin(), writer),
            ResponseSource::Fifo(response_path) => {
                tracing::debug!(path = %response_path.display(), "Opening response FIFO");
                // Blocks (on the blocking pool) until the node opens its end.
                let reader = tokio::fs::File::open(response_path).await.map_err(|e| {
                    BridgeError::configuration(format!(
                        "cannot open response channel {}: {e}",
                        response_path.display()
                    ))
                })?;
                Self::new(reader, writer)
            }
        };
        tracing::info!(path = %path.display(), "Worker channel open");
        Ok(channel)
    }

    /// Write one frame and flush it.
    pub async fn write_frame(&mut self, frame: OutgoingFrame) -> Result<()> {
        self.writer.send(frame).await?;
        Ok(())
    }

    /// Wait for the next line; end of stream is [`BridgeError::ChannelClosed`].
    pub async fn read_line(&mut self) -> Result<String> {
        match self.reader.next().await {
            Some(line) => Ok(line?),
            None => Err(BridgeError::ChannelClosed),
        }
    }

    /// Read a status line, a count line and exactly that many body lines.
    ///
    /// End of stream before the status line is `ChannelClosed`; anywhere
    /// later it is a framing violation.
    pub async fn read_response(&mut self) -> Result<ResponseFrame> {
        let status = ResponseStatus::parse(&self.read_line().await?)?;
        let count_line = self.read_line().await.map_err(|e| truncated(e, "line count"))?;
        let line_count = parse_line_count(&count_line)?;
        tracing::trace!(?status, line_count, "Reading response body");

        let mut body_lines = Vec::with_capacity(line_count.min(PREALLOCATED_BODY_LINES));
        for read in 0..line_count {
            let line = self.read_line().await.map_err(|e| {
                truncated(e, &format!("body line {} of {line_count}", read + 1))
            })?;
            body_lines.push(line);
        }

        Ok(ResponseFrame { status, body_lines })
    }
}

/// The count is remote input; larger bodies grow as lines arrive.
const PREALLOCATED_BODY_LINES: usize = 64;

fn truncated(err: BridgeError, expected: &str) -> BridgeError {
    match err {
        BridgeError::ChannelClosed => {
            BridgeError::framing(format!("end of stream while waiting for {expected}"))
        }
        other => other,
    }
}
