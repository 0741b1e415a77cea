//! Line codec for the worker channel.
//!
//! Uses LinesCodec for splitting incoming text; outgoing frames are rendered
//! with their `Display` impl plus a newline. Works over any
//! AsyncRead/AsyncWrite (FIFOs, stdin, in-memory pipes).

use std::io;

use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use super::protocol::OutgoingFrame;

/// Codec that emits one line per [`OutgoingFrame`] and yields incoming lines
/// with the terminator (`\n` or `\r\n`) stripped.
#[derive(Debug, Default)]
pub struct FrameCodec {
    lines: LinesCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject incoming lines longer than `max` bytes.
    pub fn with_max_line_length(max: usize) -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(max),
        }
    }
}

fn lines_error(e: LinesCodecError) -> io::Error {
    match e {
        LinesCodecError::Io(e) => e,
        LinesCodecError::MaxLineLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "response line too long")
        }
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines.decode(src).map_err(lines_error)
    }

    /// A trailing partial line at end of stream is still a line.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.lines.decode_eof(src).map_err(lines_error)
    }
}

impl Encoder<OutgoingFrame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, frame: OutgoingFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = frame.to_string();
        tracing::trace!(tag = %frame.tag(), frame_len = line.len(), "Encoding frame");
        dst.reserve(line.len() + 1);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
