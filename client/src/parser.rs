//! Incremental decoding of the chat frame stream.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use storefront_models::{decode_frame, StreamEvent};

use crate::errors::ClientResult;
use crate::transport::ByteStream;

/// Parses one line, newline already removed.
pub fn parse_line(line: &str) -> ClientResult<StreamEvent> {
    Ok(decode_frame(line)?)
}

/// Reassembles newline-terminated frames from arbitrarily split chunks.
///
/// Splitting happens on raw bytes, so a multi-byte character cut in half by
/// a chunk boundary is decoded once its line is complete. One parser serves
/// one response.
#[derive(Debug, Default)]
pub struct StreamFrameParser {
    buffer: Vec<u8>,
    skipped: usize,
}

impl StreamFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the events of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.parse_bytes(&line[..line.len() - 1]) {
                events.push(event);
            }
        }
        events
    }

    /// End of input: one last attempt on whatever is left in the buffer.
    pub fn finish(mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        self.parse_bytes(&rest).into_iter().collect()
    }

    /// Lines dropped as malformed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse_bytes(&mut self, line: &[u8]) -> Option<StreamEvent> {
        let text = match std::str::from_utf8(line) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(error = %e, "skipping frame that is not UTF-8");
                self.skipped += 1;
                return None;
            }
        };
        if text.trim().is_empty() {
            return None;
        }

        match parse_line(text) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::debug!(error = %e, line = %text, "skipping malformed frame");
                self.skipped += 1;
                None
            }
        }
    }
}

/// Typed events of a response body. A transport failure is yielded once and
/// ends the stream; the remainder of the buffer is then discarded.
pub fn parse_stream(mut body: ByteStream) -> impl Stream<Item = ClientResult<StreamEvent>> + Send {
    async_stream::stream! {
        let mut parser = StreamFrameParser::new();
        let mut failed = false;

        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => {
                    for event in parser.push(&chunk) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    yield Err(e);
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            for event in parser.finish() {
                yield Ok(event);
            }
        }
    }
}

/// Convenience for tests and tools that already hold the chunks.
pub fn parse_chunks<I>(chunks: I) -> Vec<StreamEvent>
where
    I: IntoIterator,
    I::Item: Into<Bytes>,
{
    let mut parser = StreamFrameParser::new();
    let mut events = Vec::new();
    for chunk in chunks {
        let chunk: Bytes = chunk.into();
        events.extend(parser.push(&chunk));
    }
    events.extend(parser.finish());
    events
}
