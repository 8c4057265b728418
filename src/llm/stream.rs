//! Incremental decoding of Ollama's streamed chat records
//!
//! Records are JSON objects, normally one per line, but they may also follow
//! each other with no separator at all. Network chunks carry arbitrary byte
//! ranges: one record may be split across several chunks, and one chunk may
//! carry several records. The decoder keeps an incomplete trailing record
//! buffered until the rest arrives, so neither boundary leaks into the
//! aggregated text (including multi-byte UTF-8 sequences).

use super::LlmError;
use futures::{Stream, StreamExt};
use serde::Deserialize;

/// One decoded partial response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub content: String,
    pub done: bool,
}

/// Wire shape of a streamed record:
/// `{model, created_at, message:{role, content}, done}`.
/// Only the fields aggregation needs are decoded; Ollama reports failures
/// mid-stream as `{"error": "..."}`.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    pub message: Option<ChunkMessage>,
    #[serde(default)]
    pub done: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    pub content: String,
}

/// Decode one complete record
pub fn parse_fragment(line: &[u8]) -> Result<Fragment, LlmError> {
    let chunk: ChatChunk = serde_json::from_slice(line).map_err(|e| decode_error(&e, line))?;
    into_fragment(chunk, line)
}

fn decode_error(e: &serde_json::Error, raw: &[u8]) -> LlmError {
    LlmError::decode(format!(
        "Failed to decode stream fragment: {e} - fragment: {}",
        String::from_utf8_lossy(raw)
    ))
}

fn into_fragment(chunk: ChatChunk, raw: &[u8]) -> Result<Fragment, LlmError> {
    if let Some(error) = chunk.error {
        return Err(LlmError::transport(format!("Server reported error: {error}")));
    }

    match chunk.message {
        Some(message) => Ok(Fragment {
            content: message.content,
            done: chunk.done,
        }),
        None if chunk.done => Ok(Fragment {
            content: String::new(),
            done: true,
        }),
        None => Err(LlmError::decode(format!(
            "Stream fragment has no message: {}",
            String::from_utf8_lossy(raw).trim()
        ))),
    }
}

/// Incremental record splitter for streamed JSON records
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: Vec<u8>,
}

impl FragmentDecoder {
    /// Feed arbitrary bytes and drain every complete record
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Fragment>, LlmError> {
        self.buffer.extend_from_slice(bytes);
        let mut fragments = Vec::new();
        let mut consumed = 0;

        let mut records =
            serde_json::Deserializer::from_slice(&self.buffer).into_iter::<ChatChunk>();
        loop {
            match records.next() {
                Some(Ok(chunk)) => {
                    let end = records.byte_offset();
                    fragments.push(into_fragment(chunk, &self.buffer[consumed..end])?);
                    consumed = end;
                }
                // Incomplete trailing record; wait for more bytes
                Some(Err(e)) if e.is_eof() => break,
                Some(Err(e)) => return Err(decode_error(&e, &self.buffer[consumed..])),
                None => {
                    consumed = self.buffer.len();
                    break;
                }
            }
        }

        self.buffer.drain(..consumed);
        Ok(fragments)
    }

    /// Check whatever is left once the stream has ended. Only an incomplete
    /// record can remain, which is a decode error.
    pub fn finish(self) -> Result<Option<Fragment>, LlmError> {
        let rest = self.buffer.trim_ascii();
        if rest.is_empty() {
            Ok(None)
        } else {
            parse_fragment(rest).map(Some)
        }
    }
}

/// Concatenate fragment contents in arrival order until a `done` record or
/// end of stream. A missing `done` is not an error; an empty result is.
pub async fn aggregate<S, B, E>(mut stream: S) -> Result<String, LlmError>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut decoder = FragmentDecoder::default();
    let mut content = String::new();
    let mut done = false;

    'read: while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| LlmError::transport(format!("Failed to read response: {e}")))?;
        for fragment in decoder.feed(chunk.as_ref())? {
            tracing::trace!(content = %fragment.content, done = fragment.done, "Received chat fragment");
            content.push_str(&fragment.content);
            if fragment.done {
                done = true;
                break 'read;
            }
        }
    }

    if !done {
        if let Some(fragment) = decoder.finish()? {
            content.push_str(&fragment.content);
        } else {
            tracing::debug!("Chat stream ended without a done record");
        }
    }

    if content.is_empty() {
        return Err(LlmError::empty_response());
    }
    Ok(content)
}
