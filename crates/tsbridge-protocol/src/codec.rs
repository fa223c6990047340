//! Framing codecs for the tsserver channel
//!
//! Two interchangeable framings exist. Over stdio, tsserver *emits*
//! HTTP-style `Content-Length` frames but *consumes* newline-terminated
//! JSON, so [`StdioCodec`] decodes length-prefixed frames and encodes
//! line-delimited ones. Over the node-IPC channel (`--useNodeIpc`), both
//! directions are discrete newline-delimited JSON messages, handled by
//! [`NodeIpcCodec`].
//!
//! Both decoders are resumable: a partial read leaves the buffer untouched
//! and decoding picks up where it left off on the next fill. Channel
//! closure mid-frame is reported by the framed stream ending, never by
//! dropping bytes.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::ProtocolError;
use crate::message::Message;

const CONTENT_LENGTH: &str = "content-length:";

/// Headers past this size mean the stream is not speaking the protocol.
const MAX_HEADER_BYTES: usize = 4 * 1024;

/// Length-prefixed reader, newline writer. The stdio framing.
#[derive(Debug, Default)]
pub struct StdioCodec {
    state: DecodeState,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
enum DecodeState {
    /// Scanning for a complete header block terminated by a blank line.
    #[default]
    Header,
    /// Header consumed; waiting for `len` body bytes.
    Body { len: usize },
}

impl StdioCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the header block in `src[..end]`, returning the declared body
    /// length. The block is only consumed by the caller once this succeeds.
    fn parse_headers(block: &[u8]) -> Result<usize, ProtocolError> {
        let text = std::str::from_utf8(block)
            .map_err(|_| ProtocolError::MalformedHeader(String::from_utf8_lossy(block).into()))?;
        for line in text.split("\r\n") {
            let Some(rest) = strip_prefix_ignore_case(line, CONTENT_LENGTH) else {
                continue;
            };
            return rest
                .trim()
                .parse::<usize>()
                .map_err(|_| ProtocolError::MalformedHeader(line.to_string()));
        }
        Err(ProtocolError::MalformedHeader(text.to_string()))
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len() && line[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

/// Byte index one past the `\r\n\r\n` terminator, if present.
fn find_header_end(src: &[u8]) -> Option<usize> {
    src.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

impl Decoder for StdioCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        loop {
            match self.state {
                DecodeState::Header => {
                    let Some(end) = find_header_end(src) else {
                        if src.len() > MAX_HEADER_BYTES {
                            return Err(ProtocolError::HeaderOverrun {
                                limit: MAX_HEADER_BYTES,
                            });
                        }
                        return Ok(None);
                    };
                    let len = Self::parse_headers(&src[..end - 4])?;
                    src.advance(end);
                    self.state = DecodeState::Body { len };
                }
                DecodeState::Body { len } => {
                    if src.len() < len {
                        // Truncated body: keep reading.
                        src.reserve(len - src.len());
                        return Ok(None);
                    }
                    let body = src.split_to(len);
                    self.state = DecodeState::Header;
                    trace!(bytes = len, "decoded tsserver frame");
                    return Ok(Some(serde_json::from_slice(&body)?));
                }
            }
        }
    }
}

impl Encoder<Message> for StdioCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let serialized = serde_json::to_vec(&message)?;
        dst.reserve(serialized.len() + 2);
        dst.extend_from_slice(&serialized);
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// Discrete newline-delimited JSON messages, both directions. Used when the
/// server runs with `--useNodeIpc`.
#[derive(Debug, Default)]
pub struct NodeIpcCodec;

impl NodeIpcCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for NodeIpcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtocolError> {
        let Some(newline) = src.iter().position(|&b| b == b'\n') else {
            return Ok(None);
        };
        let line = src.split_to(newline + 1);
        let trimmed = &line[..newline];
        if trimmed.is_empty() {
            return self.decode(src);
        }
        Ok(Some(serde_json::from_slice(trimmed)?))
    }
}

impl Encoder<Message> for NodeIpcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let serialized = serde_json::to_vec(&message)?;
        dst.reserve(serialized.len() + 1);
        dst.extend_from_slice(&serialized);
        dst.extend_from_slice(b"\n");
        Ok(())
    }
}
