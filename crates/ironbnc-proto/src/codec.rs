//! Newline-delimited framing of [`Message`] for tokio transports.

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtoError;
use crate::message::Message;

/// Default maximum accepted line length, including CR LF.
pub const MAX_LINE_LENGTH: usize = 512;

/// Frames IRC lines terminated by `\n` (tolerating a preceding `\r`).
///
/// Empty lines are skipped; lines longer than the limit fail the stream,
/// which disconnects the peer rather than buffering without bound.
#[derive(Debug)]
pub struct LineCodec {
    max_length: usize,
}

impl LineCodec {
    pub fn new() -> LineCodec {
        LineCodec {
            max_length: MAX_LINE_LENGTH,
        }
    }

    pub fn with_max_length(max_length: usize) -> LineCodec {
        LineCodec { max_length }
    }
}

impl Default for LineCodec {
    fn default() -> LineCodec {
        LineCodec::new()
    }
}

impl Decoder for LineCodec {
    type Item = Message;
    type Error = ProtoError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, ProtoError> {
        loop {
            let Some(pos) = src.iter().position(|&b| b == b'\n') else {
                if src.len() > self.max_length {
                    return Err(ProtoError::LineTooLong {
                        max: self.max_length,
                    });
                }
                return Ok(None);
            };

            if pos + 1 > self.max_length {
                return Err(ProtoError::LineTooLong {
                    max: self.max_length,
                });
            }

            let line = src.split_to(pos + 1);
            let line = &line[..pos];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            let text = std::str::from_utf8(line).map_err(|_| ProtoError::InvalidUtf8)?;
            return Ok(Some(text.parse()?));
        }
    }
}

impl Encoder<Message> for LineCodec {
    type Error = ProtoError;

    fn encode(&mut self, msg: Message, dst: &mut BytesMut) -> Result<(), ProtoError> {
        let line = msg.to_string();
        dst.reserve(line.len() + 2);
        dst.put_slice(line.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}
