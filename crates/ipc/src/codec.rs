//! `Content-Length` framing, as used by LSP-style JSON-RPC endpoints.
//!
//! ```text
//! Content-Length: 52\r\n
//! \r\n
//! {"jsonrpc":"2.0","id":1,"method":"fable/compile",...}
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::CodecError;

/// Largest body accepted by default (64 MiB). Initial compiles of big
/// projects return every generated file in one response.
pub const DEFAULT_MAX_FRAME: usize = 64 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const MAX_HEADER_LEN: usize = 8 * 1024;

/// Codec that splits a byte stream into JSON bodies and back.
#[derive(Debug, Clone)]
pub struct ContentLengthCodec {
  max_frame: usize,
  /// Body length of the frame whose header was already consumed
  pending_body: Option<usize>,
}

impl ContentLengthCodec {
  pub fn new() -> Self {
    Self::with_max_frame(DEFAULT_MAX_FRAME)
  }

  pub fn with_max_frame(max_frame: usize) -> Self {
    Self {
      max_frame,
      pending_body: None,
    }
  }
}

impl Default for ContentLengthCodec {
  fn default() -> Self {
    Self::new()
  }
}

fn parse_content_length(header: &str) -> Result<usize, CodecError> {
  for line in header.split("\r\n") {
    let Some((name, value)) = line.split_once(':') else {
      continue;
    };
    if name.trim().eq_ignore_ascii_case("content-length") {
      let value = value.trim();
      return value
        .parse()
        .map_err(|_| CodecError::InvalidContentLength(value.to_string()));
    }
  }
  Err(CodecError::MissingContentLength)
}

impl Decoder for ContentLengthCodec {
  type Item = Bytes;
  type Error = CodecError;

  fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
    let body_len = match self.pending_body {
      Some(len) => len,
      None => {
        let Some(end) = src.windows(HEADER_TERMINATOR.len()).position(|w| w == HEADER_TERMINATOR) else {
          if src.len() > MAX_HEADER_LEN {
            return Err(CodecError::InvalidHeader);
          }
          return Ok(None);
        };

        let header = std::str::from_utf8(&src[..end]).map_err(|_| CodecError::InvalidHeader)?;
        let len = parse_content_length(header)?;
        if len > self.max_frame {
          return Err(CodecError::FrameTooLarge {
            size: len,
            max: self.max_frame,
          });
        }

        src.advance(end + HEADER_TERMINATOR.len());
        self.pending_body = Some(len);
        len
      }
    };

    if src.len() < body_len {
      src.reserve(body_len - src.len());
      return Ok(None);
    }

    self.pending_body = None;
    Ok(Some(src.split_to(body_len).freeze()))
  }
}

impl Encoder<String> for ContentLengthCodec {
  type Error = CodecError;

  fn encode(&mut self, body: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
    if body.len() > self.max_frame {
      return Err(CodecError::FrameTooLarge {
        size: body.len(),
        max: self.max_frame,
      });
    }

    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    dst.reserve(header.len() + body.len());
    dst.put_slice(header.as_bytes());
    dst.put_slice(body.as_bytes());
    Ok(())
  }
}
