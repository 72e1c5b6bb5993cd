use thiserror::Error;

#[derive(Debug, Error)]
pub enum IpcError {
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("No result in response")]
  NoResult,

  #[error("Missing field {index} ({name}) in {method} result")]
  MissingField {
    method: &'static str,
    index: usize,
    name: &'static str,
  },
}

/// Errors raised while framing bytes on the daemon's streams.
#[derive(Debug, Error)]
pub enum CodecError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  #[error("Message header is not valid UTF-8")]
  InvalidHeader,

  #[error("Message header has no Content-Length")]
  MissingContentLength,

  #[error("Invalid Content-Length value: {0}")]
  InvalidContentLength(String),

  #[error("Frame of {size} bytes exceeds the {max} byte limit")]
  FrameTooLarge { size: usize, max: usize },
}
