//! Handle for feeding change events into the aggregator.
//!
//! Cheap to clone; every clone feeds the same debounce window.

use tokio::sync::mpsc;

use super::message::ChangeEvent;

#[derive(Clone, Debug)]
pub struct AggregatorHandle {
  tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl AggregatorHandle {
  pub fn new(tx: mpsc::UnboundedSender<ChangeEvent>) -> Self {
    Self { tx }
  }

  /// Queue an event. Never blocks: events raised while a compile is
  /// running must not be dropped.
  pub fn send(&self, event: ChangeEvent) -> Result<(), SendError> {
    self.tx.send(event).map_err(|_| SendError::ActorGone)
  }

  pub fn project_changed(&self, path: impl AsRef<str>) -> Result<(), SendError> {
    self.send(ChangeEvent::project_changed(path))
  }

  pub fn file_changed(&self, path: impl AsRef<str>) -> Result<(), SendError> {
    self.send(ChangeEvent::file_changed(path))
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }
}

/// Error when sending to an actor
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
  #[error("Actor has shut down")]
  ActorGone,
}
