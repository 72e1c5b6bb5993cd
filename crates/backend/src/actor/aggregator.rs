//! ChangeAggregator - coalesces bursts of change events into batches
//!
//! A single save can fire several notifications and a checkout can touch many
//! files at once. The aggregator buffers every event seen during one window
//! and emits at most one `PendingChangeBatch` per window.
//!
//! The window is driven by an interval ticker. The first event arriving into
//! an empty accumulator resets the ticker, so a window is always measured
//! from its first event. Idle windows emit nothing.

use std::time::Duration;

use tokio::{
  sync::mpsc,
  task::JoinHandle,
  time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::{
  handle::AggregatorHandle,
  message::{ChangeEvent, PendingChangeBatch},
};

pub const DEFAULT_WINDOW: Duration = Duration::from_millis(50);

pub struct ChangeAggregator {
  window: Duration,
  events_rx: mpsc::UnboundedReceiver<ChangeEvent>,
  batches_tx: mpsc::UnboundedSender<PendingChangeBatch>,
  cancel: CancellationToken,
}

impl ChangeAggregator {
  pub fn new(
    window: Duration,
    batches_tx: mpsc::UnboundedSender<PendingChangeBatch>,
    cancel: CancellationToken,
  ) -> (Self, AggregatorHandle) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    // tokio intervals cannot have a zero period
    let window = window.max(Duration::from_millis(1));
    let aggregator = Self {
      window,
      events_rx,
      batches_tx,
      cancel,
    };
    (aggregator, AggregatorHandle::new(events_tx))
  }

  pub fn spawn(
    window: Duration,
    batches_tx: mpsc::UnboundedSender<PendingChangeBatch>,
    cancel: CancellationToken,
  ) -> (AggregatorHandle, JoinHandle<()>) {
    let (aggregator, handle) = Self::new(window, batches_tx, cancel);
    (handle, tokio::spawn(aggregator.run()))
  }

  pub async fn run(mut self) {
    info!(window_ms = self.window.as_millis() as u64, "ChangeAggregator started");

    let mut pending = PendingChangeBatch::default();
    let mut ticker = interval(self.window);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
      tokio::select! {
        biased;

        _ = self.cancel.cancelled() => {
          if !pending.is_empty() {
            debug!(
              project_changed = pending.project_changed,
              files = pending.fsharp_files.len(),
              "Dropping pending changes on shutdown"
            );
          }
          break;
        }

        event = self.events_rx.recv() => match event {
          Some(event) => {
            trace!(?event, "Change event");
            if pending.is_empty() {
              ticker.reset();
            }
            pending.apply(event);
          }
          None => {
            self.flush(&mut pending);
            debug!("All aggregator handles dropped");
            break;
          }
        },

        _ = ticker.tick() => {
          if !self.flush(&mut pending) {
            break;
          }
        }
      }
    }

    info!("ChangeAggregator stopped");
  }

  /// Emit the accumulated batch if there is one. Returns false once nobody
  /// is listening for batches anymore.
  fn flush(&self, pending: &mut PendingChangeBatch) -> bool {
    if pending.is_empty() {
      return true;
    }

    let batch = std::mem::take(pending);
    debug!(
      project_changed = batch.project_changed,
      files = batch.fsharp_files.len(),
      "Emitting change batch"
    );
    self.batches_tx.send(batch).is_ok()
  }
}
