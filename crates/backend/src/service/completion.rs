//! Single-slot rendez-vous between the batch settle loop and hot-update callers.
//!
//! Callers that arrive while no cell exists create one; everyone arriving
//! before the next batch settles shares it. Fulfilling the cell wakes all of
//! them with the same value and empties the slot, so the next trigger starts
//! a fresh cell.

use futures::{FutureExt, future::Shared};
use tokio::sync::{Mutex, oneshot};

pub type CompletionWaiter<T> = Shared<oneshot::Receiver<T>>;

struct Slot<T> {
  tx: oneshot::Sender<T>,
  rx: CompletionWaiter<T>,
}

pub struct CompletionCell<T: Clone> {
  slot: Mutex<Option<Slot<T>>>,
}

impl<T: Clone> Default for CompletionCell<T> {
  fn default() -> Self {
    Self { slot: Mutex::new(None) }
  }
}

impl<T: Clone> CompletionCell<T> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Join the pending cell, creating it if there is none.
  pub async fn get_or_create(&self) -> CompletionWaiter<T> {
    let mut slot = self.slot.lock().await;
    match slot.as_ref() {
      Some(existing) => existing.rx.clone(),
      None => {
        let (tx, rx) = oneshot::channel();
        let rx = rx.shared();
        *slot = Some(Slot { tx, rx: rx.clone() });
        rx
      }
    }
  }

  /// Resolve the current cell, if any. Returns false when no cell was pending.
  pub async fn fulfill(&self, value: T) -> bool {
    match self.slot.lock().await.take() {
      Some(slot) => slot.tx.send(value).is_ok(),
      None => false,
    }
  }

  pub async fn is_pending(&self) -> bool {
    self.slot.lock().await.is_some()
  }
}
