//! CompileQueue - single-worker FIFO for everything that talks to the daemon
//!
//! The daemon connection cannot correlate overlapping requests, so every
//! compile sequence goes through this queue. One worker pops the head, runs
//! it to completion, settles its result and only then looks at the next job.
//! A failing (or panicking) job settles only its own result.

use std::{
  future::Future,
  panic::AssertUnwindSafe,
  pin::Pin,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
  task::{Context, Poll},
};

use futures::FutureExt;
use tokio::{
  sync::{mpsc, oneshot},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

struct QueuedJob {
  seq: u64,
  label: &'static str,
  job: Job,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
  #[error("Compile queue has shut down")]
  Closed,
  #[error("Compile task ended without a result")]
  TaskDropped,
}

/// Cheap-to-clone handle onto the queue worker.
#[derive(Clone)]
pub struct CompileQueue {
  tx: mpsc::UnboundedSender<QueuedJob>,
  seq: Arc<AtomicU64>,
}

impl CompileQueue {
  pub fn spawn(cancel: CancellationToken) -> (Self, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let queue = Self {
      tx,
      seq: Arc::new(AtomicU64::new(0)),
    };
    (queue, tokio::spawn(worker(rx, cancel)))
  }

  /// Append a job. The job is queued before this returns, so submission
  /// order is the order of `enqueue` calls, not of awaits on the results.
  pub fn enqueue<F, T>(&self, label: &'static str, fut: F) -> PendingResult<T>
  where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
  {
    let seq = self.seq.fetch_add(1, Ordering::Relaxed);
    let (result_tx, result_rx) = oneshot::channel();
    let job = Box::pin(async move {
      let _ = result_tx.send(fut.await);
    });

    match self.tx.send(QueuedJob { seq, label, job }) {
      Ok(()) => PendingResult { rx: Some(result_rx) },
      Err(_) => PendingResult { rx: None },
    }
  }

  pub fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }
}

/// Deferred result of one queued job.
pub struct PendingResult<T> {
  rx: Option<oneshot::Receiver<T>>,
}

impl<T> Future for PendingResult<T> {
  type Output = Result<T, QueueError>;

  fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    match self.rx.as_mut() {
      Some(rx) => Pin::new(rx).poll(cx).map(|r| r.map_err(|_| QueueError::TaskDropped)),
      None => Poll::Ready(Err(QueueError::Closed)),
    }
  }
}

async fn worker(mut rx: mpsc::UnboundedReceiver<QueuedJob>, cancel: CancellationToken) {
  info!("Compile queue started");

  loop {
    let queued = tokio::select! {
      biased;

      _ = cancel.cancelled() => break,

      queued = rx.recv() => match queued {
        Some(queued) => queued,
        None => break,
      },
    };

    debug!(seq = queued.seq, task = queued.label, "Compile task started");
    // In-flight jobs are never interrupted
    match AssertUnwindSafe(queued.job).catch_unwind().await {
      Ok(()) => debug!(seq = queued.seq, task = queued.label, "Compile task settled"),
      Err(_) => error!(seq = queued.seq, task = queued.label, "Compile task panicked"),
    }
  }

  rx.close();
  let mut dropped = 0usize;
  while rx.try_recv().is_ok() {
    dropped += 1;
  }
  if dropped > 0 {
    debug!(dropped, "Discarded queued compile tasks on shutdown");
  }

  info!("Compile queue stopped");
}
