//! Correlated request/response transport over the daemon's byte streams.
//!
//! A single multiplexer task owns both halves of the connection. Callers hand
//! it a request plus a oneshot reply channel; responses are routed back by
//! JSON-RPC id. The daemon answers strictly in order, so correlation is only
//! as safe as the caller's discipline: the compile queue guarantees that at
//! most one request is ever outstanding.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use futures::{SinkExt, StreamExt};
use ipc::{ContentLengthCodec, Incoming, Request, Response};
use tokio::{
  io::{AsyncRead, AsyncWrite},
  sync::{RwLock, mpsc, oneshot},
};
use tokio_util::{
  codec::{FramedRead, FramedWrite},
  sync::CancellationToken,
};
use tracing::{debug, error, trace, warn};

/// Connection-level faults. Never fatal to the session on their own.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
  #[error("Failed to serialize request: {0}")]
  Serialize(String),
  #[error("Failed to write to daemon: {0}")]
  Write(String),
  #[error("Failed to read from daemon: {0}")]
  Read(String),
  #[error("Failed to parse daemon message: {0}")]
  Parse(String),
  #[error("Received response for unknown request id {id:?}")]
  UnmatchedResponse { id: Option<u64> },
  #[error("Connection to daemon closed")]
  Closed,
}

/// Callback invoked for every transport fault that is not tied to a caller.
pub type ProtocolErrorHandler = Arc<dyn Fn(&TransportError) + Send + Sync>;

/// Secondary error channel shared by the session and its multiplexer.
#[derive(Clone, Default)]
pub(crate) struct ProtocolErrors {
  handler: Arc<RwLock<Option<ProtocolErrorHandler>>>,
}

impl ProtocolErrors {
  pub async fn set(&self, handler: ProtocolErrorHandler) {
    *self.handler.write().await = Some(handler);
  }

  async fn report(&self, err: TransportError) {
    warn!(error = %err, "Daemon protocol error");
    let handler = self.handler.read().await.clone();
    if let Some(handler) = handler {
      handler(&err);
    }
  }
}

type Reply = oneshot::Sender<Result<Response, TransportError>>;

struct Outbound {
  request: Request,
  reply: Reply,
}

/// Cheap-to-clone handle onto the multiplexer task.
#[derive(Clone)]
pub(crate) struct Transport {
  request_tx: mpsc::Sender<Outbound>,
  counter: Arc<AtomicU64>,
  cancel: CancellationToken,
}

impl Transport {
  pub fn spawn<R, W>(reader: R, writer: W, errors: ProtocolErrors) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
  {
    let sink = FramedWrite::new(writer, ContentLengthCodec::new());
    let stream = FramedRead::new(reader, ContentLengthCodec::new());
    let (request_tx, request_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();

    tokio::spawn(multiplexer(sink, stream, request_rx, errors, cancel.clone()));

    Self {
      request_tx,
      counter: Arc::new(AtomicU64::new(1)),
      cancel,
    }
  }

  /// Send one request and wait for the response carrying the same id.
  pub async fn call(&self, method: &str, params: Option<serde_json::Value>) -> Result<Response, TransportError> {
    let id = self.counter.fetch_add(1, Ordering::Relaxed);
    let (reply, reply_rx) = oneshot::channel();

    self
      .request_tx
      .send(Outbound {
        request: Request::new(id, method, params),
        reply,
      })
      .await
      .map_err(|_| TransportError::Closed)?;

    reply_rx.await.map_err(|_| TransportError::Closed)?
  }

  pub fn close(&self) {
    self.cancel.cancel();
  }
}

async fn multiplexer<R, W>(
  mut sink: FramedWrite<W, ContentLengthCodec>,
  mut stream: FramedRead<R, ContentLengthCodec>,
  mut request_rx: mpsc::Receiver<Outbound>,
  errors: ProtocolErrors,
  cancel: CancellationToken,
) where
  R: AsyncRead + Unpin,
  W: AsyncWrite + Unpin,
{
  let mut pending: HashMap<u64, Reply> = HashMap::new();

  loop {
    tokio::select! {
      biased;

      _ = cancel.cancelled() => {
        debug!("Transport closed");
        break;
      }

      Some(outbound) = request_rx.recv() => {
        let id = outbound.request.id;
        let json = match serde_json::to_string(&outbound.request) {
          Ok(json) => json,
          Err(e) => {
            let _ = outbound.reply.send(Err(TransportError::Serialize(e.to_string())));
            continue;
          }
        };

        trace!(id, method = %outbound.request.method, "Sending daemon request");
        pending.insert(id, outbound.reply);
        if let Err(e) = sink.send(json).await {
          error!(id, error = %e, "Failed to write daemon request");
          if let Some(reply) = pending.remove(&id) {
            let _ = reply.send(Err(TransportError::Write(e.to_string())));
          }
          break;
        }
      }

      frame = stream.next() => {
        match frame {
          Some(Ok(body)) => match serde_json::from_slice::<Incoming>(&body) {
            Ok(Incoming::Notification(notification)) => {
              debug!(method = %notification.method, "Ignoring daemon notification");
            }
            Ok(Incoming::Response(response)) => match response.id.and_then(|id| pending.remove(&id)) {
              Some(reply) => {
                trace!(id = ?response.id, "Received daemon response");
                let _ = reply.send(Ok(response));
              }
              None => errors.report(TransportError::UnmatchedResponse { id: response.id }).await,
            },
            Err(e) => errors.report(TransportError::Parse(e.to_string())).await,
          },
          Some(Err(e)) => {
            errors.report(TransportError::Read(e.to_string())).await;
            break;
          }
          None => {
            debug!("Daemon closed its output stream");
            break;
          }
        }
      }
    }
  }

  for (_, reply) in pending.drain() {
    let _ = reply.send(Err(TransportError::Closed));
  }

  debug!("Transport multiplexer exited");
}
