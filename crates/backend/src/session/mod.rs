//! Daemon session: owns the external compiler process and its transport.
//!
//! ```text
//! NotStarted ──start()──▶ Starting ──▶ Ready ──stop()──▶ Stopped
//!      │                     │
//!      └──────stop()─────────┴──(launch failure)──────▶ Stopped
//! ```
//!
//! Requests issued while the session is not `Ready` fail immediately.

mod transport;

use std::{path::PathBuf, process::Stdio};

use ipc::{DaemonRequest, IpcError, UnionResult};
use tokio::{
  io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader},
  process::{Child, ChildStderr, Command},
  sync::Mutex,
};
use tracing::{debug, error, info};
pub use transport::{ProtocolErrorHandler, TransportError};
use transport::{ProtocolErrors, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  NotStarted,
  Starting,
  Ready,
  Stopped,
}

impl SessionState {
  pub fn as_str(&self) -> &'static str {
    match self {
      SessionState::NotStarted => "not started",
      SessionState::Starting => "starting",
      SessionState::Ready => "ready",
      SessionState::Stopped => "stopped",
    }
  }
}

impl std::fmt::Display for SessionState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How to launch the daemon. Locating the binary is the caller's job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonCommand {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
  #[error("Failed to launch daemon `{program}`: {source}")]
  Launch {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("Daemon session is {0}, not ready")]
  NotReady(SessionState),
  #[error("Daemon session was already started")]
  AlreadyStarted,
  #[error(transparent)]
  Transport(#[from] TransportError),
  #[error("Daemon RPC error {code}: {message}")]
  Rpc { code: i32, message: String },
  #[error(transparent)]
  Protocol(#[from] IpcError),
  /// The daemon answered with its failure case
  #[error("Compilation failed: {0}")]
  CompileFailure(String),
}

struct Inner {
  state: SessionState,
  transport: Option<Transport>,
  child: Option<Child>,
}

/// Handle onto the long-lived compiler daemon.
pub struct DaemonSession {
  command: Option<DaemonCommand>,
  inner: Mutex<Inner>,
  errors: ProtocolErrors,
}

impl DaemonSession {
  /// Create a session that will launch `command` on `start()`.
  pub fn new(command: DaemonCommand) -> Self {
    Self {
      command: Some(command),
      inner: Mutex::new(Inner {
        state: SessionState::NotStarted,
        transport: None,
        child: None,
      }),
      errors: ProtocolErrors::default(),
    }
  }

  /// Create a session over already-connected streams. The session is `Ready`
  /// immediately and owns no process.
  pub fn attach<R, W>(reader: R, writer: W) -> Self
  where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
  {
    let errors = ProtocolErrors::default();
    let transport = Transport::spawn(reader, writer, errors.clone());
    Self {
      command: None,
      inner: Mutex::new(Inner {
        state: SessionState::Ready,
        transport: Some(transport),
        child: None,
      }),
      errors,
    }
  }

  pub async fn state(&self) -> SessionState {
    self.inner.lock().await.state
  }

  /// Launch the daemon and wire the transport to its stdin/stdout.
  ///
  /// A launch failure moves the session straight to `Stopped`; it is not retried.
  pub async fn start(&self) -> Result<(), SessionError> {
    let mut inner = self.inner.lock().await;
    if inner.state != SessionState::NotStarted {
      return Err(SessionError::AlreadyStarted);
    }
    let Some(command) = &self.command else {
      return Err(SessionError::AlreadyStarted);
    };

    inner.state = SessionState::Starting;
    info!(program = %command.program, args = ?command.args, "Starting daemon");

    let mut cmd = Command::new(&command.program);
    cmd
      .args(&command.args)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    if let Some(cwd) = &command.cwd {
      cmd.current_dir(cwd);
    }

    let launch_failed = |source: std::io::Error| SessionError::Launch {
      program: command.program.clone(),
      source,
    };

    let mut child = match cmd.spawn() {
      Ok(child) => child,
      Err(e) => {
        error!(program = %command.program, err = %e, "Failed to spawn daemon process");
        inner.state = SessionState::Stopped;
        return Err(launch_failed(e));
      }
    };

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
      inner.state = SessionState::Stopped;
      let _ = child.start_kill();
      return Err(launch_failed(std::io::Error::other("daemon stdio not piped")));
    };
    if let Some(stderr) = child.stderr.take() {
      tokio::spawn(forward_stderr(stderr));
    }

    inner.transport = Some(Transport::spawn(stdout, stdin, self.errors.clone()));
    inner.child = Some(child);
    inner.state = SessionState::Ready;
    info!("Daemon ready");
    Ok(())
  }

  /// Register the handler for transport faults that no caller is waiting on,
  /// such as a response whose id matches no outstanding request.
  pub async fn on_protocol_error<F>(&self, handler: F)
  where
    F: Fn(&TransportError) + Send + Sync + 'static,
  {
    self.errors.set(std::sync::Arc::new(handler)).await;
  }

  /// Send a raw request. Resolves with the fields of the daemon's success
  /// case, or fails with `CompileFailure` carrying the daemon's message.
  pub async fn request(
    &self,
    method: &str,
    params: Option<serde_json::Value>,
  ) -> Result<Vec<serde_json::Value>, SessionError> {
    let transport = {
      let inner = self.inner.lock().await;
      match (&inner.transport, inner.state) {
        (Some(transport), SessionState::Ready) => transport.clone(),
        (_, state) => return Err(SessionError::NotReady(state)),
      }
    };

    debug!(method, "Daemon request");
    let response = transport.call(method, params).await?;
    if let Some(err) = response.error {
      return Err(SessionError::Rpc {
        code: err.code,
        message: err.message,
      });
    }

    let result = response.result.ok_or(IpcError::NoResult)?;
    let union: UnionResult = serde_json::from_value(result).map_err(IpcError::from)?;
    union.into_result().map_err(SessionError::CompileFailure)
  }

  /// Send a typed request and decode its success payload.
  pub async fn call<R: DaemonRequest>(&self, request: &R) -> Result<R::Response, SessionError> {
    let fields = self.request(R::METHOD.as_str(), request.params()?).await?;
    Ok(R::decode(fields)?)
  }

  /// Terminate the daemon and release the transport. Safe to call repeatedly
  /// and on sessions that never started.
  pub async fn stop(&self) {
    let (transport, child) = {
      let mut inner = self.inner.lock().await;
      if inner.state == SessionState::Stopped {
        return;
      }
      inner.state = SessionState::Stopped;
      (inner.transport.take(), inner.child.take())
    };

    if let Some(transport) = transport {
      transport.close();
    }

    if let Some(mut child) = child {
      if let Err(e) = child.start_kill() {
        debug!(err = %e, "Daemon process already exited");
      }
      match child.wait().await {
        Ok(status) => info!(status = %status, "Daemon stopped"),
        Err(e) => debug!(err = %e, "Failed to reap daemon process"),
      }
    }
  }
}

async fn forward_stderr(stderr: ChildStderr) {
  let mut lines = BufReader::new(stderr).lines();
  while let Ok(Some(line)) = lines.next_line().await {
    debug!(target: "fable_daemon", "{line}");
  }
}
