//! Post-compile JSX pass.
//!
//! The daemon may emit JSX that the host does not understand. When a JSX
//! mode is configured, looked-up code is piped through a [`JsxTransform`]
//! before it is handed to the host.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::{error, trace};

use crate::domain::config::{CommandConfig, JsxMode};

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
  #[error("Failed to run JSX transform {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },
  #[error("JSX transform I/O failed: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSX transform exited with code {code} for {id}: {stderr}")]
  Failed { id: String, code: i32, stderr: String },
  #[error("JSX transform produced invalid UTF-8 for {0}")]
  Utf8(String),
}

/// String-to-string transform applied to generated code.
#[async_trait]
pub trait JsxTransform: Send + Sync {
  async fn transform(&self, code: String, id: &str, mode: JsxMode) -> Result<String, TransformError>;
}

/// Runs an external program, writing code to its stdin and reading the
/// result from stdout. `{mode}` in any argument is replaced by the JSX mode.
pub struct CommandJsxTransform {
  command: CommandConfig,
}

impl CommandJsxTransform {
  pub fn new(command: CommandConfig) -> Self {
    Self { command }
  }

  fn args(&self, mode: JsxMode) -> Vec<String> {
    self
      .command
      .args
      .iter()
      .map(|arg| arg.replace("{mode}", mode.as_str()))
      .collect()
  }
}

#[async_trait]
impl JsxTransform for CommandJsxTransform {
  async fn transform(&self, code: String, id: &str, mode: JsxMode) -> Result<String, TransformError> {
    let program = &self.command.program;
    trace!(program = %program, id, mode = %mode, "Running JSX transform");

    let mut child = Command::new(program)
      .args(self.args(mode))
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true)
      .spawn()
      .map_err(|source| TransformError::Spawn {
        program: program.clone(),
        source,
      })?;

    // Feed stdin concurrently so a chatty child cannot deadlock on a full pipe
    let stdin = child.stdin.take();
    let writer = tokio::spawn(async move {
      if let Some(mut stdin) = stdin {
        stdin.write_all(code.as_bytes()).await?;
        stdin.shutdown().await?;
      }
      Ok::<_, std::io::Error>(())
    });

    let output = child.wait_with_output().await?;
    let written = writer.await;

    if !output.status.success() {
      let code = output.status.code().unwrap_or(-1);
      let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
      error!(program = %program, id, code, "JSX transform failed");
      return Err(TransformError::Failed {
        id: id.to_string(),
        code,
        stderr,
      });
    }

    match written {
      Ok(result) => result?,
      Err(e) => return Err(std::io::Error::other(e).into()),
    }

    String::from_utf8(output.stdout).map_err(|_| TransformError::Utf8(id.to_string()))
  }
}
