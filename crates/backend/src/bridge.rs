//! The bridge session object.
//!
//! One `Bridge` is owned by one host integration. It is constructed on
//! activation, torn down by [`Bridge::shutdown`] and holds every piece of
//! mutable state the pipeline needs; there are no globals.
//!
//! # Watch mode
//!
//! ```text
//! watch_change / handle_hot_update
//!        │ ChangeEvent
//!        ▼
//!  ChangeAggregator ──batch──▶ dispatcher ──enqueue──▶ CompileQueue ──▶ Recompiler
//!                                  │                                      │
//!                                  └──PendingResult──▶ settle loop ◀──────┘
//!                                                          │
//!                                          CompletionCell::fulfill(diagnostics)
//! ```
//!
//! The dispatcher enqueues every batch the moment it arrives, so batches
//! that close while a compile is running wait at the tail of the queue. The
//! settle loop awaits results in submission order and hands each one to
//! whoever is waiting on the completion cell.
//!
//! # Build mode
//!
//! [`Bridge::build`] runs a single full compile straight through the queue.

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use ipc::Diagnostic;
use tokio::{
  sync::{Mutex, mpsc},
  task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
  actor::{
    ChangeAggregator, CompileQueue, PendingResult, QueueError,
    handle::{AggregatorHandle, SendError},
    message::{CompileTask, PendingChangeBatch},
  },
  domain::{
    config::{BridgeConfig, CommandConfig, ConfigError, JsxMode},
    project::ProjectDescriptor,
  },
  paths::normalize_path,
  service::{
    cache::ArtifactCache,
    compile::{Compiler, Recompiler},
    completion::{CompletionCell, CompletionWaiter},
    diagnostics::{first_error, make_hot_error},
    hash_gate::{GateDecision, HashGate},
    host::{BuildHost, HotModule, importable_modules},
    transform::{CommandJsxTransform, JsxTransform, TransformError},
  },
  session::SessionError,
};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
  #[error("Bridge is already watching")]
  AlreadyStarted,
  #[error("Bridge has been shut down")]
  Stopped,
  #[error(transparent)]
  Queue(#[from] QueueError),
  #[error(transparent)]
  Send(#[from] SendError),
  #[error(transparent)]
  Session(#[from] SessionError),
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
  pub project: ProjectDescriptor,
  /// Change-aggregation window
  pub debounce: Duration,
  pub jsx: Option<JsxMode>,
  pub jsx_command: CommandConfig,
}

impl BridgeOptions {
  pub fn from_config(config: &BridgeConfig, project_dir: &Path) -> Result<Self, ConfigError> {
    Ok(Self {
      project: config.project_descriptor(project_dir)?,
      debounce: config.debounce(),
      jsx: config.jsx,
      jsx_command: config.jsx_command.clone(),
    })
  }
}

type CompileOutcome = Result<Vec<Diagnostic>, SessionError>;

/// Background tasks of a started bridge.
struct Pipeline {
  queue: CompileQueue,
  /// Present only in watch mode
  events: Option<AggregatorHandle>,
  tasks: Vec<JoinHandle<()>>,
}

pub struct Bridge {
  fsproj: String,
  debounce: Duration,
  compiler: Arc<dyn Compiler>,
  host: Arc<dyn BuildHost>,
  cache: ArtifactCache,
  recompiler: Recompiler,
  gate: HashGate,
  completion: Arc<CompletionCell<Vec<Diagnostic>>>,
  jsx: Option<(JsxMode, Arc<dyn JsxTransform>)>,
  pipeline: Mutex<Option<Pipeline>>,
  cancel: CancellationToken,
}

impl Bridge {
  pub fn new(options: BridgeOptions, compiler: Arc<dyn Compiler>, host: Arc<dyn BuildHost>) -> Self {
    let cache = ArtifactCache::new();
    let fsproj = options.project.fsproj.clone();
    let recompiler = Recompiler::new(compiler.clone(), cache.clone(), host.clone(), options.project);
    let jsx = options.jsx.map(|mode| {
      let transform: Arc<dyn JsxTransform> = Arc::new(CommandJsxTransform::new(options.jsx_command));
      (mode, transform)
    });

    Self {
      fsproj,
      debounce: options.debounce,
      compiler,
      host,
      cache,
      recompiler,
      gate: HashGate::new(),
      completion: Arc::new(CompletionCell::new()),
      jsx,
      pipeline: Mutex::new(None),
      cancel: CancellationToken::new(),
    }
  }

  /// Replace the JSX pass. Has no effect unless a JSX mode is configured.
  pub fn with_jsx_transform(mut self, transform: Arc<dyn JsxTransform>) -> Self {
    if let Some((mode, _)) = self.jsx.take() {
      self.jsx = Some((mode, transform));
    }
    self
  }

  pub fn cache(&self) -> &ArtifactCache {
    &self.cache
  }

  pub fn fsproj(&self) -> &str {
    &self.fsproj
  }

  fn spawn_queue(&self) -> (CompileQueue, JoinHandle<()>) {
    CompileQueue::spawn(self.cancel.child_token())
  }

  /// Start watch mode and run the initial full compile through the
  /// aggregator. Returns once that compile has settled.
  pub async fn start_watch(&self) -> Result<(), BridgeError> {
    let events = {
      let mut pipeline = self.pipeline.lock().await;
      if self.cancel.is_cancelled() {
        return Err(BridgeError::Stopped);
      }
      if pipeline.as_ref().is_some_and(|p| p.events.is_some()) {
        return Err(BridgeError::AlreadyStarted);
      }

      // Reuse the queue of an earlier build so ordering stays global
      let (queue, mut tasks) = match pipeline.take() {
        Some(existing) => (existing.queue, existing.tasks),
        None => {
          let (queue, task) = self.spawn_queue();
          (queue, vec![task])
        }
      };

      let (batches_tx, batches_rx) = mpsc::unbounded_channel();
      let (settle_tx, settle_rx) = mpsc::unbounded_channel();
      let (events, aggregator_task) = ChangeAggregator::spawn(self.debounce, batches_tx, self.cancel.child_token());

      let dispatcher_task = tokio::spawn(dispatch(
        batches_rx,
        queue.clone(),
        self.recompiler.clone(),
        settle_tx,
        self.cancel.clone(),
      ));
      let settle_task = tokio::spawn(settle(settle_rx, self.completion.clone(), self.cancel.clone()));

      tasks.extend([aggregator_task, dispatcher_task, settle_task]);
      *pipeline = Some(Pipeline {
        queue,
        events: Some(events.clone()),
        tasks,
      });
      events
    };

    info!(fsproj = %self.fsproj, "Initial project compile");
    let waiter = self.completion.get_or_create().await;
    events.project_changed(&self.fsproj)?;
    if self.wait_settled(waiter).await.is_none() {
      return Err(BridgeError::Stopped);
    }
    info!(fsproj = %self.fsproj, "Initial project compile settled");
    Ok(())
  }

  /// One-shot full compile, bypassing the aggregator. Unlike watch mode the
  /// failure is returned so the caller can exit with an error.
  pub async fn build(&self) -> Result<Vec<Diagnostic>, BridgeError> {
    let queue = {
      let mut pipeline = self.pipeline.lock().await;
      if self.cancel.is_cancelled() {
        return Err(BridgeError::Stopped);
      }
      match pipeline.as_ref() {
        Some(existing) => existing.queue.clone(),
        None => {
          let (queue, task) = self.spawn_queue();
          *pipeline = Some(Pipeline {
            queue: queue.clone(),
            events: None,
            tasks: vec![task],
          });
          queue
        }
      }
    };

    let recompiler = self.recompiler.clone();
    let changed = BTreeSet::from([self.fsproj.clone()]);
    let outcome = queue
      .enqueue("build", async move { recompiler.full(&changed).await })
      .await?;

    outcome.map_err(|e| {
      error!(critical = true, fsproj = %self.fsproj, error = %e, "Build failed");
      BridgeError::Session(e)
    })
  }

  /// Wait for the next settled batch. `None` once the bridge shuts down,
  /// since a cell created after the final fulfill would never resolve.
  async fn wait_settled(&self, waiter: CompletionWaiter<Vec<Diagnostic>>) -> Option<Vec<Diagnostic>> {
    tokio::select! {
      diagnostics = waiter => Some(diagnostics.unwrap_or_default()),
      _ = self.cancel.cancelled() => None,
    }
  }

  async fn events(&self) -> Option<AggregatorHandle> {
    self.pipeline.lock().await.as_ref().and_then(|p| p.events.clone())
  }

  /// Route a raw watcher change. Dependent files force a full recompile once
  /// a project is loaded. Returns whether the change was routed.
  pub async fn watch_change(&self, path: &str) -> bool {
    let path = normalize_path(path);
    if !self.cache.has_sources().await || !self.cache.is_dependent_file(&path).await {
      return false;
    }

    let Some(events) = self.events().await else {
      return false;
    };
    match events.project_changed(&path) {
      Ok(()) => {
        debug!(file = %path, "Dependent file changed");
        true
      }
      Err(e) => {
        warn!(file = %path, error = %e, "Could not queue project change");
        false
      }
    }
  }

  /// Handle a hot-update trigger for `file`.
  ///
  /// `None` means the file is not ours and the host should fall back to its
  /// default handling. Otherwise the returned list is what to hot-replace:
  /// empty when a blocking error was sent, else `modules` minus the ones
  /// nobody imports.
  pub async fn handle_hot_update<M: HotModule>(&self, file: &str, modules: Vec<M>) -> Option<Vec<M>> {
    let file = normalize_path(file);
    if !self.cache.contains(&file).await {
      return None;
    }

    let events = self.events().await?;

    if self.gate.check(&file).await == GateDecision::Unchanged {
      debug!(file = %file, "Content unchanged, skipping recompile");
      return Some(importable_modules(modules));
    }

    debug!(file = %file, "Hot update started");
    // Join the shared cell before the event can possibly settle
    let waiter = self.completion.get_or_create().await;
    if let Err(e) = events.file_changed(&file) {
      warn!(file = %file, error = %e, "Could not queue file change");
      // Nothing compiles these bytes, so the next trigger must not be gated
      self.gate.forget(&file).await;
      return None;
    }
    let Some(diagnostics) = self.wait_settled(waiter).await else {
      debug!(file = %file, "Hot update abandoned on shutdown");
      self.gate.forget(&file).await;
      return None;
    };
    debug!(file = %file, diagnostics = diagnostics.len(), "Hot update finished");

    if let Some(diagnostic) = first_error(&diagnostics) {
      let payload = make_hot_error(diagnostic).await;
      self.host.send_hot_error(payload);
      return Some(Vec::new());
    }

    Some(importable_modules(modules))
  }

  /// Compiled code for `id`, passed through the JSX pass when configured.
  /// `Ok(None)` means the file is not compiled (yet).
  pub async fn transform(&self, id: &str) -> Result<Option<String>, TransformError> {
    let Some(code) = self.cache.lookup(id).await else {
      return Ok(None);
    };

    match &self.jsx {
      Some((mode, transform)) => transform.transform(code, id, *mode).await.map(Some),
      None => Ok(Some(code)),
    }
  }

  /// Write every artifact under `out_dir`, mirroring its path relative to
  /// `root` with a `.js` extension.
  pub async fn emit(&self, root: &Path, out_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let root = normalize_path(root.to_string_lossy());
    let mut written = Vec::new();

    for (file, code) in self.cache.artifacts().await {
      let target = out_dir.join(output_relative_path(&root, &file));
      if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
      }
      tokio::fs::write(&target, code).await?;
      debug!(file = %file, target = %target.display(), "Artifact written");
      written.push(target);
    }

    info!(count = written.len(), out_dir = %out_dir.display(), "Artifacts written");
    Ok(written)
  }

  /// Stop every task and the compiler. Safe to call repeatedly and on a
  /// bridge that never started.
  pub async fn shutdown(&self) {
    let pipeline = {
      let mut pipeline = self.pipeline.lock().await;
      if self.cancel.is_cancelled() {
        return;
      }
      self.cancel.cancel();
      pipeline.take()
    };

    info!(fsproj = %self.fsproj, "Shutting down bridge");
    // Fails any in-flight request so the queue worker can exit
    self.compiler.shutdown().await;
    // Release hot-update callers still waiting
    self.completion.fulfill(Vec::new()).await;

    if let Some(pipeline) = pipeline {
      drop(pipeline.events);
      drop(pipeline.queue);
      for task in pipeline.tasks {
        if let Err(e) = task.await {
          warn!(error = %e, "Bridge task ended abnormally");
        }
      }
    }
    // A cell created after the first release has no settle loop left to resolve it
    self.completion.fulfill(Vec::new()).await;
    debug!("Bridge shut down");
  }
}

fn output_relative_path(root: &str, file: &str) -> PathBuf {
  let prefix = format!("{}/", root.trim_end_matches('/'));
  let relative = file.strip_prefix(prefix.as_str()).unwrap_or(file).trim_start_matches('/');
  // Drive prefixes like `C:` cannot appear inside the output tree
  let relative = relative.replace(':', "");
  PathBuf::from(relative).with_extension("js")
}

async fn dispatch(
  mut batches_rx: mpsc::UnboundedReceiver<PendingChangeBatch>,
  queue: CompileQueue,
  recompiler: Recompiler,
  settle_tx: mpsc::UnboundedSender<(CompileTask, PendingResult<CompileOutcome>)>,
  cancel: CancellationToken,
) {
  loop {
    let batch = tokio::select! {
      biased;

      _ = cancel.cancelled() => break,

      batch = batches_rx.recv() => match batch {
        Some(batch) => batch,
        None => break,
      },
    };

    let Some(task) = batch.into_task() else {
      continue;
    };

    let recompiler = recompiler.clone();
    let job = task.clone();
    let pending = queue.enqueue(task.label(), async move { recompiler.run(job).await });
    if settle_tx.send((task, pending)).is_err() {
      break;
    }
  }
  debug!("Batch dispatcher stopped");
}

async fn settle(
  mut settle_rx: mpsc::UnboundedReceiver<(CompileTask, PendingResult<CompileOutcome>)>,
  completion: Arc<CompletionCell<Vec<Diagnostic>>>,
  cancel: CancellationToken,
) {
  while let Some((task, pending)) = settle_rx.recv().await {
    let diagnostics = match pending.await {
      Ok(Ok(diagnostics)) => diagnostics,
      Ok(Err(e)) => {
        error!(critical = true, task = ?task, error = %e, "Compilation failed, continuing without diagnostics");
        Vec::new()
      }
      Err(e) if cancel.is_cancelled() => {
        debug!(task = task.label(), error = %e, "Compile task abandoned on shutdown");
        Vec::new()
      }
      Err(e) => {
        error!(critical = true, task = ?task, error = %e, "Compile task did not complete");
        Vec::new()
      }
    };
    completion.fulfill(diagnostics).await;
  }
  debug!("Settle loop stopped");
}
