//! Shared fixtures for bridge scenario tests.
//!
//! `MockCompiler` stands in for the daemon and records every call;
//! `RecordingHost` captures watch registrations and hot errors.

use std::{
  collections::{BTreeMap, VecDeque},
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use ipc::{
  CompileResult, Diagnostic, InitialCompileResult, ProjectChangedParams, ProjectChangedResult, Range, Severity,
};
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::{
  Bridge, BridgeOptions, BuildHost, Compiler, HotUpdatePayload, SessionError, paths::normalize,
  project::ProjectDescriptor,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  ProjectChanged { project: String },
  InitialCompile,
  Compile { files: Vec<String> },
}

/// Holds the next armed call until released.
#[derive(Default)]
pub struct Hold {
  armed: AtomicBool,
  pub entered: Notify,
  pub release: Notify,
}

impl Hold {
  pub fn arm(&self) {
    self.armed.store(true, Ordering::SeqCst);
  }

  async fn pass(&self) {
    if self.armed.swap(false, Ordering::SeqCst) {
      self.entered.notify_one();
      self.release.notified().await;
    }
  }
}

#[derive(Default)]
pub struct MockCompiler {
  pub calls: Mutex<Vec<Call>>,
  pub sources: Mutex<Vec<String>>,
  pub dependents: Mutex<Vec<String>>,
  pub project_diagnostics: Mutex<Vec<Diagnostic>>,
  /// Scripted `compile` answers; an empty queue compiles cleanly
  pub compile_results: Mutex<VecDeque<Result<Vec<Diagnostic>, String>>>,
  pub fail_project: AtomicBool,
  pub compile_delay: Mutex<Duration>,
  pub project_hold: Hold,
  active: AtomicUsize,
  pub max_active: AtomicUsize,
  pub shutdowns: AtomicUsize,
}

impl MockCompiler {
  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn compile_calls(&self) -> Vec<Vec<String>> {
    self
      .calls()
      .into_iter()
      .filter_map(|c| match c {
        Call::Compile { files } => Some(files),
        _ => None,
      })
      .collect()
  }

  pub fn script_compile(&self, result: Result<Vec<Diagnostic>, String>) {
    self.compile_results.lock().unwrap().push_back(result);
  }

  fn enter(&self, call: Call) {
    self.calls.lock().unwrap().push(call);
    let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
    self.max_active.fetch_max(now, Ordering::SeqCst);
  }

  fn leave(&self) {
    self.active.fetch_sub(1, Ordering::SeqCst);
  }

  fn code_for(file: &str) -> String {
    format!("// compiled {file}\n")
  }
}

#[async_trait]
impl Compiler for MockCompiler {
  async fn project_changed(&self, params: ProjectChangedParams) -> Result<ProjectChangedResult, SessionError> {
    self.enter(Call::ProjectChanged {
      project: params.project.clone(),
    });
    self.project_hold.pass().await;
    self.leave();

    if self.fail_project.load(Ordering::SeqCst) {
      return Err(SessionError::CompileFailure("project could not be loaded".to_string()));
    }
    Ok(ProjectChangedResult {
      source_files: self.sources.lock().unwrap().clone(),
      diagnostics: self.project_diagnostics.lock().unwrap().clone(),
      dependent_files: self.dependents.lock().unwrap().clone(),
    })
  }

  async fn initial_compile(&self) -> Result<InitialCompileResult, SessionError> {
    self.enter(Call::InitialCompile);
    self.leave();
    let files = self
      .sources
      .lock()
      .unwrap()
      .iter()
      .map(|f| (f.clone(), Self::code_for(f)))
      .collect();
    Ok(InitialCompileResult { files })
  }

  async fn compile(&self, files: Vec<String>) -> Result<CompileResult, SessionError> {
    self.enter(Call::Compile { files: files.clone() });
    let delay = *self.compile_delay.lock().unwrap();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
    self.leave();

    let scripted = self.compile_results.lock().unwrap().pop_front();
    let diagnostics = match scripted {
      Some(Ok(diagnostics)) => diagnostics,
      Some(Err(message)) => return Err(SessionError::CompileFailure(message)),
      None => Vec::new(),
    };
    let compiled: BTreeMap<String, String> = files
      .iter()
      .map(|f| (f.clone(), format!("// recompiled {f}\n")))
      .collect();
    Ok(CompileResult {
      files: compiled,
      diagnostics,
    })
  }

  async fn shutdown(&self) {
    self.shutdowns.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Default)]
pub struct RecordingHost {
  pub watched: Mutex<Vec<String>>,
  pub errors: Mutex<Vec<HotUpdatePayload>>,
}

impl RecordingHost {
  pub fn errors(&self) -> Vec<HotUpdatePayload> {
    self.errors.lock().unwrap().clone()
  }
}

impl BuildHost for RecordingHost {
  fn add_watch_file(&self, path: &str) {
    self.watched.lock().unwrap().push(path.to_string());
  }

  fn send_hot_error(&self, payload: HotUpdatePayload) {
    self.errors.lock().unwrap().push(payload);
  }
}

pub fn diagnostic(severity: Severity, file: &str, line: u32) -> Diagnostic {
  Diagnostic {
    severity,
    code: "FS0039".to_string(),
    message: "The value or constructor 'x' is not defined.".to_string(),
    file_name: file.to_string(),
    range: Range {
      start_line: line,
      start_column: 9,
      end_line: line,
      end_column: 10,
    },
  }
}

/// A project on disk plus a bridge wired to mocks.
pub struct TestContext {
  pub dir: TempDir,
  pub compiler: Arc<MockCompiler>,
  pub host: Arc<RecordingHost>,
  pub bridge: Bridge,
}

impl TestContext {
  pub fn new() -> Self {
    let dir = TempDir::new().expect("create temp dir");
    for (name, content) in [
      ("App.fsproj", "<Project />\n"),
      ("A.fs", "module A\nlet a = 1\n"),
      ("B.fs", "module B\nlet b = 2\n"),
      ("C.fs", "module C\nlet c = 3\n"),
      ("Foo.fs", "module Foo\nlet a = 1\nlet c = x\nlet d = 4\n"),
    ] {
      std::fs::write(dir.path().join(name), content).expect("write project file");
    }

    let compiler = Arc::new(MockCompiler::default());
    let ctx_dir = &dir;
    let path = |name: &str| normalize(&ctx_dir.path().join(name));
    *compiler.sources.lock().unwrap() = vec![path("A.fs"), path("B.fs"), path("Foo.fs")];
    *compiler.dependents.lock().unwrap() = vec![path("App.fsproj")];

    let host = Arc::new(RecordingHost::default());
    let options = BridgeOptions {
      project: ProjectDescriptor::new(path("App.fsproj"), path("node_modules/@fable-org/fable-library-js")),
      debounce: Duration::from_millis(20),
      jsx: None,
      jsx_command: crate::config::BridgeConfig::default().jsx_command,
    };
    let bridge = Bridge::new(options, compiler.clone(), host.clone());

    Self {
      dir,
      compiler,
      host,
      bridge,
    }
  }

  pub fn path(&self, name: &str) -> String {
    normalize(&self.dir.path().join(name))
  }

  pub fn write(&self, name: &str, content: &str) {
    std::fs::write(self.dir.path().join(name), content).expect("write project file");
  }

  /// Poll until the compiler has seen `count` calls.
  pub async fn wait_for_calls(&self, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
      while self.compiler.calls().len() < count {
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
    })
    .await
    .expect("compiler calls did not arrive");
  }
}
