//! Full and incremental recompilation against the artifact cache.
//!
//! Everything here runs inside a compile-queue job, which is what makes the
//! cache mutations safe: at most one recompile is ever in flight.

use std::{collections::BTreeSet, sync::Arc};

use async_trait::async_trait;
use ipc::{
  CompileParams, CompileResult, Diagnostic, InitialCompileParams, InitialCompileResult, ProjectChangedParams,
  ProjectChangedResult,
};
use tracing::{debug, error, info};

use super::{
  cache::{ArtifactCache, ProjectSnapshot},
  diagnostics::log_diagnostics,
  host::BuildHost,
};
use crate::{
  actor::message::CompileTask,
  domain::project::ProjectDescriptor,
  session::{DaemonSession, SessionError},
};

/// The three daemon operations the pipeline depends on.
#[async_trait]
pub trait Compiler: Send + Sync {
  async fn project_changed(&self, params: ProjectChangedParams) -> Result<ProjectChangedResult, SessionError>;

  async fn initial_compile(&self) -> Result<InitialCompileResult, SessionError>;

  async fn compile(&self, files: Vec<String>) -> Result<CompileResult, SessionError>;

  /// Release the compiler. Must be idempotent.
  async fn shutdown(&self) {}
}

#[async_trait]
impl Compiler for DaemonSession {
  async fn project_changed(&self, params: ProjectChangedParams) -> Result<ProjectChangedResult, SessionError> {
    self.call(&params).await
  }

  async fn initial_compile(&self) -> Result<InitialCompileResult, SessionError> {
    self.call(&InitialCompileParams).await
  }

  async fn compile(&self, files: Vec<String>) -> Result<CompileResult, SessionError> {
    self.call(&CompileParams { file_names: files }).await
  }

  async fn shutdown(&self) {
    self.stop().await;
  }
}

/// Runs recompiles and keeps the artifact cache in step with the daemon.
#[derive(Clone)]
pub struct Recompiler {
  compiler: Arc<dyn Compiler>,
  cache: ArtifactCache,
  host: Arc<dyn BuildHost>,
  project: Arc<ProjectDescriptor>,
}

impl Recompiler {
  pub fn new(
    compiler: Arc<dyn Compiler>,
    cache: ArtifactCache,
    host: Arc<dyn BuildHost>,
    project: ProjectDescriptor,
  ) -> Self {
    Self {
      compiler,
      cache,
      host,
      project: Arc::new(project),
    }
  }

  /// Re-resolve the project and recompile everything. The cache is empty
  /// from the first daemon call until the new state is committed; if any
  /// call fails it stays empty.
  pub async fn full(&self, project_files: &BTreeSet<String>) -> Result<Vec<Diagnostic>, SessionError> {
    info!(fsproj = %self.project.fsproj, changed = ?project_files, "Full compile started");
    self.cache.clear().await;

    let resolved = self.compiler.project_changed(self.project.project_changed_params()).await?;
    info!(
      fsproj = %self.project.fsproj,
      sources = resolved.source_files.len(),
      dependents = resolved.dependent_files.len(),
      "Project type-checked"
    );
    log_diagnostics(&resolved.diagnostics);

    let compiled = self.compiler.initial_compile().await?;
    let snapshot = ProjectSnapshot::from_daemon(resolved.source_files, resolved.dependent_files, compiled.files);

    for file in snapshot.dependent_files.iter().chain(snapshot.source_files.iter()) {
      self.host.add_watch_file(file);
    }
    self.cache.replace_project(snapshot).await;

    info!(fsproj = %self.project.fsproj, "Full compile completed");
    Ok(resolved.diagnostics)
  }

  /// Recompile exactly `files`, overwriting only their artifacts.
  pub async fn incremental(&self, files: Vec<String>) -> Result<Vec<Diagnostic>, SessionError> {
    let result = self.compiler.compile(files).await?;
    let updated = self.cache.update(result.files).await;
    debug!(files = ?updated, "Files compiled");
    log_diagnostics(&result.diagnostics);
    Ok(result.diagnostics)
  }

  /// Run one queued task. A failed full compile is logged and swallowed so
  /// the session survives; a failed incremental compile is returned to the
  /// caller. Diagnostics of a full compile are only logged, never surfaced.
  pub async fn run(&self, task: CompileTask) -> Result<Vec<Diagnostic>, SessionError> {
    match task {
      CompileTask::ProjectChanged { project_files } => {
        if let Err(e) = self.full(&project_files).await {
          error!(
            critical = true,
            changed = ?project_files,
            error = %e,
            "Unexpected failure during full compile"
          );
        }
        Ok(Vec::new())
      }
      CompileTask::FilesChanged { files } => {
        debug!(files = ?files, "Incremental compile started");
        self.incremental(files).await
      }
    }
  }
}
