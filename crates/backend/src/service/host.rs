//! The build host as seen from the compile pipeline.

use std::collections::BTreeSet;

use super::diagnostics::HotUpdatePayload;

/// Callbacks into the file-watching build host.
pub trait BuildHost: Send + Sync {
  /// Register a file whose changes should trigger recompilation.
  fn add_watch_file(&self, path: &str);

  /// Deliver a blocking error to the hot-update channel.
  fn send_hot_error(&self, payload: HotUpdatePayload);
}

/// A module in the host's graph that could be hot-replaced.
pub trait HotModule {
  fn importer_count(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNode {
  pub id: String,
  pub importers: BTreeSet<String>,
}

impl ModuleNode {
  pub fn new(id: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      importers: BTreeSet::new(),
    }
  }

  pub fn imported_by(mut self, importer: impl Into<String>) -> Self {
    self.importers.insert(importer.into());
    self
  }
}

impl HotModule for ModuleNode {
  fn importer_count(&self) -> usize {
    self.importers.len()
  }
}

/// Modules nobody imports are not part of the live graph and must not be
/// hot-replaced.
pub fn importable_modules<M: HotModule>(modules: Vec<M>) -> Vec<M> {
  modules.into_iter().filter(|m| m.importer_count() > 0).collect()
}
