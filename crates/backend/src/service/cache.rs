//! Artifact cache: source files, dependent files and compiled code.
//!
//! Readers can be anywhere. Writers are only ever compile jobs running on the
//! compile queue, which is why the mutators are crate-private. A full
//! recompile clears everything in one write and repopulates it in another, so
//! no reader ever sees a mix of old and new project state.

use std::{
  collections::{BTreeMap, BTreeSet, HashMap},
  sync::Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::paths::normalize_path;

#[derive(Debug, Default)]
struct CacheState {
  source_files: BTreeSet<String>,
  dependent_files: BTreeSet<String>,
  artifacts: HashMap<String, String>,
}

/// Everything a full recompile produces, committed in one step.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProjectSnapshot {
  pub source_files: BTreeSet<String>,
  pub dependent_files: BTreeSet<String>,
  pub artifacts: HashMap<String, String>,
}

impl ProjectSnapshot {
  /// Build a snapshot from daemon output. Every key is normalized and one
  /// artifact is kept per resolved source file.
  pub fn from_daemon(
    source_files: impl IntoIterator<Item = String>,
    dependent_files: impl IntoIterator<Item = String>,
    compiled: BTreeMap<String, String>,
  ) -> Self {
    let compiled: HashMap<String, String> = compiled.into_iter().map(|(k, v)| (normalize_path(k), v)).collect();
    let source_files: BTreeSet<String> = source_files.into_iter().map(normalize_path).collect();
    let dependent_files = dependent_files.into_iter().map(normalize_path).collect();

    let mut artifacts = HashMap::with_capacity(source_files.len());
    for file in &source_files {
      match compiled.get(file) {
        Some(code) => {
          artifacts.insert(file.clone(), code.clone());
        }
        None => debug!(file = %file, "Daemon returned no code for source file"),
      }
    }

    Self {
      source_files,
      dependent_files,
      artifacts,
    }
  }
}

#[derive(Clone, Default)]
pub struct ArtifactCache {
  state: Arc<RwLock<CacheState>>,
}

impl ArtifactCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Compiled code for `path`. `None` means "not ready yet", not an error.
  pub async fn lookup(&self, path: &str) -> Option<String> {
    let key = normalize_path(path);
    let code = self.state.read().await.artifacts.get(&key).cloned();
    if code.is_none() {
      warn!(file = %key, "File is not part of the compiled files");
    }
    code
  }

  pub async fn contains(&self, path: &str) -> bool {
    self.state.read().await.artifacts.contains_key(&normalize_path(path))
  }

  pub async fn is_dependent_file(&self, path: &str) -> bool {
    self.state.read().await.dependent_files.contains(&normalize_path(path))
  }

  pub async fn has_sources(&self) -> bool {
    !self.state.read().await.source_files.is_empty()
  }

  pub async fn source_files(&self) -> BTreeSet<String> {
    self.state.read().await.source_files.clone()
  }

  /// All artifacts, sorted by path.
  pub async fn artifacts(&self) -> BTreeMap<String, String> {
    let state = self.state.read().await;
    state.artifacts.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
  }

  pub async fn len(&self) -> usize {
    self.state.read().await.artifacts.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.len().await == 0
  }

  pub(crate) async fn clear(&self) {
    let mut state = self.state.write().await;
    state.source_files.clear();
    state.dependent_files.clear();
    state.artifacts.clear();
  }

  pub(crate) async fn replace_project(&self, snapshot: ProjectSnapshot) {
    let mut state = self.state.write().await;
    state.source_files = snapshot.source_files;
    state.dependent_files = snapshot.dependent_files;
    state.artifacts = snapshot.artifacts;
    debug!(
      sources = state.source_files.len(),
      dependents = state.dependent_files.len(),
      "Project artifacts replaced"
    );
  }

  /// Overwrite only the given entries; everything else is untouched.
  pub(crate) async fn update(&self, compiled: BTreeMap<String, String>) -> Vec<String> {
    let mut state = self.state.write().await;
    compiled
      .into_iter()
      .map(|(file, code)| {
        let file = normalize_path(file);
        state.artifacts.insert(file.clone(), code);
        file
      })
      .collect()
  }
}
