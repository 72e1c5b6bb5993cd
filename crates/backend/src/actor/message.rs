//! Message types flowing from the build host into the compile pipeline.
//!
//! ```text
//! ChangeEvent* → (debounce window) → PendingChangeBatch → CompileTask
//! ```

use std::collections::BTreeSet;

use crate::paths::normalize_path;

/// A raw change notification from the build host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
  /// The entry project or one of its dependent files changed
  ProjectChanged(String),
  /// A known source file changed
  FileChanged(String),
}

impl ChangeEvent {
  pub fn project_changed(path: impl AsRef<str>) -> Self {
    Self::ProjectChanged(normalize_path(path))
  }

  pub fn file_changed(path: impl AsRef<str>) -> Self {
    Self::FileChanged(normalize_path(path))
  }
}

/// The reduction of every event seen during one debounce window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingChangeBatch {
  pub project_changed: bool,
  pub fsharp_files: BTreeSet<String>,
  /// Project-level paths that triggered `project_changed`
  pub project_files: BTreeSet<String>,
}

impl PendingChangeBatch {
  pub fn apply(&mut self, event: ChangeEvent) {
    match event {
      ChangeEvent::ProjectChanged(path) => {
        self.project_changed = true;
        self.project_files.insert(path);
      }
      ChangeEvent::FileChanged(path) => {
        self.fsharp_files.insert(path);
      }
    }
  }

  pub fn is_empty(&self) -> bool {
    !self.project_changed && self.fsharp_files.is_empty()
  }

  /// Decide what to compile. A project change always wins over file changes
  /// seen in the same window.
  pub fn into_task(self) -> Option<CompileTask> {
    if self.project_changed {
      Some(CompileTask::ProjectChanged {
        project_files: self.project_files,
      })
    } else if self.fsharp_files.is_empty() {
      None
    } else {
      Some(CompileTask::FilesChanged {
        files: self.fsharp_files.into_iter().collect(),
      })
    }
  }
}

impl FromIterator<ChangeEvent> for PendingChangeBatch {
  fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
    let mut batch = Self::default();
    for event in iter {
      batch.apply(event);
    }
    batch
  }
}

/// One unit of work for the compile queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileTask {
  /// Re-resolve the project and recompile everything
  ProjectChanged { project_files: BTreeSet<String> },
  /// Recompile exactly these files
  FilesChanged { files: Vec<String> },
}

impl CompileTask {
  pub fn label(&self) -> &'static str {
    match self {
      CompileTask::ProjectChanged { .. } => "project-changed",
      CompileTask::FilesChanged { .. } => "files-changed",
    }
  }
}
