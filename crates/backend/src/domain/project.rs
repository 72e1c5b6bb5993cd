use serde::{Deserialize, Serialize};

use crate::paths::normalize_path;

/// Build configuration forwarded to project resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildConfiguration {
  #[default]
  Debug,
  Release,
}

impl BuildConfiguration {
  pub fn as_str(&self) -> &'static str {
    match self {
      BuildConfiguration::Debug => "Debug",
      BuildConfiguration::Release => "Release",
    }
  }
}

impl std::fmt::Display for BuildConfiguration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Everything the daemon needs to resolve the entry project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
  /// Normalized path of the entry `.fsproj`
  pub fsproj: String,
  pub configuration: BuildConfiguration,
  pub exclude: Vec<String>,
  pub no_reflection: bool,
  /// Normalized location of the fable-library package
  pub fable_library: String,
}

impl ProjectDescriptor {
  pub fn new(fsproj: impl AsRef<str>, fable_library: impl AsRef<str>) -> Self {
    Self {
      fsproj: normalize_path(fsproj),
      configuration: BuildConfiguration::default(),
      exclude: Vec::new(),
      no_reflection: false,
      fable_library: normalize_path(fable_library),
    }
  }

  pub fn project_changed_params(&self) -> ipc::ProjectChangedParams {
    ipc::ProjectChangedParams {
      configuration: self.configuration.as_str().to_string(),
      project: self.fsproj.clone(),
      fable_library: self.fable_library.clone(),
      exclude: self.exclude.clone(),
      no_reflection: self.no_reflection,
    }
  }
}
