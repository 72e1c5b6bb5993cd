//! Configuration for the bridge, loaded from `fable-bridge.toml`.
//!
//! Lookup order: explicit path > `<project_dir>/fable-bridge.toml` > defaults.
//!
//! ```toml
//! fsproj = "src/App.fsproj"
//! jsx = "automatic"
//! no_reflection = false
//! exclude = ["Fable.Core"]
//! debounce_ms = 50
//!
//! [daemon]
//! program = "dotnet"
//! args = ["bin/Fable.Daemon.dll", "--stdio"]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::project::{BuildConfiguration, ProjectDescriptor};
use crate::{paths::normalize, session::DaemonCommand};

pub const CONFIG_FILE_NAME: &str = "fable-bridge.toml";

const FABLE_LIBRARY_PACKAGE: &str = "@fable-org/fable-library-js";

/// Setting this env var forces debug-level logging.
pub const DEBUG_ENV_VAR: &str = "FABLE_BRIDGE_DEBUG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("No .fsproj configured for {0}")]
  MissingProject(PathBuf),
}

/// JSX handling applied to generated code after compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsxMode {
  Transform,
  Preserve,
  Automatic,
}

impl JsxMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      JsxMode::Transform => "transform",
      JsxMode::Preserve => "preserve",
      JsxMode::Automatic => "automatic",
    }
  }
}

impl std::fmt::Display for JsxMode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An external program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
  pub program: String,
  #[serde(default)]
  pub args: Vec<String>,
}

fn default_daemon_command() -> CommandConfig {
  CommandConfig {
    program: "dotnet".to_string(),
    args: vec!["bin/Fable.Daemon.dll".to_string(), "--stdio".to_string()],
  }
}

fn default_jsx_command() -> CommandConfig {
  CommandConfig {
    program: "esbuild".to_string(),
    args: vec!["--loader=jsx".to_string(), "--jsx={mode}".to_string()],
  }
}

/// Logging settings consumed by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// off, error, warn, info, debug, trace
  pub level: String,
  /// daily, hourly, never
  pub rotation: String,
  /// When set, logs go to a rolling file in this directory
  pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
      directory: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
  /// Entry project, relative to the project directory
  pub fsproj: Option<PathBuf>,
  pub jsx: Option<JsxMode>,
  #[serde(alias = "noReflection")]
  pub no_reflection: bool,
  pub exclude: Vec<String>,
  pub configuration: BuildConfiguration,
  /// Change-aggregation window
  pub debounce_ms: u64,
  /// Location of fable-library, relative to the project directory
  pub fable_library: Option<PathBuf>,
  pub daemon: CommandConfig,
  /// Post-compile JSX pass; `{mode}` in args is replaced by the JSX mode
  pub jsx_command: CommandConfig,
  pub log: LogConfig,
}

impl Default for BridgeConfig {
  fn default() -> Self {
    Self {
      fsproj: None,
      jsx: None,
      no_reflection: false,
      exclude: Vec::new(),
      configuration: BuildConfiguration::Debug,
      debounce_ms: 50,
      fable_library: None,
      daemon: default_daemon_command(),
      jsx_command: default_jsx_command(),
      log: LogConfig::default(),
    }
  }
}

impl BridgeConfig {
  pub fn config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_FILE_NAME)
  }

  /// Load an explicit config file.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content, path)
  }

  /// Load `<project_dir>/fable-bridge.toml`, or defaults when it does not exist.
  pub fn load_for_project(project_dir: &Path) -> Result<Self, ConfigError> {
    let path = Self::config_path(project_dir);
    if !path.exists() {
      return Ok(Self::default());
    }
    Self::load(&path)
  }

  fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  pub fn debounce(&self) -> std::time::Duration {
    std::time::Duration::from_millis(self.debounce_ms)
  }

  /// Whether debug logging was forced through the environment.
  pub fn debug_forced() -> bool {
    std::env::var_os(DEBUG_ENV_VAR).is_some()
  }

  /// Resolve the entry project against `project_dir`.
  pub fn project_descriptor(&self, project_dir: &Path) -> Result<ProjectDescriptor, ConfigError> {
    let fsproj = self
      .fsproj
      .as_ref()
      .ok_or_else(|| ConfigError::MissingProject(project_dir.to_path_buf()))?;
    let fable_library = match &self.fable_library {
      Some(path) => project_dir.join(path),
      None => default_fable_library(project_dir),
    };

    let mut project = ProjectDescriptor::new(normalize(&project_dir.join(fsproj)), normalize(&fable_library));
    project.configuration = self.configuration;
    project.exclude = self.exclude.clone();
    project.no_reflection = self.no_reflection;
    Ok(project)
  }

  pub fn daemon_command(&self, project_dir: &Path) -> DaemonCommand {
    DaemonCommand {
      program: self.daemon.program.clone(),
      args: self.daemon.args.clone(),
      cwd: Some(project_dir.to_path_buf()),
    }
  }
}

/// The project's own `node_modules` copy of fable-library, else the one
/// installed next to the project directory.
fn default_fable_library(project_dir: &Path) -> PathBuf {
  let own = project_dir.join("node_modules").join(FABLE_LIBRARY_PACKAGE);
  if own.exists() {
    return own;
  }
  project_dir.join("..").join(FABLE_LIBRARY_PACKAGE)
}
