//! CLI command implementations

mod build;
mod watch;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Args;
use fable_bridge::{
  BridgeOptions, DaemonSession,
  config::BridgeConfig,
  project::BuildConfiguration,
};
use tracing::warn;

pub use build::cmd_build;
pub use watch::cmd_watch;

/// Flags shared by every command.
#[derive(Args, Debug)]
pub struct ProjectArgs {
  /// Project directory (defaults to the current directory)
  #[arg(long, global = true)]
  project_dir: Option<PathBuf>,

  /// Config file (defaults to fable-bridge.toml in the project directory)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Entry .fsproj, relative to the project directory
  #[arg(long, global = true)]
  fsproj: Option<PathBuf>,

  /// Compile with the Release configuration
  #[arg(long, global = true)]
  release: bool,
}

impl ProjectArgs {
  /// Resolve the project directory and effective config. One-shot builds
  /// compile in Release unless the flag says otherwise.
  pub fn load(self, build: bool) -> Result<ProjectContext> {
    let dir = match self.project_dir {
      Some(dir) => dir,
      None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let mut config = match &self.config {
      Some(path) => BridgeConfig::load(path)?,
      None => BridgeConfig::load_for_project(&dir)?,
    };
    if let Some(fsproj) = self.fsproj {
      config.fsproj = Some(fsproj);
    }
    if self.release || build {
      config.configuration = BuildConfiguration::Release;
    }

    Ok(ProjectContext { dir, config })
  }
}

pub struct ProjectContext {
  pub dir: PathBuf,
  pub config: BridgeConfig,
}

impl ProjectContext {
  pub fn bridge_options(&self) -> Result<BridgeOptions> {
    Ok(BridgeOptions::from_config(&self.config, &self.dir)?)
  }

  /// Launch the daemon and report protocol faults nobody is waiting on.
  pub async fn start_session(&self) -> Result<Arc<DaemonSession>> {
    let session = Arc::new(DaemonSession::new(self.config.daemon_command(&self.dir)));
    session.start().await.context("Failed to start the Fable daemon")?;
    session
      .on_protocol_error(|e| warn!(error = %e, "Daemon protocol error"))
      .await;
    Ok(session)
  }
}
