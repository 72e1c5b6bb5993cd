//! One-shot build command

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use fable_bridge::{Bridge, BuildHost, HotUpdatePayload};
use ipc::Severity;
use tracing::{debug, info};

use super::ProjectContext;

/// Build has no live module graph: watch registrations and hot errors go
/// nowhere.
struct BuildOnlyHost;

impl BuildHost for BuildOnlyHost {
  fn add_watch_file(&self, _path: &str) {}

  fn send_hot_error(&self, payload: HotUpdatePayload) {
    debug!(file = %payload.error().id, "Hot error ignored in build mode");
  }
}

/// Compile the project once and optionally write every artifact to `out_dir`.
pub async fn cmd_build(ctx: ProjectContext, out_dir: Option<PathBuf>) -> Result<()> {
  let options = ctx.bridge_options()?;
  let session = ctx.start_session().await?;
  let bridge = Bridge::new(options, session, Arc::new(BuildOnlyHost));

  let outcome = bridge.build().await;
  let result = match outcome {
    Ok(diagnostics) => {
      let errors = diagnostics.iter().filter(|d| d.severity == Severity::Error).count();
      let warnings = diagnostics.iter().filter(|d| d.severity == Severity::Warning).count();
      info!(
        files = bridge.cache().len().await,
        errors, warnings, "Build finished"
      );

      match (errors, &out_dir) {
        (0, Some(out_dir)) => bridge.emit(&ctx.dir, out_dir).await.map(|_| ()).map_err(Into::into),
        (0, None) => Ok(()),
        (n, _) => Err(anyhow::anyhow!("Build failed with {n} error(s)")),
      }
    }
    Err(e) => Err(e.into()),
  };

  bridge.shutdown().await;
  result
}
