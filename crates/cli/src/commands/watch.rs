//! Watch command: a standalone build host around the bridge
//!
//! File events come from `notify`. Every registered file's directory is
//! watched non-recursively so editors that save through a rename are still
//! seen. Hot-update results are printed to stdout as JSON lines; logs go to
//! stderr.

use std::{
  collections::BTreeSet,
  path::{Path, PathBuf},
  sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use fable_bridge::{Bridge, BuildHost, HotUpdatePayload, ModuleNode, paths::normalize};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::ProjectContext;

/// One line of watch output.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum WatchLine {
  /// A dependent file changed and a full recompile was queued
  ProjectChanged { file: String },
  /// Modules to hot-replace after `file` changed; empty when an error was sent
  Update { file: String, modules: Vec<String> },
}

fn print_line<T: Serialize>(line: &T) {
  match serde_json::to_string(line) {
    Ok(json) => println!("{json}"),
    Err(e) => warn!(error = %e, "Failed to serialize watch output"),
  }
}

struct WatchState {
  watcher: RecommendedWatcher,
  dirs: BTreeSet<PathBuf>,
}

/// Build host backed by a `notify` watcher.
struct WatchHost {
  state: Mutex<WatchState>,
}

impl WatchHost {
  fn new(watcher: RecommendedWatcher) -> Self {
    Self {
      state: Mutex::new(WatchState {
        watcher,
        dirs: BTreeSet::new(),
      }),
    }
  }

  #[cfg(test)]
  fn watched_dirs(&self) -> Vec<PathBuf> {
    self
      .state
      .lock()
      .map(|state| state.dirs.iter().cloned().collect())
      .unwrap_or_default()
  }
}

impl BuildHost for WatchHost {
  fn add_watch_file(&self, path: &str) {
    let Some(dir) = Path::new(path).parent() else {
      return;
    };
    let Ok(mut state) = self.state.lock() else {
      warn!(file = %path, "Watch state poisoned");
      return;
    };
    if state.dirs.contains(dir) {
      return;
    }

    match state.watcher.watch(dir, RecursiveMode::NonRecursive) {
      Ok(()) => {
        debug!(dir = %dir.display(), "Watching directory");
        state.dirs.insert(dir.to_path_buf());
      }
      Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to watch directory"),
    }
  }

  fn send_hot_error(&self, payload: HotUpdatePayload) {
    print_line(&payload);
  }
}

fn is_content_change(kind: &EventKind) -> bool {
  matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Offer a changed path to the bridge the way a build host would: first as a
/// project-level change, then as a hot-update trigger.
async fn route_change(bridge: Arc<Bridge>, path: PathBuf) {
  let file = normalize(&path);

  if bridge.watch_change(&file).await {
    print_line(&WatchLine::ProjectChanged { file });
    return;
  }

  // No module graph here: each compiled file is its own module, imported by
  // the entry project
  let modules = vec![ModuleNode::new(file.clone()).imported_by(bridge.fsproj())];
  if let Some(modules) = bridge.handle_hot_update(&file, modules).await {
    print_line(&WatchLine::Update {
      file,
      modules: modules.into_iter().map(|m| m.id).collect(),
    });
  }
}

/// Compile the project, then recompile on every change until Ctrl-C.
pub async fn cmd_watch(ctx: ProjectContext) -> Result<()> {
  let options = ctx.bridge_options()?;

  // The sync callback runs on notify's thread; full or closed channels drop events
  let (event_tx, mut event_rx) = mpsc::channel::<Result<Event, notify::Error>>(256);
  let watcher = RecommendedWatcher::new(
    move |res| {
      let _ = event_tx.blocking_send(res);
    },
    Config::default(),
  )
  .context("Failed to create file watcher")?;
  let host = Arc::new(WatchHost::new(watcher));

  let session = ctx.start_session().await?;
  let bridge = Arc::new(Bridge::new(options, session, host));
  if let Err(e) = bridge.start_watch().await {
    bridge.shutdown().await;
    return Err(e.into());
  }
  info!(fsproj = %bridge.fsproj(), files = bridge.cache().len().await, "Watching for changes");

  let shutdown = tokio::signal::ctrl_c();
  tokio::pin!(shutdown);

  loop {
    tokio::select! {
      _ = &mut shutdown => {
        info!("Interrupted");
        break;
      }
      event = event_rx.recv() => match event {
        Some(Ok(event)) if is_content_change(&event.kind) => {
          for path in event.paths {
            tokio::spawn(route_change(bridge.clone(), path));
          }
        }
        Some(Ok(_)) => {}
        Some(Err(e)) => warn!(error = %e, "File watcher error"),
        None => {
          warn!("File watcher stopped");
          break;
        }
      },
    }
  }

  bridge.shutdown().await;
  Ok(())
}
