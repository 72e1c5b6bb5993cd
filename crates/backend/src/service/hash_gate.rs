//! Hash gate: skip recompiles for hot-update triggers whose bytes did not change.
//!
//! Editors and file systems regularly fire events for metadata-only changes.
//! The gate remembers the last SHA-256 per file and only lets a trigger through
//! when the content differs. Unreadable files always pass and forget their
//! digest, so the next trigger is checked afresh.

use std::{collections::HashMap, path::Path};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::paths::normalize_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
  /// Same bytes as last time; no recompile needed
  Unchanged,
  Changed,
}

/// Hex SHA-256 of a file's content.
pub async fn digest_file(path: &Path) -> std::io::Result<String> {
  let content = tokio::fs::read(path).await?;
  Ok(hex::encode(Sha256::digest(&content)))
}

#[derive(Default)]
pub struct HashGate {
  digests: Mutex<HashMap<String, String>>,
}

impl HashGate {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn check(&self, path: &str) -> GateDecision {
    let key = normalize_path(path);
    let digest = match digest_file(Path::new(path)).await {
      Ok(digest) => digest,
      Err(e) => {
        debug!(file = %key, error = %e, "Could not hash file, treating as changed");
        self.digests.lock().await.remove(&key);
        return GateDecision::Changed;
      }
    };

    let mut digests = self.digests.lock().await;
    if digests.get(&key) == Some(&digest) {
      trace!(file = %key, "Content unchanged");
      return GateDecision::Unchanged;
    }

    digests.insert(key, digest);
    GateDecision::Changed
  }

  /// Drop the stored digest so the next `check` reports `Changed`.
  pub async fn forget(&self, path: &str) {
    self.digests.lock().await.remove(&normalize_path(path));
  }
}
