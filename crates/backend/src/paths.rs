//! Path normalization shared by every cache key.
//!
//! The daemon, the file watcher and the build host all report paths in
//! slightly different shapes (backslashes on Windows, `./` segments from
//! project files). Everything is reduced to one forward-slash form before
//! it is used as a key.

use std::path::Path;

/// Normalize a path string: `\` becomes `/`, `.` segments and duplicate
/// separators are dropped and `..` segments are resolved where possible.
pub fn normalize_path(path: impl AsRef<str>) -> String {
  let raw = path.as_ref().replace('\\', "/");
  let absolute = raw.starts_with('/');

  let mut segments: Vec<&str> = Vec::new();
  for segment in raw.split('/') {
    match segment {
      "" | "." => {}
      ".." => match segments.last() {
        Some(last) if last.ends_with(':') => {}
        Some(last) if *last != ".." => {
          segments.pop();
        }
        Some(_) => segments.push(".."),
        None if absolute => {}
        None => segments.push(".."),
      },
      other => segments.push(other),
    }
  }

  let joined = segments.join("/");
  match (absolute, joined.is_empty()) {
    (true, _) => format!("/{joined}"),
    (false, true) => ".".to_string(),
    (false, false) => joined,
  }
}

/// Normalize a filesystem path.
pub fn normalize(path: &Path) -> String {
  normalize_path(path.to_string_lossy())
}
