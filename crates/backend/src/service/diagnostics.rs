//! Diagnostics reporting: log lines, code frames and hot-update error payloads.
//!
//! Only the first Error-severity diagnostic of a recompile blocks a hot
//! update. Warnings and infos are logged and nothing more.

use std::collections::BTreeMap;

use ipc::{Diagnostic, Severity};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

const LINES_ABOVE: i64 = 2;
const LINES_BELOW: i64 = 3;

/// `{SEVERITY} {code}: {message} {file} ({startLine},{startCol}) ({endLine},{endCol})`
pub fn format_diagnostic(diagnostic: &Diagnostic) -> String {
  let range = &diagnostic.range;
  format!(
    "{} {}: {} {} ({},{}) ({},{})",
    diagnostic.severity.as_str().to_uppercase(),
    diagnostic.code,
    diagnostic.message,
    diagnostic.file_name,
    range.start_line,
    range.start_column,
    range.end_line,
    range.end_column,
  )
}

pub fn log_diagnostics(diagnostics: &[Diagnostic]) {
  for diagnostic in diagnostics {
    let line = format_diagnostic(diagnostic);
    match diagnostic.severity {
      Severity::Error => error!(target: "fable_diagnostics", "{line}"),
      Severity::Warning => warn!(target: "fable_diagnostics", "{line}"),
      Severity::Info | Severity::Other => info!(target: "fable_diagnostics", "{line}"),
    }
  }
}

/// The diagnostic that blocks a hot update, if any.
pub fn first_error(diagnostics: &[Diagnostic]) -> Option<&Diagnostic> {
  diagnostics.iter().find(|d| d.severity.is_error())
}

// ============================================================================
// Code frame
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
  /// Mark the line without an underline
  Whole,
  /// Underline `width` characters starting at 1-based `column`
  Span { column: i64, width: i64 },
}

fn split_lines(source: &str) -> Vec<&str> {
  let mut lines = Vec::new();
  let mut start = 0;
  let mut chars = source.char_indices().peekable();
  while let Some((idx, c)) = chars.next() {
    match c {
      '\r' => {
        lines.push(&source[start..idx]);
        start = match chars.peek() {
          Some((next, '\n')) => {
            let next = *next;
            chars.next();
            next + 1
          }
          _ => idx + 1,
        };
      }
      '\n' | '\u{2028}' | '\u{2029}' => {
        lines.push(&source[start..idx]);
        start = idx + c.len_utf8();
      }
      _ => {}
    }
  }
  lines.push(&source[start..]);
  lines
}

fn line_len(lines: &[&str], number: i64) -> i64 {
  usize::try_from(number - 1)
    .ok()
    .and_then(|idx| lines.get(idx))
    .map(|line| line.chars().count() as i64)
    .unwrap_or(0)
}

fn marker_lines(lines: &[&str], start: (i64, i64), end: (i64, i64)) -> BTreeMap<i64, Marker> {
  let (start_line, start_col) = start;
  let (end_line, end_col) = end;
  let mut markers = BTreeMap::new();

  if end_line != start_line {
    for number in start_line..=end_line {
      let marker = if start_col == 0 {
        Marker::Whole
      } else if number == start_line {
        Marker::Span {
          column: start_col,
          width: line_len(lines, number) - start_col + 1,
        }
      } else if number == end_line {
        Marker::Span {
          column: 0,
          width: end_col,
        }
      } else {
        Marker::Span {
          column: 0,
          width: line_len(lines, number),
        }
      };
      markers.insert(number, marker);
    }
  } else if start_col == end_col {
    let marker = if start_col == 0 {
      Marker::Whole
    } else {
      Marker::Span {
        column: start_col,
        width: 0,
      }
    };
    markers.insert(start_line, marker);
  } else {
    markers.insert(
      start_line,
      Marker::Span {
        column: start_col,
        width: end_col - start_col,
      },
    );
  }

  markers
}

/// Render a plain-text code frame around `start..end` (1-based lines,
/// columns as given), two lines above and three below the range.
pub fn code_frame(source: &str, start: (u32, u32), end: (u32, u32)) -> String {
  let lines = split_lines(source);
  let start = (i64::from(start.0), i64::from(start.1));
  let end = (i64::from(end.0), i64::from(end.1));

  let first = (start.0 - (LINES_ABOVE + 1)).max(0);
  let last = (lines.len() as i64).min(end.0 + LINES_BELOW);
  if first >= last {
    return String::new();
  }

  let markers = marker_lines(&lines, start, end);
  let width = last.to_string().len();

  let mut rendered = Vec::with_capacity((last - first) as usize);
  for number in (first + 1)..=last {
    let line = lines[(number - 1) as usize];
    let gutter = format!(" {number:>width$} |");
    let text = if line.is_empty() { String::new() } else { format!(" {line}") };

    let Some(marker) = markers.get(&number) else {
      rendered.push(format!(" {gutter}{text}"));
      continue;
    };

    let mut out = format!(">{gutter}{text}");
    if let Marker::Span { column, width } = *marker {
      let spacing: String = line
        .chars()
        .take((column - 1).max(0) as usize)
        .map(|c| if c == '\t' { '\t' } else { ' ' })
        .collect();
      let blank_gutter: String = gutter.chars().map(|c| if c.is_ascii_digit() { ' ' } else { c }).collect();
      let carets = "^".repeat(width.max(1) as usize);
      out.push_str(&format!("\n {blank_gutter} {spacing}{carets}"));
    }
    rendered.push(out);
  }

  rendered.join("\n")
}

// ============================================================================
// Hot-update payloads
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorLocation {
  pub file: String,
  pub line: u32,
  pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotUpdateError {
  pub message: String,
  pub frame: String,
  pub stack: String,
  pub id: String,
  pub loc: ErrorLocation,
}

/// Message delivered to the host's hot-update channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HotUpdatePayload {
  Error { err: HotUpdateError },
}

impl HotUpdatePayload {
  pub fn error(&self) -> &HotUpdateError {
    match self {
      HotUpdatePayload::Error { err } => err,
    }
  }
}

/// Build the blocking error payload for `diagnostic`, reading its file for
/// the frame. An unreadable file still yields a payload, with an empty frame.
pub async fn make_hot_error(diagnostic: &Diagnostic) -> HotUpdatePayload {
  let range = &diagnostic.range;
  let frame = match tokio::fs::read_to_string(&diagnostic.file_name).await {
    Ok(source) => code_frame(
      &source,
      (range.start_line, range.start_column),
      (range.end_line, range.end_column),
    ),
    Err(e) => {
      warn!(file = %diagnostic.file_name, error = %e, "Could not read file for code frame");
      String::new()
    }
  };

  HotUpdatePayload::Error {
    err: HotUpdateError {
      message: diagnostic.message.clone(),
      frame,
      stack: String::new(),
      id: diagnostic.file_name.clone(),
      loc: ErrorLocation {
        file: diagnostic.file_name.clone(),
        line: range.start_line,
        column: range.start_column,
      },
    },
  }
}
