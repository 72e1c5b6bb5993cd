use serde::{Deserialize, Deserializer, Serialize};

/// Severity reported by the F# compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Severity {
  Error,
  Warning,
  Info,
  Other,
}

impl Severity {
  pub fn as_str(&self) -> &'static str {
    match self {
      Severity::Error => "Error",
      Severity::Warning => "Warning",
      Severity::Info => "Info",
      Severity::Other => "Other",
    }
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Severity::Error)
  }
}

impl std::fmt::Display for Severity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

impl std::str::FromStr for Severity {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.to_lowercase().as_str() {
      "error" => Severity::Error,
      "warning" => Severity::Warning,
      "info" => Severity::Info,
      _ => Severity::Other,
    })
  }
}

impl<'de> Deserialize<'de> for Severity {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw.parse().unwrap_or(Severity::Other))
  }
}

/// Half-open source range: start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
  pub start_line: u32,
  pub start_column: u32,
  pub end_line: u32,
  pub end_column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
  pub severity: Severity,
  /// Compiler error code, e.g. `FS0039`
  #[serde(rename = "errorNumberText", default)]
  pub code: String,
  pub message: String,
  pub file_name: String,
  pub range: Range,
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use super::*;

  #[test]
  fn test_diagnostic_wire_shape() {
    let diagnostic: Diagnostic = serde_json::from_value(json!({
      "severity": "error",
      "errorNumberText": "FS0039",
      "message": "The value 'x' is not defined.",
      "fileName": "/src/App.fs",
      "range": {"startLine": 3, "startColumn": 8, "endLine": 3, "endColumn": 9}
    }))
    .unwrap();

    assert_eq!(
      diagnostic,
      Diagnostic {
        severity: Severity::Error,
        code: "FS0039".to_string(),
        message: "The value 'x' is not defined.".to_string(),
        file_name: "/src/App.fs".to_string(),
        range: Range {
          start_line: 3,
          start_column: 8,
          end_line: 3,
          end_column: 9,
        },
      }
    );
  }

  #[test]
  fn test_unknown_severity_is_other() {
    let severity: Severity = serde_json::from_value(json!("Hidden")).unwrap();
    assert_eq!(severity, Severity::Other);
    let severity: Severity = serde_json::from_value(json!("WARNING")).unwrap();
    assert_eq!(severity, Severity::Warning);
  }
}
