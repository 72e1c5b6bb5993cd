use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Diagnostic, IpcError};

/// Methods understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
  ProjectChanged,
  InitialCompile,
  Compile,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::ProjectChanged => "fable/project-changed",
      Method::InitialCompile => "fable/initial-compile",
      Method::Compile => "fable/compile",
    }
  }
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Typed request that knows its method and how to decode its success fields.
pub trait DaemonRequest: Serialize {
  const METHOD: Method;
  type Response;

  /// Decode the positional fields of a `Success` union case.
  fn decode(fields: Vec<serde_json::Value>) -> Result<Self::Response, IpcError>;

  /// JSON params for the request; `None` when the method takes none.
  fn params(&self) -> Result<Option<serde_json::Value>, IpcError> {
    match serde_json::to_value(self)? {
      serde_json::Value::Null => Ok(None),
      value => Ok(Some(value)),
    }
  }
}

fn take_field<T: DeserializeOwned>(
  fields: &mut [serde_json::Value],
  method: Method,
  index: usize,
  name: &'static str,
) -> Result<T, IpcError> {
  let value = fields.get_mut(index).map(serde_json::Value::take).ok_or(IpcError::MissingField {
    method: method.as_str(),
    index,
    name,
  })?;
  Ok(serde_json::from_value(value)?)
}

fn take_optional_field<T: DeserializeOwned + Default>(
  fields: &mut [serde_json::Value],
  index: usize,
) -> Result<T, IpcError> {
  match fields.get_mut(index).map(serde_json::Value::take) {
    None | Some(serde_json::Value::Null) => Ok(T::default()),
    Some(value) => Ok(serde_json::from_value(value)?),
  }
}

// ============================================================================
// fable/project-changed
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectChangedParams {
  /// `Debug` or `Release`
  pub configuration: String,
  pub project: String,
  pub fable_library: String,
  pub exclude: Vec<String>,
  pub no_reflection: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectChangedResult {
  pub source_files: Vec<String>,
  pub diagnostics: Vec<Diagnostic>,
  pub dependent_files: Vec<String>,
}

impl DaemonRequest for ProjectChangedParams {
  const METHOD: Method = Method::ProjectChanged;
  type Response = ProjectChangedResult;

  fn decode(mut fields: Vec<serde_json::Value>) -> Result<Self::Response, IpcError> {
    Ok(ProjectChangedResult {
      source_files: take_field(&mut fields, Self::METHOD, 0, "sourceFiles")?,
      diagnostics: take_optional_field(&mut fields, 1)?,
      dependent_files: take_optional_field(&mut fields, 2)?,
    })
  }
}

// ============================================================================
// fable/initial-compile
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct InitialCompileParams;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialCompileResult {
  /// Generated code keyed by source path
  pub files: BTreeMap<String, String>,
}

impl DaemonRequest for InitialCompileParams {
  const METHOD: Method = Method::InitialCompile;
  type Response = InitialCompileResult;

  fn decode(mut fields: Vec<serde_json::Value>) -> Result<Self::Response, IpcError> {
    Ok(InitialCompileResult {
      files: take_field(&mut fields, Self::METHOD, 0, "compiledFiles")?,
    })
  }
}

// ============================================================================
// fable/compile
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileParams {
  pub file_names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompileResult {
  pub files: BTreeMap<String, String>,
  pub diagnostics: Vec<Diagnostic>,
}

impl DaemonRequest for CompileParams {
  const METHOD: Method = Method::Compile;
  type Response = CompileResult;

  fn decode(mut fields: Vec<serde_json::Value>) -> Result<Self::Response, IpcError> {
    Ok(CompileResult {
      files: take_field(&mut fields, Self::METHOD, 0, "compiledFiles")?,
      diagnostics: take_optional_field(&mut fields, 1)?,
    })
  }
}
