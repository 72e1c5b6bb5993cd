use serde::{Deserialize, Serialize};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request<P = serde_json::Value> {
  pub jsonrpc: String,
  pub id: u64,
  pub method: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub params: Option<P>,
}

impl<P> Request<P> {
  pub fn new(id: u64, method: impl Into<String>, params: Option<P>) -> Self {
    Self {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id,
      method: method.into(),
      params,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response<R = serde_json::Value> {
  #[serde(default)]
  pub jsonrpc: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub result: Option<R>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<RpcError>,
}

impl<R> Response<R> {
  pub fn success(id: u64, result: R) -> Self {
    Self {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id: Some(id),
      result: Some(result),
      error: None,
    }
  }

  pub fn error(id: u64, code: i32, message: impl Into<String>) -> Self {
    Self {
      jsonrpc: JSONRPC_VERSION.to_string(),
      id: Some(id),
      result: None,
      error: Some(RpcError {
        code,
        message: message.into(),
      }),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
  pub code: i32,
  pub message: String,
}

/// A message the daemon sent without expecting a reply (log output, progress).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
  pub method: String,
  #[serde(default)]
  pub params: Option<serde_json::Value>,
}

/// Anything that can arrive on the daemon's stdout.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Incoming {
  Notification(Notification),
  Response(Response),
}

/// F# discriminated union as serialized by the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnionResult {
  pub case: String,
  #[serde(default)]
  pub fields: Vec<serde_json::Value>,
}

impl UnionResult {
  pub const SUCCESS: &'static str = "Success";

  pub fn success(fields: Vec<serde_json::Value>) -> Self {
    Self {
      case: Self::SUCCESS.to_string(),
      fields,
    }
  }

  pub fn failure(message: impl Into<String>) -> Self {
    Self {
      case: "Error".to_string(),
      fields: vec![serde_json::Value::String(message.into())],
    }
  }

  pub fn is_success(&self) -> bool {
    self.case == Self::SUCCESS
  }

  /// Success fields, or the daemon's failure message.
  pub fn into_result(self) -> Result<Vec<serde_json::Value>, String> {
    if self.is_success() {
      return Ok(self.fields);
    }
    let message = self
      .fields
      .into_iter()
      .next()
      .and_then(|field| match field {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Null | serde_json::Value::String(_) => None,
        other => Some(other.to_string()),
      })
      .unwrap_or_else(|| "Unknown error occurred".to_string());
    Err(message)
  }
}
