pub mod actor;
mod bridge;
pub mod service;

mod domain;
pub use domain::{config, project};

pub mod paths;
pub mod session;

pub use actor::{
  DEFAULT_WINDOW, QueueError,
  handle::SendError,
  message::{ChangeEvent, CompileTask, PendingChangeBatch},
};
pub use bridge::{Bridge, BridgeError, BridgeOptions};
pub use service::{
  cache::ArtifactCache,
  compile::{Compiler, Recompiler},
  diagnostics::{ErrorLocation, HotUpdateError, HotUpdatePayload, code_frame, format_diagnostic},
  hash_gate::{GateDecision, HashGate},
  host::{BuildHost, HotModule, ModuleNode, importable_modules},
  transform::{CommandJsxTransform, JsxTransform, TransformError},
};
pub use session::{DaemonCommand, DaemonSession, SessionError, SessionState};

#[cfg(test)]
mod __tests__;
