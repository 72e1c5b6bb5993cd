//! Wire protocol for the Fable compiler daemon.
//!
//! The daemon speaks JSON-RPC 2.0 over its stdin/stdout, framed the same way
//! as the Language Server Protocol (`Content-Length` headers). Results are
//! F#-style discriminated unions: `{ "case": "Success", "fields": [...] }`.

mod codec;
mod diagnostic;
mod error;
mod method;
mod protocol;

pub use codec::{ContentLengthCodec, DEFAULT_MAX_FRAME};
pub use diagnostic::{Diagnostic, Range, Severity};
pub use error::{CodecError, IpcError};
pub use method::{
  CompileParams, CompileResult, DaemonRequest, InitialCompileParams, InitialCompileResult, Method,
  ProjectChangedParams, ProjectChangedResult,
};
pub use protocol::{Incoming, JSONRPC_VERSION, Notification, Request, Response, RpcError, UnionResult};
