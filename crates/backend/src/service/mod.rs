//! Compile pipeline services.
//!
//! - [`cache`] - source/dependent file sets and compiled code per file
//! - [`compile`] - full and incremental recompiles against the daemon
//! - [`diagnostics`] - log lines, code frames, hot-update error payloads
//! - [`hash_gate`] - skips triggers whose file bytes did not change
//! - [`completion`] - shared result cell for concurrent hot-update callers
//! - [`host`] - the build host contract
//! - [`transform`] - optional JSX pass over generated code

pub mod cache;
pub mod compile;
pub mod completion;
pub mod diagnostics;
pub mod hash_gate;
pub mod host;
pub mod transform;
