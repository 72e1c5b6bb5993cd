//! Long-lived tasks of the compile pipeline
//!
//! Components communicate via message passing instead of shared state:
//!
//! ```text
//! AggregatorHandle ──ChangeEvent──▶ ChangeAggregator ──PendingChangeBatch──▶ dispatcher
//!                                                                        │
//!                                                      CompileQueue ◀────┘ (one job at a time)
//! ```
//!
//! - [`ChangeAggregator`]: debounces raw change events into batches
//! - [`CompileQueue`]: serializes every daemon conversation

mod aggregator;
pub mod handle;
pub mod message;
mod queue;

pub use aggregator::{ChangeAggregator, DEFAULT_WINDOW};
pub use queue::{CompileQueue, PendingResult, QueueError};
