//! qsync-core: pure domain logic for the question-lifecycle sync subsystem.
//!
//! Frame decoding, the event dispatcher, the live-question registry, and
//! the connection/backoff state machines. No IO, no async, no clocks —
//! time is always passed in by the caller.

pub mod decode;
pub mod dispatch;
pub mod link;
pub mod registry;
pub mod types;
