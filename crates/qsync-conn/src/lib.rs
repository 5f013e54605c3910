//! qsync-conn: tokio runtime layer for the sync subsystem.
//!
//! Owns the WebSocket connection lifecycle and the strictly serialized
//! event pipeline that feeds decoded frames and user actions through the
//! pure dispatcher in `qsync-core`.

pub mod manager;
pub mod pipeline;
pub mod sink;

pub use manager::{ConnectionConfig, ConnectionManager};
pub use pipeline::{EventPipeline, PipelineClosed, PipelineHandle, PipelineInput};
pub use sink::{NotificationSink, TracingSink, deliver};
