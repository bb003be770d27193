//! Shared data model for the weft orchestration core.
//!
//! Every type here is inert: no I/O, no async, no registry mutation logic
//! beyond simple in-memory lookups. The components in `weft-core`,
//! `weft-providers`, `weft-tools` and `weft-memory` build behavior on top of
//! these shapes.

pub mod agent;
pub mod error;
pub mod graph;
pub mod memory;
pub mod persist;
pub mod scratchpad;
pub mod sink;
pub mod tool;
pub mod token_profile;

pub use agent::{Agent, AgentRegistry, AgentRegistryError};
pub use error::DispatchCause;
pub use graph::{
    EngineSelector, MergeDescriptor, PlanMetadata, ResultSlot, Subtask, SubtaskStatus, TaskGraph,
};
pub use memory::{MemoryRecord, MemoryRecordError, MemoryRecordHeader};
pub use persist::atomic_write;
pub use scratchpad::{strip_scratchpad, ScratchpadFilter};
pub use sink::{NullSink, OutputSink, RecordingSink, SinkEvent, SinkStatus};
pub use token_profile::TokenProfile;
pub use tool::{ToolParamSpec, ToolParamType, ToolSchema, ToolSchemaValidationError};
