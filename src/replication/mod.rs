//! Replication orchestration
//!
//! [`ReplicationEngine`] drives a single image through existence check,
//! copy and retry; [`WorkScheduler`] runs the engine over a whole list with
//! bounded concurrency and owns the [`ReplicationRun`] aggregate.

pub mod engine;
pub mod outcome;
pub mod retry;
pub mod scheduler;

pub use engine::{EngineSettings, ImageState, ReplicationEngine, SkipPolicy};
pub use outcome::{CopyOutcome, CopyStatus, ImageRecord, ReplicationRun, RunTotals};
pub use retry::{RetryPolicy, RetryState};
pub use scheduler::WorkScheduler;
