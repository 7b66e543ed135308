//! 执行上下文：单次目标运行的有界工作记忆

pub mod execution;
pub mod snapshot;

pub use execution::{
    ActionSummary, ContextAudit, ExecutionContext, MilestoneRecord, DEFAULT_MILESTONE_CAPACITY,
};
pub use snapshot::{EnvironmentSnapshot, SnapshotProvider};
