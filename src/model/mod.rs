//! 计划模型：Plan / Step / ExecutionOutcome 等被动数据结构

pub mod outcome;
pub mod plan;
pub mod step;

pub use outcome::{ExecutionOutcome, FailureReason, PostMortem};
pub use plan::{Plan, PlanStatus};
pub use step::{Step, StepStatus, StepType, DEFAULT_COMPLEXITY};
