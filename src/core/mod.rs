//! 核心编排层：错误、恢复策略、状态投影、会话监管、主控循环

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use error::AgentError;
pub use orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult};
pub use recovery::{FailureContext, RecoveryDecision, RecoveryPolicy};
pub use session_supervisor::SessionSupervisor;
pub use state::{OrchestratorSnapshot, OrchestratorState};
