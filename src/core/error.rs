//! 编排器错误类型
//!
//! 普通的步骤失败不走这里：它们以 `ExecutionOutcome { success: false, .. }` 返回并交给恢复策略。
//! AgentError 只表示「真正异常」的情况，由 `Orchestrator::execute_goal` 顶层统一捕获并转为失败结果。

use thiserror::Error;

/// 运行过程中可能出现的异常（规划器内部错误、执行器致命错误、LLM、配置等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 规划器无法恢复的内部错误（解析失败会走单步降级计划，不会到这里）
    #[error("Planner error: {0}")]
    PlannerFailed(String),

    /// 执行器的致命错误（如资源耗尽）；普通任务失败不应走此分支
    #[error("Executor fatal error: {0}")]
    ExecutorFatal(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// 环境快照（截图）采集失败
    #[error("Snapshot capture failed: {0}")]
    SnapshotFailed(String),

    #[error("Voice summary failed: {0}")]
    VoiceFailed(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<config::ConfigError> for AgentError {
    fn from(err: config::ConfigError) -> Self {
        AgentError::ConfigError(err.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        AgentError::JsonParseError(err.to_string())
    }
}
