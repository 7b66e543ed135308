//! Waypoint - 目标编排引擎
//!
//! 把用户目标交给规划器拆成里程碑，逐个交给执行器完成，并按失败原因决定重试、跳过、继续、重新规划或中止。
//!
//! 模块划分：
//! - **model**: Plan / Step / ExecutionOutcome 等被动数据结构
//! - **context**: 单次运行的执行上下文（里程碑日志、共享变量、环境快照）
//! - **planner**: 规划器接口、LLM 规划器、回复解析与兜底、脚本规划器
//! - **executor**: 执行器接口、脚本执行器、空跑执行器
//! - **core**: 错误、恢复策略、状态投影、会话监管、编排器
//! - **events**: 运行事件与观察者
//! - **voice**: 完成后的语音摘要（后台任务）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **observability**: tracing 初始化

pub mod config;
pub mod context;
pub mod core;
pub mod events;
pub mod executor;
pub mod llm;
pub mod model;
pub mod observability;
pub mod planner;
pub mod voice;

pub use crate::core::{
    AgentError, Orchestrator, OrchestratorConfig, OrchestratorResult, OrchestratorState,
    RecoveryDecision,
};
pub use crate::model::{ExecutionOutcome, FailureReason, Plan, Step, StepStatus, StepType};
