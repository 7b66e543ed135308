//! 规划层：把目标拆成里程碑级 Plan
//!
//! 编排器只依赖 Planner trait；LLM 实现负责 prompt 构建与回复解析，脚本实现用于测试与演示。

pub mod llm;
pub mod parse;
pub mod scripted;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::model::{Plan, Step, StepType};

pub use llm::LlmPlanner;
pub use scripted::ScriptedPlanner;

/// 规划器接口
///
/// `generate_plan` 约定不返回空计划（内部兜底为单步计划）；Err 仅表示无法恢复的内部错误。
/// 进度回调与清空历史不返回结果，也不应 panic。
#[async_trait]
pub trait Planner: Send + Sync {
    async fn generate_plan(&self, goal_text: &str, with_snapshot: bool) -> Result<Plan, AgentError>;

    /// 步骤结束后的通知（仅用于规划器自身的历史记录）
    fn update_plan_progress(&self, _plan: &Plan, _step: &Step, _success: bool) {}

    fn clear_history(&self) {}
}

/// 兜底计划：唯一一步，描述即目标原文
pub fn fallback_plan(goal_text: &str) -> Plan {
    Plan::with_steps(goal_text, vec![Step::new(goal_text, StepType::Complex)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_plan_is_single_goal_step() {
        let plan = fallback_plan("Open the calculator");
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps()[0].description, "Open the calculator");
        assert_eq!(plan.steps()[0].step_type, StepType::Complex);
        assert_eq!(plan.steps()[0].id, 1);
    }
}
