//! 脚本规划器：按顺序返回预设计划（测试与演示用）
//!
//! 预设用尽后返回单步兜底计划；也可以预设 Err 来模拟规划器内部错误。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::AgentError;
use crate::model::{Plan, Step};
use crate::planner::{fallback_plan, Planner};

/// 一次预设的规划结果
enum Scripted {
    Steps(Vec<Step>),
    Error(String),
}

#[derive(Default)]
pub struct ScriptedPlanner {
    script: Mutex<VecDeque<Scripted>>,
    goals: Mutex<Vec<String>>,
    progress: Mutex<Vec<(u32, bool)>>,
    history_clears: Mutex<usize>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一份计划（可以为空，用于模拟违约的规划器）
    pub fn then_plan(self, steps: Vec<Step>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Steps(steps));
        self
    }

    pub fn then_error(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Scripted::Error(message.into()));
        self
    }

    /// 收到的所有目标文本（含 Re-plan 附带的上下文）
    pub fn goals(&self) -> Vec<String> {
        self.goals.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// (step_id, success) 进度回调记录
    pub fn progress(&self) -> Vec<(u32, bool)> {
        self.progress.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn history_clears(&self) -> usize {
        *self.history_clears.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn generate_plan(&self, goal_text: &str, _with_snapshot: bool) -> Result<Plan, AgentError> {
        self.goals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(goal_text.to_string());
        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(Scripted::Steps(steps)) => Ok(Plan::with_steps(goal_text, steps)),
            Some(Scripted::Error(message)) => Err(AgentError::PlannerFailed(message)),
            None => Ok(fallback_plan(goal_text)),
        }
    }

    fn update_plan_progress(&self, _plan: &Plan, step: &Step, success: bool) {
        self.progress
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((step.id, success));
    }

    fn clear_history(&self) {
        *self.history_clears.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }
}
