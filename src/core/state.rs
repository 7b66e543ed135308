//! 状态定义：OrchestratorState 与对外发布的 OrchestratorSnapshot
//!
//! 编排器内部以单次运行的 RunState 驱动循环；观察者只看到通过 watch 通道发布的轻量快照。

use std::fmt;

use serde::Serialize;

use crate::model::Plan;

/// 编排器状态机
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrchestratorState {
    Idle,
    Planning,
    Executing,
    StepSuccess,
    StepFailed,
    Completed,
    Failed,
}

impl OrchestratorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Idle => "IDLE",
            OrchestratorState::Planning => "PLANNING",
            OrchestratorState::Executing => "EXECUTING",
            OrchestratorState::StepSuccess => "STEP_SUCCESS",
            OrchestratorState::StepFailed => "STEP_FAILED",
            OrchestratorState::Completed => "COMPLETED",
            OrchestratorState::Failed => "FAILED",
        }
    }

    /// 运行结束态（COMPLETED / FAILED）
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestratorState::Completed | OrchestratorState::Failed)
    }

    /// 运行中（PLANNING 到 STEP_FAILED）
    pub fn is_active(&self) -> bool {
        !self.is_terminal() && *self != OrchestratorState::Idle
    }
}

impl fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 观察者看到的「投影」状态：状态、计划副本与计数器
#[derive(Clone, Debug, Serialize)]
pub struct OrchestratorSnapshot {
    pub state: OrchestratorState,
    pub plan: Option<Plan>,
    pub consecutive_failures: u32,
    pub total_steps_executed: u32,
    pub total_steps_failed: u32,
    pub replans: u32,
    pub interrupted: bool,
}

impl Default for OrchestratorSnapshot {
    fn default() -> Self {
        Self {
            state: OrchestratorState::Idle,
            plan: None,
            consecutive_failures: 0,
            total_steps_executed: 0,
            total_steps_failed: 0,
            replans: 0,
            interrupted: false,
        }
    }
}

impl OrchestratorSnapshot {
    /// 当前计划进度百分比；无计划时为 0
    pub fn progress_percent(&self) -> u32 {
        self.plan.as_ref().map(|p| p.progress_percent()).unwrap_or(0)
    }
}
