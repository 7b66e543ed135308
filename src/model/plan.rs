//! 任务计划：一次目标尝试对应的有序里程碑列表
//!
//! 不变量：
//! - 步骤 id 从 1 开始顺序分配
//! - current_index 只前进不后退
//! - status 只走 NotStarted -> InProgress -> {Completed, Failed}，每个转换至多一次；
//!   Re-plan 产生新的 Plan 实例，不在旧实例上原地修改

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Step, StepStatus};

/// 计划状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub goal_text: String,
    steps: Vec<Step>,
    current_index: usize,
    status: PlanStatus,
    pub created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
}

impl Plan {
    pub fn new(goal_text: impl Into<String>) -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            goal_text: goal_text.into(),
            steps: Vec::new(),
            current_index: 0,
            status: PlanStatus::NotStarted,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            failure_reason: None,
        }
    }

    /// 以给定步骤构建计划（重新分配 id）
    pub fn with_steps(goal_text: impl Into<String>, steps: Vec<Step>) -> Self {
        let mut plan = Self::new(goal_text);
        plan.add_steps(steps);
        plan
    }

    /// 追加步骤，id 按顺序分配
    pub fn add_step(&mut self, mut step: Step) {
        step.id = self.steps.len() as u32 + 1;
        self.steps.push(step);
    }

    pub fn add_steps(&mut self, steps: impl IntoIterator<Item = Step>) {
        for step in steps {
            self.add_step(step);
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// 当前步骤；已走过最后一步时为 None
    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current_index)
    }

    pub fn current_step_mut(&mut self) -> Option<&mut Step> {
        self.steps.get_mut(self.current_index)
    }

    /// 前进到下一步，返回是否仍有当前步骤
    pub fn advance(&mut self) -> bool {
        if self.current_index < self.steps.len() {
            self.current_index += 1;
        }
        self.current_index < self.steps.len()
    }

    pub fn succeeded_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .count()
    }

    /// 已成功步骤占比（0.0..=1.0）
    pub fn completed_fraction(&self) -> f64 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.succeeded_count() as f64 / self.steps.len() as f64
    }

    pub fn progress_percent(&self) -> u32 {
        if self.steps.is_empty() {
            return 0;
        }
        (self.succeeded_count() * 100 / self.steps.len()) as u32
    }

    /// 所有步骤均成功或被跳过
    pub fn is_complete(&self) -> bool {
        !self.steps.is_empty()
            && self
                .steps
                .iter()
                .all(|s| matches!(s.status, StepStatus::Succeeded | StepStatus::Skipped))
    }

    pub fn has_failed(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }

    /// NotStarted -> InProgress；返回是否发生了转换
    pub fn mark_started(&mut self) -> bool {
        if self.status != PlanStatus::NotStarted {
            return false;
        }
        self.status = PlanStatus::InProgress;
        self.started_at = Some(Utc::now());
        tracing::info!(
            plan_id = %self.id,
            steps = self.steps.len(),
            "Plan started: {}",
            self.goal_text
        );
        true
    }

    /// InProgress -> Completed；返回是否发生了转换
    pub fn mark_completed(&mut self) -> bool {
        if self.status != PlanStatus::InProgress {
            return false;
        }
        self.status = PlanStatus::Completed;
        self.ended_at = Some(Utc::now());
        tracing::info!(plan_id = %self.id, "Plan completed");
        true
    }

    /// 非终态 -> Failed；返回是否发生了转换（已终态时保留最初的原因）
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let reason = reason.into();
        tracing::warn!(plan_id = %self.id, "Plan failed: {}", reason);
        self.status = PlanStatus::Failed;
        self.failure_reason = Some(reason);
        self.ended_at = Some(Utc::now());
        true
    }

    /// 人类可读的计划摘要：进度 + 步骤列表（当前步骤以 `->` 标注）
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Plan [{}] ({:?})\n", self.id, self.status));
        out.push_str(&format!("Goal: {}\n", self.goal_text));
        out.push_str(&format!("Progress: {}%\n", self.progress_percent()));
        if let Some(reason) = &self.failure_reason {
            out.push_str(&format!("Failure: {}\n", reason));
        }
        out.push_str("Steps:\n");
        for (idx, step) in self.steps.iter().enumerate() {
            let pointer = if idx == self.current_index { "->" } else { "  " };
            out.push_str(&format!(
                "{} {} {}. {}\n",
                pointer,
                step.status.marker(),
                step.id,
                step.description
            ));
        }
        out
    }
}
