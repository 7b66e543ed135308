//! 计划步骤（里程碑级）
//!
//! Step 只描述「做什么」，不描述「怎么做」：不包含坐标、点击等原子动作。
//! complexity 仅作参考，用于推导执行器的超时与内部重试预算。

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::PostMortem;

/// 未给出复杂度时的默认值
pub const DEFAULT_COMPLEXITY: u8 = 3;

/// 里程碑类型（高层语义指令）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// 启动并确保应用就绪
    LaunchApp,
    /// 导航至特定功能区
    NavigateTo,
    /// 执行完整业务流程（如填写表单并提交）
    ExecuteWorkflow,
    /// 验证当前状态
    VerifyState,
    /// 复杂操作（降级计划也用此类型）
    Complex,
    Unknown,
}

impl StepType {
    /// 大小写不敏感解析；兼容旧别名 OPEN_APP / NAVIGATE，其它一律 Unknown
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().replace(['-', ' '], "_").as_str() {
            "LAUNCH_APP" | "OPEN_APP" => StepType::LaunchApp,
            "NAVIGATE_TO" | "NAVIGATE" => StepType::NavigateTo,
            "EXECUTE_WORKFLOW" => StepType::ExecuteWorkflow,
            "VERIFY_STATE" => StepType::VerifyState,
            "COMPLEX" => StepType::Complex,
            _ => StepType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::LaunchApp => "LAUNCH_APP",
            StepType::NavigateTo => "NAVIGATE_TO",
            StepType::ExecuteWorkflow => "EXECUTE_WORKFLOW",
            StepType::VerifyState => "VERIFY_STATE",
            StepType::Complex => "COMPLEX",
            StepType::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 步骤状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    /// 摘要中使用的状态标记
    pub fn marker(&self) -> &'static str {
        match self {
            StepStatus::Pending => "[ ]",
            StepStatus::Running => "[~]",
            StepStatus::Succeeded => "[x]",
            StepStatus::Failed => "[!]",
            StepStatus::Skipped => "[-]",
        }
    }
}

/// 单个里程碑步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// 从 1 开始的顺序编号（由 Plan 分配）
    pub id: u32,
    pub description: String,
    pub step_type: StepType,
    /// 完成判定（Definition of Done）
    pub completion_criteria: Option<String>,
    /// 1..=5
    pub complexity: u8,
    pub status: StepStatus,
    /// 执行器参考超时（秒），由复杂度推导
    pub timeout_secs: u64,
    /// 执行器内部参考重试次数，由复杂度推导
    pub max_retries: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub result_summary: Option<String>,
    /// 最近一次失败的验尸报告
    pub post_mortem: Option<PostMortem>,
}

impl Step {
    pub fn new(description: impl Into<String>, step_type: StepType) -> Self {
        let mut step = Self {
            id: 0,
            description: description.into(),
            step_type,
            completion_criteria: None,
            complexity: DEFAULT_COMPLEXITY,
            status: StepStatus::Pending,
            timeout_secs: 0,
            max_retries: 0,
            started_at: None,
            ended_at: None,
            result_summary: None,
            post_mortem: None,
        };
        step.apply_complexity_budgets();
        step
    }

    pub fn with_completion_criteria(mut self, criteria: impl Into<String>) -> Self {
        let criteria = criteria.into();
        self.completion_criteria = if criteria.trim().is_empty() {
            None
        } else {
            Some(criteria)
        };
        self
    }

    /// 设置复杂度（截断到 1..=5）并重新推导超时与重试预算
    pub fn with_complexity(mut self, complexity: i64) -> Self {
        self.complexity = complexity.clamp(1, 5) as u8;
        self.apply_complexity_budgets();
        self
    }

    fn apply_complexity_budgets(&mut self) {
        let c = u64::from(self.complexity);
        self.timeout_secs = 30 * (c + 1);
        self.max_retries = 2 * u32::from(self.complexity) + 2;
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        self.ended_at = None;
    }

    pub fn mark_succeeded(&mut self, summary: impl Into<String>) {
        self.status = StepStatus::Succeeded;
        self.ended_at = Some(Utc::now());
        self.result_summary = Some(summary.into());
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, post_mortem: Option<PostMortem>) {
        self.status = StepStatus::Failed;
        self.ended_at = Some(Utc::now());
        self.result_summary = Some(reason.into());
        if post_mortem.is_some() {
            self.post_mortem = post_mortem;
        }
    }

    pub fn mark_skipped(&mut self) {
        self.status = StepStatus::Skipped;
        self.ended_at = Some(Utc::now());
    }

    /// 执行耗时（毫秒）；未开始或未结束时为 0
    pub fn elapsed_ms(&self) -> i64 {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0),
            _ => 0,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Step[{}]: {} ({:?})", self.id, self.description, self.status)
    }
}
