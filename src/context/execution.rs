//! 单次运行的执行上下文（宏观记忆）
//!
//! 由编排器在 execute_goal 开始时创建，运行中通过 start_milestone / complete_milestone 更新，
//! 在每一条终止路径上调用 teardown：共享变量、最近操作、屏幕快照、最后错误被清空，
//! 已完成里程碑保留为 ContextAudit 供审计日志使用。

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::EnvironmentSnapshot;
use crate::model::Step;

/// 里程碑日志默认容量（超出后丢弃最旧的记录）
pub const DEFAULT_MILESTONE_CAPACITY: usize = 50;
/// 最近操作摘要队列长度
const MAX_RECENT_ACTIONS: usize = 10;
/// 注入执行器 prompt 时展示的最近里程碑 / 操作条数
const INJECTION_TAIL: usize = 3;

/// 里程碑记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneRecord {
    pub step_id: u32,
    pub description: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub result: Option<String>,
}

impl MilestoneRecord {
    fn start(step: &Step) -> Self {
        Self {
            step_id: step.id,
            description: step.description.clone(),
            started_at: Utc::now(),
            ended_at: None,
            success: false,
            result: None,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0))
            .unwrap_or(0)
    }
}

/// 单条操作摘要（由执行器写入，用于跨步骤衔接）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSummary {
    pub action: String,
    pub result: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// teardown 后保留的持久摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextAudit {
    pub context_id: String,
    pub goal_text: String,
    pub created_at: DateTime<Utc>,
    pub torn_down_at: DateTime<Utc>,
    pub milestones: Vec<MilestoneRecord>,
    pub total_milestones: u32,
    pub successful_milestones: u32,
    pub failed_milestones: u32,
    pub total_retries: u32,
}

impl ContextAudit {
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Context [{}] {} milestones ({} ok, {} failed, {} retries)\n",
            self.context_id,
            self.total_milestones,
            self.successful_milestones,
            self.failed_milestones,
            self.total_retries
        );
        for m in &self.milestones {
            out.push_str(&format!(
                "  {} step {}: {}\n",
                if m.success { "ok  " } else { "fail" },
                m.step_id,
                m.description
            ));
        }
        out
    }
}

#[derive(Debug)]
pub struct ExecutionContext {
    context_id: String,
    goal_text: String,
    created_at: DateTime<Utc>,
    milestone_log: VecDeque<MilestoneRecord>,
    milestone_capacity: usize,
    current_milestone: Option<MilestoneRecord>,
    shared_variables: HashMap<String, Value>,
    recent_actions: VecDeque<ActionSummary>,
    last_snapshot: Option<EnvironmentSnapshot>,
    last_error: Option<String>,
    in_recovery_mode: bool,
    total_retries: u32,
    total_milestones: u32,
    successful_milestones: u32,
    failed_milestones: u32,
}

impl ExecutionContext {
    pub fn new(goal_text: impl Into<String>) -> Self {
        Self::with_capacity(goal_text, DEFAULT_MILESTONE_CAPACITY)
    }

    pub fn with_capacity(goal_text: impl Into<String>, milestone_capacity: usize) -> Self {
        let mut context_id = uuid::Uuid::new_v4().simple().to_string();
        context_id.truncate(8);
        let goal_text = goal_text.into();
        tracing::info!(context_id = %context_id, "Execution context created: {}", goal_text);
        Self {
            context_id,
            goal_text,
            created_at: Utc::now(),
            milestone_log: VecDeque::new(),
            milestone_capacity: milestone_capacity.max(1),
            current_milestone: None,
            shared_variables: HashMap::new(),
            recent_actions: VecDeque::new(),
            last_snapshot: None,
            last_error: None,
            in_recovery_mode: false,
            total_retries: 0,
            total_milestones: 0,
            successful_milestones: 0,
            failed_milestones: 0,
        }
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn goal_text(&self) -> &str {
        &self.goal_text
    }

    // ---------- 里程碑 ----------

    pub fn start_milestone(&mut self, step: &Step) {
        self.current_milestone = Some(MilestoneRecord::start(step));
        self.total_milestones += 1;
        tracing::debug!(
            context_id = %self.context_id,
            step_id = step.id,
            "Milestone started: {}",
            step.description
        );
    }

    /// 结束当前里程碑并写入日志；没有进行中的里程碑时忽略
    pub fn complete_milestone(&mut self, result: impl Into<String>, success: bool) {
        let Some(mut record) = self.current_milestone.take() else {
            return;
        };
        let result = result.into();
        record.ended_at = Some(Utc::now());
        record.success = success;
        if success {
            self.successful_milestones += 1;
            self.in_recovery_mode = false;
        } else {
            self.failed_milestones += 1;
            self.last_error = Some(result.clone());
            self.in_recovery_mode = true;
        }
        record.result = Some(result);

        self.milestone_log.push_back(record);
        while self.milestone_log.len() > self.milestone_capacity {
            self.milestone_log.pop_front();
        }
    }

    pub fn current_milestone(&self) -> Option<&MilestoneRecord> {
        self.current_milestone.as_ref()
    }

    pub fn milestones(&self) -> impl Iterator<Item = &MilestoneRecord> {
        self.milestone_log.iter()
    }

    /// 已完成（成功）里程碑摘要，供 Re-plan 使用
    pub fn completed_milestones_summary(&self) -> String {
        let done: Vec<&MilestoneRecord> = self.milestone_log.iter().filter(|m| m.success).collect();
        if done.is_empty() {
            return "No completed milestones yet".to_string();
        }
        let mut out = String::from("### Completed Milestones\n");
        for m in done {
            out.push_str(&format!("{}. {}\n", m.step_id, m.description));
            if let Some(result) = &m.result {
                out.push_str(&format!("   Result: {}\n", truncate(result, 100)));
            }
        }
        out
    }

    // ---------- 共享变量 ----------

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        tracing::debug!(context_id = %self.context_id, "Shared variable set: {} = {}", key, value);
        self.shared_variables.insert(key, value);
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.shared_variables.get(key)
    }

    /// 按类型读取共享变量；不存在或类型不符时为 None
    pub fn variable_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.shared_variables
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn shared_variables(&self) -> &HashMap<String, Value> {
        &self.shared_variables
    }

    // ---------- 操作摘要与屏幕状态（由执行器写入） ----------

    pub fn add_action_summary(
        &mut self,
        action: impl Into<String>,
        result: impl Into<String>,
        success: bool,
    ) {
        self.recent_actions.push_back(ActionSummary {
            action: action.into(),
            result: result.into(),
            success,
            timestamp: Utc::now(),
        });
        while self.recent_actions.len() > MAX_RECENT_ACTIONS {
            self.recent_actions.pop_front();
        }
    }

    pub fn recent_actions(&self) -> impl Iterator<Item = &ActionSummary> {
        self.recent_actions.iter()
    }

    /// 执行器每轮观察后调用：更新快照、记录操作、切换恢复模式
    pub fn update_from_execution(
        &mut self,
        snapshot: Option<EnvironmentSnapshot>,
        action: Option<String>,
        success: bool,
    ) {
        if let Some(action) = action {
            let note = snapshot
                .as_ref()
                .map(|s| s.prompt_note())
                .unwrap_or_default();
            self.add_action_summary(action, note, success);
        }
        if snapshot.is_some() {
            self.last_snapshot = snapshot;
        }
        self.in_recovery_mode = !success;
    }

    pub fn record_snapshot(&mut self, snapshot: EnvironmentSnapshot) {
        self.last_snapshot = Some(snapshot);
    }

    pub fn last_snapshot(&self) -> Option<&EnvironmentSnapshot> {
        self.last_snapshot.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn in_recovery_mode(&self) -> bool {
        self.in_recovery_mode
    }

    pub fn record_retry(&mut self) {
        self.total_retries += 1;
    }

    pub fn total_retries(&self) -> u32 {
        self.total_retries
    }

    /// 供执行器拼入 system prompt 的「前情提要」：总目标、进度、最近里程碑、当前任务、最近操作、恢复提示
    pub fn context_injection(&self) -> String {
        let mut out = String::new();
        out.push_str("## Overall Goal\n");
        out.push_str(&self.goal_text);
        out.push_str("\n\n## Current Progress\n");
        out.push_str(&format!(
            "Completed {}/{} milestones, success {}, failed {}\n\n",
            self.milestone_log.len(),
            self.total_milestones,
            self.successful_milestones,
            self.failed_milestones
        ));

        if !self.milestone_log.is_empty() {
            out.push_str("### Completed\n");
            let start = self.milestone_log.len().saturating_sub(INJECTION_TAIL);
            for m in self.milestone_log.iter().skip(start) {
                out.push_str(&format!(
                    "- [{}] step {}: {}\n",
                    if m.success { "ok" } else { "failed" },
                    m.step_id,
                    m.description
                ));
            }
            out.push('\n');
        }

        if let Some(current) = &self.current_milestone {
            out.push_str("### Current Task\n");
            out.push_str(&format!("Step {} {}\n\n", current.step_id, current.description));
        }

        if !self.recent_actions.is_empty() {
            out.push_str("### Recent Actions\n");
            let start = self.recent_actions.len().saturating_sub(INJECTION_TAIL);
            for a in self.recent_actions.iter().skip(start) {
                out.push_str(&format!(
                    "- [{}] {}\n",
                    if a.success { "ok" } else { "failed" },
                    a.action
                ));
            }
            out.push('\n');
        }

        if self.in_recovery_mode {
            if let Some(err) = &self.last_error {
                out.push_str("### Note\n");
                out.push_str(&format!(
                    "Last step failed: {}\nTry a different strategy for the current task\n\n",
                    truncate(err, 100)
                ));
            }
        }
        out
    }

    pub fn execution_summary(&self) -> String {
        let mut out = String::from("## Execution Summary\n");
        out.push_str(&format!("- Context ID: {}\n", self.context_id));
        out.push_str(&format!("- Goal: {}\n", self.goal_text));
        out.push_str(&format!("- Total Steps: {}\n", self.total_milestones));
        out.push_str(&format!(
            "- Success: {} Failed: {}\n",
            self.successful_milestones, self.failed_milestones
        ));
        out.push_str(&format!("- Total Retries: {}\n", self.total_retries));
        if let Some(snapshot) = &self.last_snapshot {
            out.push_str(&format!(
                "- Current State: {}\n",
                truncate(&snapshot.prompt_note(), 80)
            ));
        }
        out
    }

    /// 清理瞬时数据并返回持久摘要。可重复调用。
    pub fn teardown(&mut self) -> ContextAudit {
        tracing::info!(context_id = %self.context_id, "Tearing down execution context");
        self.shared_variables.clear();
        self.recent_actions.clear();
        self.current_milestone = None;
        self.last_snapshot = None;
        self.last_error = None;
        self.in_recovery_mode = false;

        ContextAudit {
            context_id: self.context_id.clone(),
            goal_text: self.goal_text.clone(),
            created_at: self.created_at,
            torn_down_at: Utc::now(),
            milestones: self.milestone_log.iter().cloned().collect(),
            total_milestones: self.total_milestones,
            successful_milestones: self.successful_milestones,
            failed_milestones: self.failed_milestones,
            total_retries: self.total_retries,
        }
    }

    /// 瞬时数据是否已清空
    pub fn is_cleared(&self) -> bool {
        self.shared_variables.is_empty()
            && self.recent_actions.is_empty()
            && self.current_milestone.is_none()
            && self.last_snapshot.is_none()
            && self.last_error.is_none()
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let head: String = s.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepType;

    fn step(id: u32, desc: &str) -> Step {
        let mut s = Step::new(desc, StepType::Complex);
        s.id = id;
        s
    }

    #[test]
    fn test_milestone_lifecycle_updates_counters() {
        let mut ctx = ExecutionContext::new("send a message");
        ctx.start_milestone(&step(1, "open app"));
        assert!(ctx.current_milestone().is_some());
        ctx.complete_milestone("opened", true);
        ctx.start_milestone(&step(2, "find chat"));
        ctx.complete_milestone("not found", false);

        assert!(ctx.current_milestone().is_none());
        assert_eq!(ctx.milestones().count(), 2);
        assert_eq!(ctx.last_error(), Some("not found"));
        assert!(ctx.in_recovery_mode());
        let summary = ctx.completed_milestones_summary();
        assert!(summary.contains("1. open app"));
        assert!(!summary.contains("find chat"));
    }

    #[test]
    fn test_complete_without_start_is_ignored() {
        let mut ctx = ExecutionContext::new("g");
        ctx.complete_milestone("stray", false);
        assert_eq!(ctx.milestones().count(), 0);
        assert!(ctx.last_error().is_none());
    }

    #[test]
    fn test_milestone_log_is_bounded() {
        let mut ctx = ExecutionContext::with_capacity("g", 3);
        for i in 1..=5 {
            ctx.start_milestone(&step(i, "s"));
            ctx.complete_milestone("ok", true);
        }
        let ids: Vec<u32> = ctx.milestones().map(|m| m.step_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(ctx.teardown().total_milestones, 5);
    }

    #[test]
    fn test_recent_actions_are_bounded() {
        let mut ctx = ExecutionContext::new("g");
        for i in 0..15 {
            ctx.add_action_summary(format!("a{i}"), "r", true);
        }
        assert_eq!(ctx.recent_actions().count(), MAX_RECENT_ACTIONS);
        assert_eq!(ctx.recent_actions().next().map(|a| a.action.as_str()), Some("a5"));
    }

    #[test]
    fn test_typed_variables() {
        let mut ctx = ExecutionContext::new("g");
        ctx.set_variable("contact", "Zhang San");
        ctx.set_variable("count", 3);
        assert_eq!(ctx.variable_as::<String>("contact").as_deref(), Some("Zhang San"));
        assert_eq!(ctx.variable_as::<u32>("count"), Some(3));
        assert_eq!(ctx.variable_as::<u32>("contact"), None);
        assert!(ctx.variable("missing").is_none());
    }

    #[test]
    fn test_teardown_clears_transient_state_and_keeps_audit() {
        let mut ctx = ExecutionContext::new("g");
        ctx.set_variable("k", "v");
        ctx.record_snapshot(EnvironmentSnapshot::from_description("desktop"));
        ctx.start_milestone(&step(1, "open"));
        ctx.complete_milestone("failed to open", false);
        ctx.record_retry();
        ctx.start_milestone(&step(1, "open"));

        let audit = ctx.teardown();
        assert!(ctx.is_cleared());
        assert!(ctx.shared_variables().is_empty());
        assert!(ctx.last_error().is_none());
        assert!(!ctx.in_recovery_mode());
        assert_eq!(audit.milestones.len(), 1);
        assert_eq!(audit.total_retries, 1);
        assert!(audit.summary().contains("step 1: open"));

        // 重复 teardown 不出错
        let again = ctx.teardown();
        assert_eq!(again.milestones.len(), 1);
    }

    #[test]
    fn test_injection_mentions_recovery_note() {
        let mut ctx = ExecutionContext::new("book a flight");
        ctx.start_milestone(&step(1, "open site"));
        ctx.complete_milestone("site down", false);
        ctx.start_milestone(&step(2, "search flights"));
        let text = ctx.context_injection();
        assert!(text.contains("book a flight"));
        assert!(text.contains("Step 2 search flights"));
        assert!(text.contains("Last step failed: site down"));
    }

    #[test]
    fn test_update_from_execution_tracks_snapshot() {
        let mut ctx = ExecutionContext::new("g");
        ctx.update_from_execution(
            Some(EnvironmentSnapshot::from_description("login form")),
            Some("typed username".to_string()),
            true,
        );
        assert_eq!(
            ctx.last_snapshot().and_then(|s| s.description.as_deref()),
            Some("login form")
        );
        assert_eq!(ctx.recent_actions().count(), 1);
        assert!(ctx.execution_summary().contains("login form"));
    }
}
