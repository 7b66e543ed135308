//! LLM 规划器：里程碑级 prompt + 回复解析 + 单步兜底
//!
//! 只关心「做什么」，不涉及坐标、点击等细节；历史只记录目标、计划规模与步骤进度。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::PlannerSection;
use crate::context::SnapshotProvider;
use crate::core::AgentError;
use crate::llm::{LlmClient, Message, Role};
use crate::model::{Plan, Step};
use crate::planner::{fallback_plan, parse, Planner};

/// history_summary 展示的条数
const HISTORY_SUMMARY_TAIL: usize = 10;

const PLANNER_SYSTEM_PROMPT: &str = r#"You are a strategic planner. Break the user's goal into milestone level steps.

## Constraints
1. No micro operations: never output coordinates, pixel positions or single clicks / key presses
2. Say what to do, not how to do it
3. Each step is a verifiable business milestone
4. Each step must include a Definition of Done ("dod") describing what is visible when it is finished

## Milestone types
- LAUNCH_APP: launch an application and wait until it is ready
- NAVIGATE_TO: navigate to a functional area (settings page, a chat, a folder)
- EXECUTE_WORKFLOW: run a complete business flow (fill a form and submit, edit and save)
- VERIFY_STATE: verify the current state (logged in, message sent)

## Complexity (1-5)
1 single obvious action, 2 two or three interactions, 3 four to six interactions,
4 multi-field forms or selections, 5 a full workflow with several sub steps

## Output
Only output JSON:
{"plan": [{"id": 1, "desc": "...", "type": "LAUNCH_APP", "dod": "...", "complexity": 1}]}
Usually 2-5 steps; do not fragment the work."#;

pub struct LlmPlanner {
    llm: Arc<dyn LlmClient>,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    settings: PlannerSection,
    history: Mutex<VecDeque<Message>>,
}

impl LlmPlanner {
    pub fn new(llm: Arc<dyn LlmClient>, settings: PlannerSection) -> Self {
        Self {
            llm,
            snapshots: None,
            settings,
            history: Mutex::new(VecDeque::new()),
        }
    }

    /// 配置屏幕采集器；未配置时 with_snapshot 无效
    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(provider);
        self
    }

    fn push_history(&self, msg: Message) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(msg);
        while history.len() > self.settings.history_limit.max(1) {
            history.pop_front();
        }
    }

    pub fn history_len(&self) -> usize {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// 最近 10 条规划历史
    pub fn history_summary(&self) -> String {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = String::from("## Planning History\n");
        let start = history.len().saturating_sub(HISTORY_SUMMARY_TAIL);
        for msg in history.iter().skip(start) {
            let who = match msg.role {
                Role::User => "user",
                Role::Assistant => "planner",
                Role::System => "system",
            };
            out.push_str(&format!("{}: {}\n", who, msg.content));
        }
        out
    }

    async fn build_user_prompt(&self, goal_text: &str, with_snapshot: bool) -> String {
        let mut prompt = format!("## User Goal\n{}\n\n", goal_text);
        if with_snapshot && self.settings.include_snapshot {
            if let Some(provider) = &self.snapshots {
                match provider.capture().await {
                    Ok(snapshot) => {
                        prompt.push_str("## Current Screen State\n");
                        prompt.push_str(&snapshot.prompt_note());
                        prompt.push_str("\nUse the current screen state when planning.\n\n");
                    }
                    Err(e) => {
                        tracing::warn!("Snapshot capture failed, planning without it: {}", e);
                    }
                }
            }
        }
        prompt.push_str("Please output the execution plan in JSON format");
        prompt
    }

    fn check_step_count(&self, plan: &Plan) {
        let n = plan.len();
        if n < self.settings.min_steps || n > self.settings.max_steps {
            tracing::debug!(
                plan_id = %plan.id,
                "Plan has {} steps, outside the suggested {}-{}",
                n,
                self.settings.min_steps,
                self.settings.max_steps
            );
        }
    }
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn generate_plan(&self, goal_text: &str, with_snapshot: bool) -> Result<Plan, AgentError> {
        tracing::info!("Planning goal: {}", goal_text);
        let user_prompt = self.build_user_prompt(goal_text, with_snapshot).await;
        let messages = vec![
            Message::system(PLANNER_SYSTEM_PROMPT),
            Message::user(user_prompt),
        ];

        let plan = match self.llm.complete(&messages).await {
            Ok(response) => {
                tracing::debug!("Planner response: {}", response);
                let steps = parse::parse_steps(&response);
                if steps.is_empty() {
                    tracing::warn!("No steps parsed from planner response, using single-step fallback");
                    fallback_plan(goal_text)
                } else {
                    Plan::with_steps(goal_text, steps)
                }
            }
            Err(e) => {
                tracing::error!("Planner LLM call failed, using single-step fallback: {}", e);
                fallback_plan(goal_text)
            }
        };

        self.check_step_count(&plan);
        self.push_history(Message::user(format!("Goal: {}", goal_text)));
        self.push_history(Message::assistant(format!("Plan: {} steps", plan.len())));

        tracing::info!(plan_id = %plan.id, "Plan generated with {} steps", plan.len());
        for step in plan.steps() {
            tracing::info!("   {} - {} [{}]", step.id, step.description, step.step_type);
        }
        Ok(plan)
    }

    fn update_plan_progress(&self, _plan: &Plan, step: &Step, success: bool) {
        let line = if success {
            format!("Step {} done: {}", step.id, step.description)
        } else {
            format!("Step {} failed: {}", step.id, step.description)
        };
        tracing::info!("{}", line);
        self.push_history(Message::assistant(line));
    }

    fn clear_history(&self) {
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        tracing::info!("Planner history cleared");
    }
}
