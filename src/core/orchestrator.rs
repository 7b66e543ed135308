//! 目标编排器：主控循环
//!
//! 负责：向 Planner 要计划、把每个里程碑交给 Executor、按恢复策略处理失败（重试/跳过/继续/重新规划/中止），
//! 并保证每一条终止路径都会 teardown 执行上下文。
//!
//! 单次运行的全部可变状态保存在 RunState 中随循环传递；对外只通过 watch 通道发布 OrchestratorSnapshot。
//! 同一实例上的并发 execute_goal 由 run_lock 串行化。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::context::{ContextAudit, ExecutionContext, DEFAULT_MILESTONE_CAPACITY};
use crate::core::builder::OrchestratorBuilder;
use crate::core::recovery::{FailureContext, RecoveryDecision, RecoveryPolicy};
use crate::core::{AgentError, OrchestratorSnapshot, OrchestratorState, SessionSupervisor};
use crate::events::{notify_guarded, WorkflowEventSink};
use crate::executor::StepExecutor;
use crate::model::{ExecutionOutcome, FailureReason, Plan, Step, StepStatus};
use crate::planner::Planner;
use crate::voice::{spawn_voice_summary, VoiceSummaryService};

/// 编排器参数（由 [orchestrator] / [planner] / [voice] 配置段推导）
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub recovery: RecoveryPolicy,
    /// 单次运行的 Re-plan 上限；None 表示不限
    pub max_replans: Option<u32>,
    /// 单步超时；None 表示无限等待执行器
    pub step_timeout: Option<Duration>,
    pub milestone_log_capacity: usize,
    pub include_snapshot: bool,
    pub voice_summary: bool,
    pub voice_max_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl OrchestratorConfig {
    pub fn from_app_config(cfg: &AppConfig) -> Self {
        let o = &cfg.orchestrator;
        Self {
            recovery: RecoveryPolicy::from_config(o),
            max_replans: o.max_replans,
            step_timeout: o.step_timeout_secs.map(Duration::from_secs),
            milestone_log_capacity: if o.milestone_log_capacity == 0 {
                DEFAULT_MILESTONE_CAPACITY
            } else {
                o.milestone_log_capacity
            },
            include_snapshot: cfg.planner.include_snapshot,
            voice_summary: o.voice_summary,
            voice_max_chars: cfg.voice.max_chars,
        }
    }
}

/// execute_goal 的结果
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    pub success: bool,
    /// 部分完成（被中断，或有步骤失败但循环走完）
    pub partial: bool,
    pub message: String,
    pub plan: Option<Plan>,
    pub elapsed_ms: u64,
}

impl OrchestratorResult {
    fn success(message: impl Into<String>, plan: Option<Plan>) -> Self {
        Self {
            success: true,
            partial: false,
            message: message.into(),
            plan,
            elapsed_ms: 0,
        }
    }

    fn failure(message: impl Into<String>, plan: Option<Plan>) -> Self {
        Self {
            success: false,
            partial: false,
            message: message.into(),
            plan,
            elapsed_ms: 0,
        }
    }

    fn partial(message: impl Into<String>, plan: Option<Plan>) -> Self {
        Self {
            success: false,
            partial: true,
            message: message.into(),
            plan,
            elapsed_ms: 0,
        }
    }
}

/// 单次运行的状态：计划、上下文与计数器
struct RunState {
    goal_text: String,
    plan: Option<Plan>,
    context: ExecutionContext,
    consecutive_failures: u32,
    total_steps_executed: u32,
    total_steps_failed: u32,
    replans: u32,
    started: Instant,
    /// 计划完成后需要发起语音摘要
    announce: bool,
}

impl RunState {
    fn new(goal_text: &str, milestone_capacity: usize) -> Self {
        Self {
            goal_text: goal_text.to_string(),
            plan: None,
            context: ExecutionContext::with_capacity(goal_text, milestone_capacity),
            consecutive_failures: 0,
            total_steps_executed: 0,
            total_steps_failed: 0,
            replans: 0,
            started: Instant::now(),
            announce: false,
        }
    }

    fn plan_mut(&mut self) -> Result<&mut Plan, AgentError> {
        self.plan
            .as_mut()
            .ok_or_else(|| AgentError::InvalidInput("no active plan".into()))
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn snapshot(&self, state: OrchestratorState, interrupted: bool) -> OrchestratorSnapshot {
        OrchestratorSnapshot {
            state,
            plan: self.plan.clone(),
            consecutive_failures: self.consecutive_failures,
            total_steps_executed: self.total_steps_executed,
            total_steps_failed: self.total_steps_failed,
            replans: self.replans,
            interrupted,
        }
    }
}

/// Re-plan 的结果
enum ReplanOutcome {
    Replaced,
    Failed(String),
}

pub struct Orchestrator {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    sink: Arc<dyn WorkflowEventSink>,
    voice: Option<Arc<dyn VoiceSummaryService>>,
    config: OrchestratorConfig,
    supervisor: SessionSupervisor,
    run_lock: tokio::sync::Mutex<()>,
    snapshot_tx: watch::Sender<OrchestratorSnapshot>,
    last_audit: Mutex<Option<ContextAudit>>,
    active_context: AtomicBool,
}

impl Orchestrator {
    pub fn builder(planner: Arc<dyn Planner>, executor: Arc<dyn StepExecutor>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(planner, executor)
    }

    pub(crate) fn from_parts(
        planner: Arc<dyn Planner>,
        executor: Arc<dyn StepExecutor>,
        sink: Arc<dyn WorkflowEventSink>,
        voice: Option<Arc<dyn VoiceSummaryService>>,
        config: OrchestratorConfig,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(OrchestratorSnapshot::default());
        Self {
            planner,
            executor,
            sink,
            voice,
            config,
            supervisor: SessionSupervisor::new(),
            run_lock: tokio::sync::Mutex::new(()),
            snapshot_tx,
            last_audit: Mutex::new(None),
            active_context: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ---------- 对外查询 ----------

    pub fn state(&self) -> OrchestratorState {
        self.snapshot_tx.borrow().state
    }

    pub fn current_plan(&self) -> Option<Plan> {
        self.snapshot_tx.borrow().plan.clone()
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// 订阅状态快照（每次状态转换后更新）
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn execution_summary(&self) -> String {
        let snap = self.snapshot_tx.borrow();
        let mut out = String::from("Execution Summary\n");
        out.push_str(&format!("State: {}\n", snap.state));
        out.push_str(&format!("Executed: {} steps\n", snap.total_steps_executed));
        out.push_str(&format!("Failed: {} steps\n", snap.total_steps_failed));
        out.push_str(&format!("Replans: {}\n", snap.replans));
        if let Some(plan) = &snap.plan {
            out.push('\n');
            out.push_str(&plan.summary());
        }
        out
    }

    /// 最近一次 teardown 保留下来的里程碑摘要
    pub fn last_context_audit(&self) -> Option<ContextAudit> {
        self.last_audit
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn has_active_context(&self) -> bool {
        self.active_context.load(Ordering::SeqCst)
    }

    // ---------- 中断与重置 ----------

    /// 请求中断当前运行（协作式：循环顶部与执行器调用前后检查）
    pub fn interrupt(&self) {
        self.supervisor.interrupt();
        self.executor.request_interrupt();
        self.snapshot_tx.send_modify(|s| {
            s.state = OrchestratorState::Failed;
            s.interrupted = true;
        });
        tracing::warn!("Orchestrator received interrupt signal");
    }

    pub fn is_interrupted(&self) -> bool {
        self.supervisor.is_interrupted()
    }

    /// 回到 IDLE：清空计划、上下文与计数器，清除中断标志，清空规划器历史
    ///
    /// 运行进行中时不做任何事（先 `interrupt()` 并等待 `execute_goal` 返回）
    pub fn reset(&self) {
        let Ok(_guard) = self.run_lock.try_lock() else {
            tracing::warn!("Reset ignored: a run is active");
            return;
        };
        self.supervisor.clear();
        self.executor.clear_interrupt();
        self.snapshot_tx.send_replace(OrchestratorSnapshot::default());
        *self.last_audit.lock().unwrap_or_else(|e| e.into_inner()) = None;
        self.planner.clear_history();
        tracing::info!("Orchestrator reset");
    }

    // ---------- 主流程 ----------

    /// 执行一个目标直到完成、失败或被中断。总会返回确定的结果，且执行上下文总会被 teardown。
    pub async fn execute_goal(&self, goal_text: &str) -> OrchestratorResult {
        let _guard = self.run_lock.lock().await;

        if self.supervisor.is_interrupted() {
            tracing::info!("Clearing interrupt left over from a previous run");
        }
        let cancel = self.supervisor.renew();
        self.executor.clear_interrupt();

        tracing::info!("Executing goal: {}", goal_text);
        let mut run = RunState::new(goal_text, self.config.milestone_log_capacity);
        self.active_context.store(true, Ordering::SeqCst);

        let caught = AssertUnwindSafe(self.run_loop(&mut run, &cancel))
            .catch_unwind()
            .await;
        let mut result = match caught {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => self.handle_exception(&mut run, e.to_string()),
            Err(panic) => self.handle_exception(&mut run, panic_message(panic.as_ref())),
        };

        self.teardown(&mut run);

        result.elapsed_ms = run.elapsed_ms();
        let final_state = if result.success {
            OrchestratorState::Completed
        } else {
            OrchestratorState::Failed
        };
        self.publish(final_state, &run);

        if run.announce {
            self.announce(&run);
        }
        tracing::info!(
            success = result.success,
            partial = result.partial,
            elapsed_ms = result.elapsed_ms,
            "Goal finished: {}",
            result.message
        );
        result
    }

    async fn run_loop(
        &self,
        run: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<OrchestratorResult, AgentError> {
        // 1. 规划
        self.publish(OrchestratorState::Planning, run);
        let plan = self
            .planner
            .generate_plan(&run.goal_text, self.config.include_snapshot)
            .await?;
        if plan.is_empty() {
            tracing::error!("Planning failed: planner returned no steps");
            return Ok(OrchestratorResult::failure(
                "Planning failed: no steps generated",
                None,
            ));
        }
        notify_guarded(self.sink.as_ref(), "plan_created", |s| s.on_plan_created(&plan));
        self.start_plan(run, plan);

        // 2. 执行
        loop {
            if self.interrupted(cancel) {
                return Ok(self.finish_interrupted(run));
            }

            let Some(step) = run.plan_mut()?.current_step_mut().map(|s| {
                s.mark_running();
                s.clone()
            }) else {
                break;
            };
            let plan_len = run.plan.as_ref().map(Plan::len).unwrap_or(0);
            tracing::info!(step_id = step.id, "Executing step {}/{}: {}", step.id, plan_len, step.description);

            run.context.start_milestone(&step);
            if let Some(plan) = &run.plan {
                notify_guarded(self.sink.as_ref(), "step_started", |s| s.on_step_started(plan, &step));
            }
            self.publish(OrchestratorState::Executing, run);

            let outcome = self.execute_step(&step, &mut run.context, cancel).await?;

            if self.interrupted(cancel) {
                return Ok(self.finish_interrupted(run));
            }
            run.total_steps_executed += 1;
            run.context
                .complete_milestone(outcome.message(), outcome.is_success());

            if outcome.is_success() {
                self.on_step_success(run, &outcome)?;
                continue;
            }

            let step = self.on_step_failure(run, &outcome)?;

            if run.consecutive_failures >= self.config.recovery.max_consecutive_failures {
                tracing::warn!(
                    consecutive = run.consecutive_failures,
                    "Consecutive failure limit reached, replanning"
                );
                let replanned = self.replan(run, &step, &outcome).await;
                match replanned {
                    ReplanOutcome::Replaced => continue,
                    ReplanOutcome::Failed(why) => {
                        return Ok(self.finish_replan_failed(run, &step, &outcome, &why))
                    }
                }
            }

            let decision = self.config.recovery.decide(&FailureContext {
                failure_reason: outcome.failure_reason(),
                consecutive_failures: run.consecutive_failures,
                total_steps_failed: run.total_steps_failed,
                total_steps_executed: run.total_steps_executed,
                step_complexity: step.complexity,
            });
            tracing::info!(step_id = step.id, decision = %decision, "Recovery decision");

            match decision {
                RecoveryDecision::RetryStep => {
                    run.context.record_retry();
                }
                RecoveryDecision::SkipStep => {
                    let plan = run.plan_mut()?;
                    if let Some(s) = plan.current_step_mut() {
                        s.mark_skipped();
                    }
                    plan.advance();
                }
                RecoveryDecision::Continue => {
                    run.plan_mut()?.advance();
                }
                RecoveryDecision::Replan => {
                    let replanned = self.replan(run, &step, &outcome).await;
                    if let ReplanOutcome::Failed(why) = replanned {
                        return Ok(self.finish_replan_failed(run, &step, &outcome, &why));
                    }
                }
                RecoveryDecision::Abort => return Ok(self.finish_aborted(run, &step, &outcome)),
            }
        }

        // 3. 收尾
        Ok(self.finish_plan(run))
    }

    fn interrupted(&self, cancel: &CancellationToken) -> bool {
        self.supervisor.is_interrupted() || cancel.is_cancelled() || self.executor.is_interrupted()
    }

    fn start_plan(&self, run: &mut RunState, mut plan: Plan) {
        plan.mark_started();
        tracing::info!(plan_id = %plan.id, "Plan ready with {} steps", plan.len());
        run.plan = Some(plan);
        run.consecutive_failures = 0;
        self.publish(OrchestratorState::Executing, run);
    }

    async fn execute_step(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, AgentError> {
        let call = self.executor.execute_step(step, context, cancel.clone());
        let Some(limit) = self.config.step_timeout else {
            return call.await;
        };
        match tokio::time::timeout(limit, call).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(step_id = step.id, "Step timed out after {:?}", limit);
                Ok(ExecutionOutcome::failed(
                    format!("Step timed out after {}s", limit.as_secs()),
                    FailureReason::Timeout,
                )
                .with_elapsed_ms(limit.as_millis() as u64))
            }
        }
    }

    fn on_step_success(&self, run: &mut RunState, outcome: &ExecutionOutcome) -> Result<(), AgentError> {
        run.consecutive_failures = 0;
        let plan = run.plan_mut()?;
        let Some(step) = plan.current_step_mut().map(|s| {
            s.mark_succeeded(outcome.message());
            s.clone()
        }) else {
            return Ok(());
        };
        tracing::info!(step_id = step.id, "Milestone reached: {}", outcome.message());
        self.planner.update_plan_progress(plan, &step, true);
        notify_guarded(self.sink.as_ref(), "step_completed", |s| s.on_step_completed(plan, &step));
        plan.advance();
        self.publish(OrchestratorState::StepSuccess, run);
        Ok(())
    }

    /// 记录失败并返回失败步骤的副本
    fn on_step_failure(&self, run: &mut RunState, outcome: &ExecutionOutcome) -> Result<Step, AgentError> {
        run.total_steps_failed += 1;
        run.consecutive_failures += 1;
        let plan = run.plan_mut()?;
        let step = plan
            .current_step_mut()
            .map(|s| {
                s.mark_failed(outcome.message(), outcome.post_mortem().cloned());
                s.clone()
            })
            .ok_or_else(|| AgentError::InvalidInput("failed step is no longer current".into()))?;
        tracing::warn!(step_id = step.id, "Milestone failed: {}", outcome.message());
        tracing::debug!("Executor feedback:\n{}", outcome.diagnostic_feedback());
        self.planner.update_plan_progress(plan, &step, false);
        notify_guarded(self.sink.as_ref(), "step_failed", |s| {
            s.on_step_failed(plan, &step, outcome.message())
        });
        self.publish(OrchestratorState::StepFailed, run);
        Ok(step)
    }

    /// 以失败上下文重新请求计划；成功时替换当前计划并清零连续失败
    async fn replan(&self, run: &mut RunState, failed: &Step, outcome: &ExecutionOutcome) -> ReplanOutcome {
        if let Some(max) = self.config.max_replans {
            if run.replans >= max {
                tracing::warn!(replans = run.replans, "Replan budget exhausted");
                return ReplanOutcome::Failed(format!("replan budget of {} exhausted", max));
            }
        }
        run.replans += 1;

        let replan_context = format!(
            "## Step {} of the previous plan failed\nDescription: {}\n\n## Post-mortem\n{}\n\n## Completed milestones\n{}\n\nPlease replan the remaining steps from the current screen state",
            failed.id,
            failed.description,
            outcome.diagnostic_feedback(),
            run.context.completed_milestones_summary()
        );
        let goal = format!("{}\n\n{}", run.goal_text, replan_context);
        tracing::info!(replans = run.replans, "Replanning after step {} failed", failed.id);

        let plan = match self.planner.generate_plan(&goal, self.config.include_snapshot).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!("Replan failed: {}", e);
                return ReplanOutcome::Failed(e.to_string());
            }
        };
        if plan.is_empty() {
            tracing::warn!("Replan produced no steps");
            return ReplanOutcome::Failed("replan produced no steps".into());
        }

        notify_guarded(self.sink.as_ref(), "plan_created", |s| s.on_plan_created(&plan));
        self.start_plan(run, plan);
        ReplanOutcome::Replaced
    }

    // ---------- 终止路径 ----------

    fn fail_plan(&self, run: &mut RunState, reason: &str) {
        if let Some(plan) = run.plan.as_mut() {
            if plan.mark_failed(reason) {
                notify_guarded(self.sink.as_ref(), "plan_failed", |s| s.on_plan_failed(plan, reason));
            }
        }
    }

    fn finish_interrupted(&self, run: &mut RunState) -> OrchestratorResult {
        tracing::warn!("Goal interrupted by user: {}", run.goal_text);
        if run.context.current_milestone().is_some() {
            run.context.complete_milestone("interrupted", false);
        }
        if let Some(step) = run.plan.as_mut().and_then(|p| p.current_step_mut()) {
            if step.status == StepStatus::Running {
                step.mark_failed("interrupted", None);
            }
        }
        self.fail_plan(run, "interrupted by user");
        let progress = run
            .plan
            .as_ref()
            .map(|p| format!("{}/{} steps succeeded", p.succeeded_count(), p.len()))
            .unwrap_or_else(|| "no plan".to_string());
        OrchestratorResult::partial(
            format!("Task interrupted by user ({})", progress),
            run.plan.clone(),
        )
    }

    fn finish_aborted(&self, run: &mut RunState, step: &Step, outcome: &ExecutionOutcome) -> OrchestratorResult {
        self.fail_plan(run, &format!("Recovery policy aborted: {}", outcome.message()));
        OrchestratorResult::failure(
            format!(
                "Task aborted after step {} failed: {}\n{}",
                step.id,
                outcome.message(),
                outcome.diagnostic_feedback()
            ),
            run.plan.clone(),
        )
    }

    fn finish_replan_failed(
        &self,
        run: &mut RunState,
        step: &Step,
        outcome: &ExecutionOutcome,
        why: &str,
    ) -> OrchestratorResult {
        self.fail_plan(run, &format!("Replan failed ({}): {}", why, outcome.message()));
        OrchestratorResult::failure(
            format!(
                "Task failed after step {} and replanning failed ({}): {}\n{}",
                step.id,
                why,
                outcome.message(),
                outcome.diagnostic_feedback()
            ),
            run.plan.clone(),
        )
    }

    fn finish_plan(&self, run: &mut RunState) -> OrchestratorResult {
        let elapsed_ms = run.elapsed_ms();
        let executed = run.total_steps_executed;
        let goal = run.goal_text.clone();
        let Some(plan) = run.plan.as_mut() else {
            return OrchestratorResult::success("Task completed", None);
        };

        if plan.is_complete() {
            plan.mark_completed();
            notify_guarded(self.sink.as_ref(), "plan_completed", |s| s.on_plan_completed(plan));
            tracing::info!("Goal completed in {}ms\n{}", elapsed_ms, run.context.execution_summary());
            run.announce = true;
            return OrchestratorResult::success(
                format!(
                    "Task completed: {} ({} steps executed, {}ms)",
                    goal, executed, elapsed_ms
                ),
                run.plan.clone(),
            );
        }

        if plan.has_failed() {
            let progress = format!("{}/{} steps succeeded", plan.succeeded_count(), plan.len());
            self.fail_plan(run, "some steps failed");
            return OrchestratorResult::partial(
                format!("Task partially completed: {}", progress),
                run.plan.clone(),
            );
        }

        plan.mark_completed();
        OrchestratorResult::success("Task completed", run.plan.clone())
    }

    fn handle_exception(&self, run: &mut RunState, error: String) -> OrchestratorResult {
        let message = format!("Execution error: {}", error);
        tracing::error!("{}", message);
        let plan_id = run.plan.as_ref().map(|p| p.id.clone());
        notify_guarded(self.sink.as_ref(), "task_execution_exception", |s| {
            s.on_task_execution_exception(&message, plan_id.as_deref())
        });
        self.fail_plan(run, &message);
        OrchestratorResult::failure(message, run.plan.clone())
    }

    fn teardown(&self, run: &mut RunState) {
        let audit = run.context.teardown();
        tracing::info!(
            context_id = %audit.context_id,
            "Context torn down: {}",
            audit.summary()
        );
        *self.last_audit.lock().unwrap_or_else(|e| e.into_inner()) = Some(audit);
        self.active_context.store(false, Ordering::SeqCst);
    }

    fn announce(&self, run: &RunState) {
        if !self.config.voice_summary {
            return;
        }
        let Some(voice) = &self.voice else {
            return;
        };
        // 不等待
        let _ = spawn_voice_summary(
            voice.clone(),
            self.sink.clone(),
            run.goal_text.clone(),
            run.total_steps_executed,
            run.elapsed_ms(),
            self.config.voice_max_chars,
        );
    }

    fn publish(&self, state: OrchestratorState, run: &RunState) {
        let snapshot = run.snapshot(state, self.supervisor.is_interrupted());
        tracing::debug!(state = %state, "Orchestrator state");
        self.snapshot_tx.send_replace(snapshot);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic: unknown payload".to_string()
    }
}
