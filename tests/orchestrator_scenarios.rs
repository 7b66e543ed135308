//! 编排器端到端场景：脚本规划器 + 脚本执行器

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use waypoint::context::ExecutionContext;
use waypoint::core::{Orchestrator, OrchestratorConfig, OrchestratorState};
use waypoint::events::{ChannelEventSink, WorkflowEvent, WorkflowEventSink};
use waypoint::executor::{ScriptedExecutor, ScriptedStep, StepExecutor};
use waypoint::model::{
    ExecutionOutcome, FailureReason, Plan, PlanStatus, Step, StepStatus, StepType,
};
use waypoint::planner::ScriptedPlanner;
use waypoint::voice::VoiceSummaryService;
use waypoint::AgentError;

fn steps(names: &[&str]) -> Vec<Step> {
    names
        .iter()
        .map(|n| Step::new(*n, StepType::ExecuteWorkflow))
        .collect()
}

fn fail(reason: FailureReason) -> ExecutionOutcome {
    ExecutionOutcome::failed(format!("step failed with {}", reason), reason)
}

fn drain(rx: &mut UnboundedReceiver<WorkflowEvent>) -> Vec<WorkflowEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

struct PanickingSink;

impl WorkflowEventSink for PanickingSink {
    fn on_plan_created(&self, _plan: &Plan) {
        panic!("observer bug");
    }
    fn on_step_completed(&self, _plan: &Plan, _step: &Step) {
        panic!("observer bug");
    }
    fn on_plan_completed(&self, _plan: &Plan) {
        panic!("observer bug");
    }
}

struct PanickingExecutor;

#[async_trait]
impl StepExecutor for PanickingExecutor {
    async fn execute_step(
        &self,
        _step: &Step,
        _context: &mut ExecutionContext,
        _cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, AgentError> {
        panic!("executor crashed");
    }
}

struct FixedVoice {
    text: &'static str,
    delay: Duration,
}

#[async_trait]
impl VoiceSummaryService for FixedVoice {
    async fn request_summary(&self, _: &str, _: u32, _: u64) -> Result<String, AgentError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.text.to_string())
    }
}

#[tokio::test]
async fn test_all_steps_succeed() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2", "s3"])));
    let exec = Arc::new(ScriptedExecutor::new().then_succeed(3));
    let orch = Orchestrator::builder(planner.clone(), exec.clone()).build();

    let result = orch.execute_goal("G1").await;

    assert!(result.success);
    assert!(!result.partial);
    let plan = result.plan.expect("plan");
    assert_eq!(plan.status(), PlanStatus::Completed);
    assert!(plan.steps().iter().all(|s| s.status == StepStatus::Succeeded));

    let snap = orch.snapshot();
    assert_eq!(snap.state, OrchestratorState::Completed);
    assert_eq!(snap.total_steps_executed, 3);
    assert_eq!(snap.total_steps_failed, 0);
    assert_eq!(exec.call_count(), 3);
    assert_eq!(planner.progress(), vec![(1, true), (2, true), (3, true)]);
    assert!(orch.execution_summary().contains("Executed: 3 steps"));
}

#[tokio::test]
async fn test_element_not_found_twice_replans_and_new_plan_completes() {
    let planner = Arc::new(
        ScriptedPlanner::new()
            .then_plan(steps(&["Launch app", "Open settings", "Toggle option"]))
            .then_plan(steps(&["Search settings", "Toggle option"])),
    );
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_succeed(1)
            .then_outcome(fail(FailureReason::ElementNotFound))
            .then_outcome(fail(FailureReason::ElementNotFound)),
    );
    let orch = Orchestrator::builder(planner.clone(), exec.clone()).build();

    let result = orch.execute_goal("G1").await;

    assert!(result.success, "{}", result.message);
    let plan = result.plan.expect("plan");
    assert_eq!(plan.len(), 2);
    assert_eq!(plan.status(), PlanStatus::Completed);

    // 第一次失败重试同一步，第二次失败后 Re-plan
    let calls: Vec<String> = exec.calls().into_iter().map(|(_, d)| d).collect();
    assert_eq!(
        calls,
        vec![
            "Launch app",
            "Open settings",
            "Open settings",
            "Search settings",
            "Toggle option",
        ]
    );

    let goals = planner.goals();
    assert_eq!(goals.len(), 2);
    assert!(goals[1].starts_with("G1\n\n"));
    assert!(goals[1].contains("Step 2"));
    assert!(goals[1].contains("Open settings"));
    assert!(goals[1].contains("ELEMENT_NOT_FOUND"));
    assert!(goals[1].contains("Launch app"));

    let snap = orch.snapshot();
    assert_eq!(snap.replans, 1);
    assert_eq!(snap.total_steps_failed, 2);
    assert_eq!(snap.consecutive_failures, 0);
    assert_eq!(orch.last_context_audit().expect("audit").total_retries, 1);
}

#[tokio::test]
async fn test_replan_without_steps_fails_with_diagnostic() {
    let planner = Arc::new(
        ScriptedPlanner::new()
            .then_plan(steps(&["Click send", "Verify sent"]))
            .then_plan(Vec::new()),
    );
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_outcome(fail(FailureReason::ClickMissed))
            .then_outcome(fail(FailureReason::ClickMissed)),
    );
    let (sink, mut rx) = ChannelEventSink::channel();
    let orch = Orchestrator::builder(planner.clone(), exec.clone())
        .with_event_sink(Arc::new(sink))
        .build();

    let result = orch.execute_goal("send a message").await;

    assert!(!result.success);
    assert!(!result.partial);
    assert!(result.message.contains("replanning failed"), "{}", result.message);
    assert!(result.message.contains("replan produced no steps"));
    assert!(result.message.contains("FAILED: step failed with CLICK_MISSED"));
    assert!(result.message.contains("Failure reason: CLICK_MISSED"));
    let plan = result.plan.expect("plan");
    assert_eq!(plan.status(), PlanStatus::Failed);
    assert_eq!(plan.steps()[0].description, "Click send");
    assert_eq!(exec.call_count(), 2);
    assert_eq!(planner.goals().len(), 2);
    assert!(!orch.has_active_context());
    assert_eq!(orch.state(), OrchestratorState::Failed);

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::TaskExecutionException { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::PlanFailed { .. })));
}

#[tokio::test]
async fn test_replan_planner_error_fails_with_diagnostic() {
    let planner = Arc::new(
        ScriptedPlanner::new()
            .then_plan(steps(&["Click send", "Verify sent"]))
            .then_error("model offline"),
    );
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_outcome(fail(FailureReason::ClickMissed))
            .then_outcome(fail(FailureReason::ClickMissed)),
    );
    let (sink, mut rx) = ChannelEventSink::channel();
    let orch = Orchestrator::builder(planner, exec.clone())
        .with_event_sink(Arc::new(sink))
        .build();

    let result = orch.execute_goal("send a message").await;

    assert!(!result.success);
    assert!(!result.partial);
    assert!(result.message.contains("replanning failed"), "{}", result.message);
    assert!(result.message.contains("model offline"));
    assert!(result.message.contains("Failure reason: CLICK_MISSED"));
    assert!(!result.message.contains("Execution error"));
    let plan = result.plan.expect("plan");
    assert_eq!(plan.status(), PlanStatus::Failed);
    assert_eq!(exec.call_count(), 2);
    assert!(!orch.has_active_context());

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::TaskExecutionException { .. })));
}

#[tokio::test]
async fn test_second_consecutive_failure_forces_replan() {
    let planner = Arc::new(
        ScriptedPlanner::new()
            .then_plan(steps(&["Click send", "Verify sent"]))
            .then_plan(steps(&["Retry sending", "Verify sent"])),
    );
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_outcome(fail(FailureReason::ClickMissed))
            .then_outcome(fail(FailureReason::ClickMissed)),
    );
    let orch = Orchestrator::builder(planner.clone(), exec.clone()).build();

    let result = orch.execute_goal("send a message").await;

    assert!(result.success, "{}", result.message);
    let calls = exec.calls();
    assert_eq!(calls.len(), 4);
    // 第一次失败重试同一步，第二次失败触发 Re-plan
    assert_eq!(calls[0], (1, "Click send".to_string()));
    assert_eq!(calls[1], (1, "Click send".to_string()));
    assert_eq!(calls[2], (1, "Retry sending".to_string()));
    assert_eq!(planner.goals().len(), 2);

    let audit = orch.last_context_audit().expect("audit");
    assert_eq!(audit.total_retries, 1);
}

#[tokio::test]
async fn test_app_not_responding_aborts() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2", "s3"])));
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_succeed(1)
            .then_outcome(fail(FailureReason::AppNotResponding)),
    );
    let orch = Orchestrator::builder(planner, exec.clone()).build();

    let result = orch.execute_goal("G").await;

    assert!(!result.success);
    assert!(!result.partial);
    assert!(result.message.contains("step 2"), "{}", result.message);
    assert!(result.message.contains("FAILED: step failed with APP_NOT_RESPONDING"));
    assert!(result.message.contains("Failure reason: APP_NOT_RESPONDING"));
    let plan = result.plan.expect("plan");
    assert_eq!(plan.status(), PlanStatus::Failed);
    assert!(plan.failure_reason().unwrap_or_default().contains("aborted"));
    assert_eq!(plan.steps()[2].status, StepStatus::Pending);
    assert_eq!(exec.call_count(), 2);
    assert_eq!(orch.state(), OrchestratorState::Failed);
}

#[tokio::test]
async fn test_interrupt_mid_run_returns_partial() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2", "s3"])));
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_succeed(1)
            .then(ScriptedStep::UntilCancelled),
    );
    let orch = Arc::new(Orchestrator::builder(planner, exec.clone()).build());

    let runner = orch.clone();
    let handle = tokio::spawn(async move { runner.execute_goal("G").await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while exec.call_count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("second step never started");
    orch.interrupt();
    assert!(orch.is_interrupted());

    let result = handle.await.unwrap();
    assert!(result.partial);
    assert!(!result.success);
    let plan = result.plan.expect("plan");
    assert_eq!(plan.status(), PlanStatus::Failed);
    assert!(plan.failure_reason().unwrap_or_default().contains("interrupted"));
    assert_eq!(plan.steps()[0].status, StepStatus::Succeeded);
    assert_eq!(plan.steps()[1].status, StepStatus::Failed);
    assert_eq!(exec.call_count(), 2);
    assert_eq!(exec.interrupt_requests(), 1);
    assert_eq!(orch.state(), OrchestratorState::Failed);
    assert!(!orch.has_active_context());
    assert!(orch.last_context_audit().is_some());
}

#[tokio::test]
async fn test_empty_plan_fails_without_context() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(Vec::new()));
    let exec = Arc::new(ScriptedExecutor::new());
    let orch = Orchestrator::builder(planner, exec.clone()).build();

    let result = orch.execute_goal("G").await;

    assert!(!result.success);
    assert!(result.message.contains("Planning failed"));
    assert!(result.plan.is_none());
    assert!(!orch.has_active_context());
    assert_eq!(exec.call_count(), 0);
    assert_eq!(orch.state(), OrchestratorState::Failed);
}

#[tokio::test]
async fn test_replan_budget_bounds_the_run() {
    let planner = Arc::new(ScriptedPlanner::new());
    let mut exec = ScriptedExecutor::new();
    for _ in 0..10 {
        exec = exec.then_outcome(fail(FailureReason::ElementNotFound));
    }
    let exec = Arc::new(exec);
    let config = OrchestratorConfig {
        max_replans: Some(2),
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::builder(planner.clone(), exec.clone())
        .with_config(config)
        .build();

    let result = tokio::time::timeout(Duration::from_secs(5), orch.execute_goal("G"))
        .await
        .expect("run must terminate");

    assert!(!result.success);
    assert!(result.message.contains("replan budget"), "{}", result.message);
    // 每个计划：重试一次，第二次连续失败后 Re-plan
    assert_eq!(exec.call_count(), 6);
    assert_eq!(planner.goals().len(), 3);
    assert_eq!(orch.snapshot().replans, 2);
}

#[tokio::test]
async fn test_progress_never_decreases_within_a_plan() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2", "s3", "s4"])));
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_succeed(1)
            .then_outcome(fail(FailureReason::Other))
            .then_succeed(2),
    );
    let (sink, mut rx) = ChannelEventSink::channel();
    let orch = Orchestrator::builder(planner, exec)
        .with_event_sink(Arc::new(sink))
        .build();

    let result = orch.execute_goal("G").await;

    assert!(result.partial);
    assert!(result.message.contains("3/4 steps succeeded"), "{}", result.message);

    let mut last: HashMap<String, u32> = HashMap::new();
    let events = drain(&mut rx);
    assert!(!events.is_empty());
    for event in events {
        let (plan_id, progress) = match event {
            WorkflowEvent::StepStarted { plan_id, progress, .. }
            | WorkflowEvent::StepCompleted { plan_id, progress, .. }
            | WorkflowEvent::StepFailed { plan_id, progress, .. }
            | WorkflowEvent::PlanCompleted { plan_id, progress }
            | WorkflowEvent::PlanFailed { plan_id, progress, .. } => (plan_id, progress),
            _ => continue,
        };
        let prev = last.entry(plan_id).or_insert(0);
        assert!(progress >= *prev, "progress went from {} to {}", prev, progress);
        *prev = progress;
    }
}

#[tokio::test]
async fn test_unclassified_failure_on_first_step_aborts() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2"])));
    let exec = Arc::new(
        ScriptedExecutor::new().then_outcome(ExecutionOutcome::unclassified("something odd")),
    );
    let orch = Orchestrator::builder(planner, exec.clone()).build();

    let result = orch.execute_goal("G").await;

    // 1/1 失败率超过 50%
    assert!(!result.success);
    assert!(result.message.contains("step 1"));
    assert_eq!(exec.call_count(), 1);
}

#[tokio::test]
async fn test_context_is_torn_down_after_success() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2"])));
    let exec = Arc::new(ScriptedExecutor::new());
    let orch = Orchestrator::builder(planner, exec).build();

    assert!(orch.last_context_audit().is_none());
    let result = orch.execute_goal("G").await;

    assert!(result.success);
    assert!(!orch.has_active_context());
    let audit = orch.last_context_audit().expect("audit");
    assert_eq!(audit.goal_text, "G");
    assert_eq!(audit.total_milestones, 2);
    assert_eq!(audit.successful_milestones, 2);
    assert_eq!(audit.milestones.len(), 2);
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1"])));
    let exec = Arc::new(ScriptedExecutor::new());
    let orch = Orchestrator::builder(planner.clone(), exec).build();
    orch.execute_goal("G").await;
    orch.interrupt();

    for _ in 0..3 {
        orch.reset();
        let snap = orch.snapshot();
        assert_eq!(snap.state, OrchestratorState::Idle);
        assert!(snap.plan.is_none());
        assert_eq!(snap.total_steps_executed, 0);
        assert_eq!(snap.total_steps_failed, 0);
        assert_eq!(snap.consecutive_failures, 0);
        assert_eq!(snap.replans, 0);
        assert!(orch.current_plan().is_none());
        assert!(!orch.is_interrupted());
        assert!(!orch.has_active_context());
        assert!(orch.last_context_audit().is_none());
    }
    assert_eq!(planner.history_clears(), 3);
}

#[tokio::test]
async fn test_reset_is_ignored_while_run_is_active() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2"])));
    let exec = Arc::new(ScriptedExecutor::new().then(ScriptedStep::UntilCancelled));
    let orch = Arc::new(Orchestrator::builder(planner.clone(), exec.clone()).build());

    let runner = orch.clone();
    let handle = tokio::spawn(async move { runner.execute_goal("G").await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while exec.call_count() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first step never started");

    orch.reset();
    assert_eq!(orch.state(), OrchestratorState::Executing);
    assert!(orch.current_plan().is_some());
    assert!(orch.has_active_context());
    assert_eq!(planner.history_clears(), 0);

    orch.interrupt();
    let result = handle.await.unwrap();
    assert!(result.partial);

    orch.reset();
    assert_eq!(orch.state(), OrchestratorState::Idle);
    assert_eq!(planner.history_clears(), 1);
}

#[tokio::test]
async fn test_stale_interrupt_is_cleared_before_run() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1"])));
    let orch = Orchestrator::builder(planner, Arc::new(ScriptedExecutor::new())).build();

    orch.interrupt();
    assert_eq!(orch.state(), OrchestratorState::Failed);

    let result = orch.execute_goal("G").await;
    assert!(result.success);
    assert!(!orch.is_interrupted());
}

#[tokio::test]
async fn test_executor_fatal_error_is_caught() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2"])));
    let exec = Arc::new(
        ScriptedExecutor::new()
            .then_succeed(1)
            .then(ScriptedStep::Fatal("out of memory".into())),
    );
    let (sink, mut rx) = ChannelEventSink::channel();
    let orch = Orchestrator::builder(planner, exec)
        .with_event_sink(Arc::new(sink))
        .build();

    let result = orch.execute_goal("G").await;

    assert!(!result.success);
    assert!(result.message.contains("Execution error"));
    assert!(result.message.contains("out of memory"));
    let plan = result.plan.expect("plan");
    assert_eq!(plan.status(), PlanStatus::Failed);
    assert!(!orch.has_active_context());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::TaskExecutionException { plan_id: Some(id), .. } if *id == plan.id
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, WorkflowEvent::PlanFailed { .. })));
}

#[tokio::test]
async fn test_executor_panic_is_caught() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1"])));
    let orch = Orchestrator::builder(planner, Arc::new(PanickingExecutor)).build();

    let result = orch.execute_goal("G").await;

    assert!(!result.success);
    assert!(result.message.contains("executor crashed"), "{}", result.message);
    assert!(!orch.has_active_context());
    assert_eq!(orch.state(), OrchestratorState::Failed);
}

#[tokio::test]
async fn test_planner_error_is_caught() {
    let planner = Arc::new(ScriptedPlanner::new().then_error("model offline"));
    let (sink, mut rx) = ChannelEventSink::channel();
    let orch = Orchestrator::builder(planner, Arc::new(ScriptedExecutor::new()))
        .with_event_sink(Arc::new(sink))
        .build();

    let result = orch.execute_goal("G").await;

    assert!(!result.success);
    assert!(result.plan.is_none());
    assert!(result.message.contains("model offline"));
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        WorkflowEvent::TaskExecutionException { plan_id: None, .. }
    )));
}

#[tokio::test]
async fn test_panicking_observer_does_not_abort_run() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1", "s2"])));
    let orch = Orchestrator::builder(planner, Arc::new(ScriptedExecutor::new()))
        .with_event_sink(Arc::new(PanickingSink))
        .build();

    let result = orch.execute_goal("G").await;
    assert!(result.success);
}

#[tokio::test]
async fn test_step_timeout_yields_timeout_failure_and_retry() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["slow", "fast"])));
    let exec = Arc::new(ScriptedExecutor::new().then(ScriptedStep::Delayed(
        Duration::from_secs(30),
        ExecutionOutcome::succeeded("too late"),
    )));
    let config = OrchestratorConfig {
        step_timeout: Some(Duration::from_millis(50)),
        ..OrchestratorConfig::default()
    };
    let orch = Orchestrator::builder(planner, exec.clone())
        .with_config(config)
        .build();

    let result = tokio::time::timeout(Duration::from_secs(5), orch.execute_goal("G"))
        .await
        .expect("timeout must bound the step");

    assert!(result.success, "{}", result.message);
    let calls = exec.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0].0, calls[1].0);
    assert_eq!(orch.last_context_audit().expect("audit").total_retries, 1);
}

#[tokio::test]
async fn test_complexity_aware_recovery_skips_simple_step() {
    let plan_steps = vec![
        Step::new("Dismiss banner", StepType::VerifyState).with_complexity(1),
        Step::new("Open inbox", StepType::NavigateTo),
    ];
    let planner = Arc::new(ScriptedPlanner::new().then_plan(plan_steps));
    let exec = Arc::new(ScriptedExecutor::new().then_outcome(fail(FailureReason::ElementNotFound)));
    let mut config = OrchestratorConfig::default();
    config.recovery.complexity_aware = true;
    let orch = Orchestrator::builder(planner.clone(), exec)
        .with_config(config)
        .build();

    let result = orch.execute_goal("G").await;

    assert!(result.success, "{}", result.message);
    let plan = result.plan.expect("plan");
    assert_eq!(plan.steps()[0].status, StepStatus::Skipped);
    assert_eq!(plan.steps()[1].status, StepStatus::Succeeded);
    assert_eq!(planner.goals().len(), 1);
}

#[tokio::test]
async fn test_voice_announcement_is_delivered_after_completion() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1"])));
    let (sink, mut rx) = ChannelEventSink::channel();
    let orch = Orchestrator::builder(planner, Arc::new(ScriptedExecutor::new()))
        .with_event_sink(Arc::new(sink))
        .with_voice_summary(Arc::new(FixedVoice {
            text: "\"All done\"\n",
            delay: Duration::from_millis(10),
        }))
        .build();

    assert!(orch.execute_goal("G").await.success);

    let text = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Some(WorkflowEvent::VoiceAnnouncement { text }) => break text,
                Some(_) => continue,
                None => panic!("sink closed"),
            }
        }
    })
    .await
    .expect("announcement");
    assert_eq!(text, "All done");
}

#[tokio::test]
async fn test_slow_voice_summary_does_not_block_result() {
    let planner = Arc::new(ScriptedPlanner::new().then_plan(steps(&["s1"])));
    let orch = Orchestrator::builder(planner, Arc::new(ScriptedExecutor::new()))
        .with_voice_summary(Arc::new(FixedVoice {
            text: "Done",
            delay: Duration::from_secs(60),
        }))
        .build();

    let result = tokio::time::timeout(Duration::from_secs(2), orch.execute_goal("G"))
        .await
        .expect("voice summary must not block");
    assert!(result.success);
}

#[tokio::test]
async fn test_concurrent_runs_are_serialised() {
    let planner = Arc::new(
        ScriptedPlanner::new()
            .then_plan(steps(&["a1", "a2"]))
            .then_plan(steps(&["b1", "b2"])),
    );
    let mut exec = ScriptedExecutor::new();
    for _ in 0..4 {
        exec = exec.then(ScriptedStep::Delayed(
            Duration::from_millis(20),
            ExecutionOutcome::succeeded("done"),
        ));
    }
    let exec = Arc::new(exec);
    let orch = Arc::new(Orchestrator::builder(planner, exec.clone()).build());

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.execute_goal("A").await })
    };
    let second = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.execute_goal("B").await })
    };
    assert!(first.await.unwrap().success);
    assert!(second.await.unwrap().success);

    let prefixes: Vec<char> = exec
        .calls()
        .iter()
        .filter_map(|(_, d)| d.chars().next())
        .collect();
    assert_eq!(prefixes.len(), 4);
    assert_eq!(prefixes[0], prefixes[1]);
    assert_eq!(prefixes[2], prefixes[3]);
    assert_ne!(prefixes[0], prefixes[2]);
}
