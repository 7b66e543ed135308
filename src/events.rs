//! 运行事件：计划创建、步骤开始/完成/失败、计划结束、异常与语音播报
//!
//! 编排器通过 WorkflowEventSink 通知观察者；观察者 panic 会被记录并忽略，不影响运行。

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::model::{Plan, Step};

/// 可序列化的事件（前端或日志用）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    PlanCreated {
        plan_id: String,
        goal: String,
        total_steps: usize,
    },
    StepStarted {
        plan_id: String,
        step_id: u32,
        description: String,
        progress: u32,
    },
    StepCompleted {
        plan_id: String,
        step_id: u32,
        progress: u32,
    },
    StepFailed {
        plan_id: String,
        step_id: u32,
        message: String,
        progress: u32,
    },
    PlanCompleted {
        plan_id: String,
        progress: u32,
    },
    PlanFailed {
        plan_id: String,
        reason: String,
        progress: u32,
    },
    /// 顶层捕获的异常
    TaskExecutionException {
        message: String,
        plan_id: Option<String>,
    },
    VoiceAnnouncement {
        text: String,
    },
}

/// 观察者接口；默认实现全部为空
pub trait WorkflowEventSink: Send + Sync {
    fn on_plan_created(&self, _plan: &Plan) {}
    fn on_step_started(&self, _plan: &Plan, _step: &Step) {}
    fn on_step_completed(&self, _plan: &Plan, _step: &Step) {}
    fn on_step_failed(&self, _plan: &Plan, _step: &Step, _message: &str) {}
    fn on_plan_completed(&self, _plan: &Plan) {}
    fn on_plan_failed(&self, _plan: &Plan, _reason: &str) {}
    fn on_task_execution_exception(&self, _message: &str, _plan_id: Option<&str>) {}
    fn on_voice_announcement(&self, _text: &str) {}
}

/// 调用观察者；panic 只记日志
pub fn notify_guarded<F>(sink: &dyn WorkflowEventSink, event: &'static str, f: F)
where
    F: FnOnce(&dyn WorkflowEventSink),
{
    if catch_unwind(AssertUnwindSafe(|| f(sink))).is_err() {
        tracing::warn!(event, "Event sink panicked, ignoring");
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl WorkflowEventSink for NoopEventSink {}

/// 转发到 mpsc 通道；接收端已关闭时静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self { tx }
    }

    /// 创建 sink 与对应的接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkflowEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    fn send(&self, event: WorkflowEvent) {
        let _ = self.tx.send(event);
    }
}

impl WorkflowEventSink for ChannelEventSink {
    fn on_plan_created(&self, plan: &Plan) {
        self.send(WorkflowEvent::PlanCreated {
            plan_id: plan.id.clone(),
            goal: plan.goal_text.clone(),
            total_steps: plan.len(),
        });
    }

    fn on_step_started(&self, plan: &Plan, step: &Step) {
        self.send(WorkflowEvent::StepStarted {
            plan_id: plan.id.clone(),
            step_id: step.id,
            description: step.description.clone(),
            progress: plan.progress_percent(),
        });
    }

    fn on_step_completed(&self, plan: &Plan, step: &Step) {
        self.send(WorkflowEvent::StepCompleted {
            plan_id: plan.id.clone(),
            step_id: step.id,
            progress: plan.progress_percent(),
        });
    }

    fn on_step_failed(&self, plan: &Plan, step: &Step, message: &str) {
        self.send(WorkflowEvent::StepFailed {
            plan_id: plan.id.clone(),
            step_id: step.id,
            message: message.to_string(),
            progress: plan.progress_percent(),
        });
    }

    fn on_plan_completed(&self, plan: &Plan) {
        self.send(WorkflowEvent::PlanCompleted {
            plan_id: plan.id.clone(),
            progress: plan.progress_percent(),
        });
    }

    fn on_plan_failed(&self, plan: &Plan, reason: &str) {
        self.send(WorkflowEvent::PlanFailed {
            plan_id: plan.id.clone(),
            reason: reason.to_string(),
            progress: plan.progress_percent(),
        });
    }

    fn on_task_execution_exception(&self, message: &str, plan_id: Option<&str>) {
        self.send(WorkflowEvent::TaskExecutionException {
            message: message.to_string(),
            plan_id: plan_id.map(String::from),
        });
    }

    fn on_voice_announcement(&self, text: &str) {
        self.send(WorkflowEvent::VoiceAnnouncement {
            text: text.to_string(),
        });
    }
}

/// 把事件写进 tracing 日志（命令行默认使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl WorkflowEventSink for TracingEventSink {
    fn on_plan_created(&self, plan: &Plan) {
        tracing::info!(plan_id = %plan.id, steps = plan.len(), "Plan created");
    }

    fn on_step_started(&self, plan: &Plan, step: &Step) {
        tracing::info!(plan_id = %plan.id, step_id = step.id, "Step started: {}", step.description);
    }

    fn on_step_completed(&self, plan: &Plan, step: &Step) {
        tracing::info!(
            plan_id = %plan.id,
            step_id = step.id,
            progress = plan.progress_percent(),
            "Step completed"
        );
    }

    fn on_step_failed(&self, plan: &Plan, step: &Step, message: &str) {
        tracing::warn!(plan_id = %plan.id, step_id = step.id, "Step failed: {}", message);
    }

    fn on_plan_completed(&self, plan: &Plan) {
        tracing::info!(plan_id = %plan.id, "Plan completed");
    }

    fn on_plan_failed(&self, plan: &Plan, reason: &str) {
        tracing::warn!(plan_id = %plan.id, "Plan failed: {}", reason);
    }

    fn on_task_execution_exception(&self, message: &str, plan_id: Option<&str>) {
        tracing::error!(plan_id = plan_id.unwrap_or("-"), "Task execution exception: {}", message);
    }

    fn on_voice_announcement(&self, text: &str) {
        tracing::info!("Voice announcement: {}", text);
    }
}
