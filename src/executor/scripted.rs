//! 脚本执行器：按顺序回放预设结果（测试用）
//!
//! 每次调用都会写入上下文（共享变量、操作摘要），便于验证 teardown 的清理效果。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::{EnvironmentSnapshot, ExecutionContext};
use crate::core::AgentError;
use crate::executor::StepExecutor;
use crate::model::{ExecutionOutcome, Step};

/// 一次预设的执行行为
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Outcome(ExecutionOutcome),
    /// 延迟后返回；期间被取消则返回 "interrupted"
    Delayed(Duration, ExecutionOutcome),
    /// 一直等到被取消
    UntilCancelled,
    /// 致命错误（Err）
    Fatal(String),
}

#[derive(Default)]
pub struct ScriptedExecutor {
    script: Mutex<VecDeque<ScriptedStep>>,
    calls: Mutex<Vec<(u32, String)>>,
    interrupted: AtomicBool,
    interrupt_requests: Mutex<usize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, step: ScriptedStep) -> Self {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(step);
        self
    }

    pub fn then_outcome(self, outcome: ExecutionOutcome) -> Self {
        self.then(ScriptedStep::Outcome(outcome))
    }

    /// 追加 n 次成功
    pub fn then_succeed(mut self, n: usize) -> Self {
        for _ in 0..n {
            self = self.then_outcome(ExecutionOutcome::succeeded("done"));
        }
        self
    }

    /// 每次调用的 (step_id, description)
    pub fn calls(&self) -> Vec<(u32, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn interrupt_requests(&self) -> usize {
        *self.interrupt_requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next(&self) -> ScriptedStep {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| ScriptedStep::Outcome(ExecutionOutcome::succeeded("done")))
    }
}

#[async_trait]
impl StepExecutor for ScriptedExecutor {
    async fn execute_step(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, AgentError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((step.id, step.description.clone()));
        context.set_variable(format!("step_{}_attempted", step.id), true);

        let outcome = match self.next() {
            ScriptedStep::Outcome(outcome) => outcome,
            ScriptedStep::Delayed(delay, outcome) => {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => outcome,
                    _ = cancel.cancelled() => ExecutionOutcome::unclassified("interrupted"),
                }
            }
            ScriptedStep::UntilCancelled => {
                cancel.cancelled().await;
                ExecutionOutcome::unclassified("interrupted")
            }
            ScriptedStep::Fatal(message) => return Err(AgentError::ExecutorFatal(message)),
        };

        context.update_from_execution(
            Some(EnvironmentSnapshot::from_description(format!(
                "screen after step {}",
                step.id
            ))),
            Some(step.description.clone()),
            outcome.is_success(),
        );
        Ok(outcome)
    }

    fn request_interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        *self.interrupt_requests.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}
