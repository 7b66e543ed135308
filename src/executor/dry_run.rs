//! 空跑执行器：不操作屏幕，只记录日志并按完成判定报告成功（演示用）

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::core::AgentError;
use crate::executor::StepExecutor;
use crate::model::{ExecutionOutcome, FailureReason, PostMortem, Step};

pub struct DryRunExecutor {
    /// 每步模拟耗时
    step_delay: Duration,
    interrupted: AtomicBool,
}

impl DryRunExecutor {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            step_delay,
            interrupted: AtomicBool::new(false),
        }
    }
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self::new(Duration::from_millis(200))
    }
}

#[async_trait]
impl StepExecutor for DryRunExecutor {
    async fn execute_step(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, AgentError> {
        let start = Instant::now();
        tracing::info!(
            step_id = step.id,
            step_type = %step.step_type,
            complexity = step.complexity,
            "Dry run: {}",
            step.description
        );

        let cancelled = tokio::select! {
            _ = tokio::time::sleep(self.step_delay) => false,
            _ = cancel.cancelled() => true,
        };
        if cancelled || self.is_interrupted() {
            let pm = PostMortem::new(FailureReason::Other)
                .with_error_detail("cancelled before the step finished");
            return Ok(ExecutionOutcome::failed_with("interrupted", pm)
                .with_elapsed_ms(start.elapsed().as_millis() as u64));
        }

        let result = match &step.completion_criteria {
            Some(dod) => format!("Simulated: {}", dod),
            None => format!("Simulated: {}", step.description),
        };
        context.add_action_summary(step.description.clone(), result.clone(), true);
        context.set_variable(format!("step_{}", step.id), result.clone());

        Ok(ExecutionOutcome::succeeded(result).with_elapsed_ms(start.elapsed().as_millis() as u64))
    }

    fn request_interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }

    fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepType;

    #[tokio::test]
    async fn test_dry_run_succeeds_with_dod() {
        let exec = DryRunExecutor::new(Duration::from_millis(1));
        let step = Step::new("Launch Notes", StepType::LaunchApp)
            .with_completion_criteria("Notes window is visible");
        let mut ctx = ExecutionContext::new("goal");
        let outcome = exec
            .execute_step(&step, &mut ctx, CancellationToken::new())
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "Simulated: Notes window is visible");
        assert_eq!(ctx.recent_actions().count(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_honours_cancellation() {
        let exec = DryRunExecutor::new(Duration::from_secs(30));
        let step = Step::new("Slow step", StepType::Complex);
        let mut ctx = ExecutionContext::new("goal");
        let token = CancellationToken::new();
        token.cancel();
        let outcome = exec.execute_step(&step, &mut ctx, token).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.failure_reason(), Some(FailureReason::Other));
    }
}
