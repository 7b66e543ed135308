//! 恢复决策策略
//!
//! 纯函数：根据失败原因与连续失败次数给出 RecoveryDecision，编排器据此重试、跳过、继续、重新规划或中止。
//! 决策表：
//!
//! | 失败原因            | 决策                                               |
//! |---------------------|----------------------------------------------------|
//! | ELEMENT_NOT_FOUND   | 连续失败 >= 2 -> REPLAN，否则 RETRY_STEP           |
//! | CLICK_MISSED        | 连续失败 >= 2 -> REPLAN，否则 RETRY_STEP           |
//! | INFINITE_LOOP       | 连续失败 < 上限 -> REPLAN，否则 ABORT              |
//! | APP_NOT_RESPONDING  | ABORT                                              |
//! | UNEXPECTED_DIALOG   | 连续失败 >= 1 -> REPLAN，否则 RETRY_STEP           |
//! | TIMEOUT             | 连续失败 >= 2 -> REPLAN，否则 RETRY_STEP           |
//! | 无 / OTHER          | 全局中止启发式命中 -> ABORT，否则 CONTINUE         |

use std::fmt;

use serde::Serialize;

use crate::config::OrchestratorSection;
use crate::model::FailureReason;

/// 恢复决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryDecision {
    /// 重试当前步骤
    RetryStep,
    /// 标记跳过并前进
    SkipStep,
    /// 不标记跳过，直接前进
    Continue,
    Replan,
    Abort,
}

impl fmt::Display for RecoveryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecoveryDecision::RetryStep => "RETRY_STEP",
            RecoveryDecision::SkipStep => "SKIP_STEP",
            RecoveryDecision::Continue => "CONTINUE",
            RecoveryDecision::Replan => "REPLAN",
            RecoveryDecision::Abort => "ABORT",
        };
        f.write_str(s)
    }
}

/// 决策输入：一次步骤失败时的计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureContext {
    pub failure_reason: Option<FailureReason>,
    /// 已计入本次失败的连续失败次数
    pub consecutive_failures: u32,
    pub total_steps_failed: u32,
    pub total_steps_executed: u32,
    /// 失败步骤的复杂度（仅在开启复杂度感知时使用）
    pub step_complexity: u8,
}

/// 恢复策略参数
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    pub max_consecutive_failures: u32,
    pub abort_after_failed_steps: u32,
    pub abort_failure_rate: f64,
    pub complexity_aware: bool,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorSection::default())
    }
}

impl RecoveryPolicy {
    pub fn from_config(cfg: &OrchestratorSection) -> Self {
        Self {
            max_consecutive_failures: cfg.max_consecutive_failures,
            abort_after_failed_steps: cfg.abort_after_failed_steps,
            abort_failure_rate: cfg.abort_failure_rate,
            complexity_aware: cfg.complexity_aware_recovery,
        }
    }

    /// 全局中止启发式：累计失败步数达到阈值，或失败率严格超过阈值
    pub fn should_abort(&self, total_steps_failed: u32, total_steps_executed: u32) -> bool {
        if total_steps_failed >= self.abort_after_failed_steps {
            return true;
        }
        total_steps_executed > 0
            && f64::from(total_steps_failed) / f64::from(total_steps_executed)
                > self.abort_failure_rate
    }

    pub fn decide(&self, ctx: &FailureContext) -> RecoveryDecision {
        let base = self.decide_by_table(ctx);
        if self.complexity_aware {
            return self.adjust_for_complexity(base, ctx);
        }
        base
    }

    fn decide_by_table(&self, ctx: &FailureContext) -> RecoveryDecision {
        let c = ctx.consecutive_failures;
        match ctx.failure_reason {
            Some(FailureReason::ElementNotFound) => retry_until(c, 2),
            Some(FailureReason::ClickMissed) => retry_until(c, 2),
            Some(FailureReason::InfiniteLoop) => {
                if c < self.max_consecutive_failures {
                    RecoveryDecision::Replan
                } else {
                    RecoveryDecision::Abort
                }
            }
            Some(FailureReason::AppNotResponding) => RecoveryDecision::Abort,
            Some(FailureReason::UnexpectedDialog) => retry_until(c, 1),
            Some(FailureReason::Timeout) => retry_until(c, 2),
            Some(FailureReason::Other) | None => {
                if self.should_abort(ctx.total_steps_failed, ctx.total_steps_executed) {
                    RecoveryDecision::Abort
                } else {
                    RecoveryDecision::Continue
                }
            }
        }
    }

    fn adjust_for_complexity(
        &self,
        base: RecoveryDecision,
        ctx: &FailureContext,
    ) -> RecoveryDecision {
        let skippable = matches!(
            ctx.failure_reason,
            Some(FailureReason::ElementNotFound) | Some(FailureReason::Timeout)
        );
        if skippable && base == RecoveryDecision::RetryStep && ctx.step_complexity <= 2 {
            return RecoveryDecision::SkipStep;
        }
        base
    }
}

fn retry_until(consecutive: u32, replan_at: u32) -> RecoveryDecision {
    if consecutive >= replan_at {
        RecoveryDecision::Replan
    } else {
        RecoveryDecision::RetryStep
    }
}
