//! 执行结果与验尸报告（PostMortem）
//!
//! 执行器对每个步骤返回一个 ExecutionOutcome；失败时附带结构化的失败原因，供恢复策略决策。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 诊断反馈中最多展示的策略条数
const MAX_STRATEGIES_IN_FEEDBACK: usize = 5;

/// 失败原因分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    /// 找不到目标元素
    ElementNotFound,
    /// 点击未命中
    ClickMissed,
    /// 陷入死循环
    InfiniteLoop,
    /// 应用无响应
    AppNotResponding,
    /// 意外弹窗
    UnexpectedDialog,
    Timeout,
    Other,
}

impl FailureReason {
    pub const ALL: [FailureReason; 7] = [
        FailureReason::ElementNotFound,
        FailureReason::ClickMissed,
        FailureReason::InfiniteLoop,
        FailureReason::AppNotResponding,
        FailureReason::UnexpectedDialog,
        FailureReason::Timeout,
        FailureReason::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ElementNotFound => "ELEMENT_NOT_FOUND",
            FailureReason::ClickMissed => "CLICK_MISSED",
            FailureReason::InfiniteLoop => "INFINITE_LOOP",
            FailureReason::AppNotResponding => "APP_NOT_RESPONDING",
            FailureReason::UnexpectedDialog => "UNEXPECTED_DIALOG",
            FailureReason::Timeout => "TIMEOUT",
            FailureReason::Other => "OTHER",
        }
    }

    /// 各失败原因的默认恢复建议（执行器未给出建议时使用）
    pub fn default_recovery_hint(&self) -> &'static str {
        match self {
            FailureReason::ElementNotFound => {
                "Scroll, navigate, or look for the element under a different label"
            }
            FailureReason::ClickMissed => "Re-locate the target and click its center",
            FailureReason::InfiniteLoop => "Change strategy instead of repeating the same action",
            FailureReason::AppNotResponding => "Restart the application or wait for it to recover",
            FailureReason::UnexpectedDialog => "Dismiss the dialog before continuing",
            FailureReason::Timeout => "Allow more time or simplify the milestone",
            FailureReason::Other => "Inspect the screen state and retry",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 验尸报告：失败时的详细诊断信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMortem {
    pub failure_reason: FailureReason,
    /// 最后一次看到的屏幕状态描述
    pub last_screen_state: Option<String>,
    pub attempted_strategies: Vec<String>,
    pub error_detail: Option<String>,
    pub suggested_recovery: Option<String>,
}

impl PostMortem {
    pub fn new(failure_reason: FailureReason) -> Self {
        Self {
            failure_reason,
            last_screen_state: None,
            attempted_strategies: Vec::new(),
            error_detail: None,
            suggested_recovery: None,
        }
    }

    pub fn with_screen_state(mut self, state: impl Into<String>) -> Self {
        self.last_screen_state = Some(state.into());
        self
    }

    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.attempted_strategies.push(strategy.into());
        self
    }

    pub fn with_error_detail(mut self, detail: impl Into<String>) -> Self {
        self.error_detail = Some(detail.into());
        self
    }

    pub fn with_suggested_recovery(mut self, recovery: impl Into<String>) -> Self {
        self.suggested_recovery = Some(recovery.into());
        self
    }

    pub fn recovery_hint(&self) -> &str {
        self.suggested_recovery
            .as_deref()
            .unwrap_or_else(|| self.failure_reason.default_recovery_hint())
    }
}

/// 单步执行结果。failure_reason 仅在 success = false 时存在（由构造函数保证）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    success: bool,
    message: String,
    elapsed_ms: u64,
    post_mortem: Option<PostMortem>,
}

impl ExecutionOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            elapsed_ms: 0,
            post_mortem: None,
        }
    }

    /// 带失败原因的失败结果
    pub fn failed(message: impl Into<String>, reason: FailureReason) -> Self {
        Self::failed_with(message, PostMortem::new(reason))
    }

    /// 带完整验尸报告的失败结果
    pub fn failed_with(message: impl Into<String>, post_mortem: PostMortem) -> Self {
        Self {
            success: false,
            message: message.into(),
            elapsed_ms: 0,
            post_mortem: Some(post_mortem),
        }
    }

    /// 未分类的失败（无验尸报告）
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            elapsed_ms: 0,
            post_mortem: None,
        }
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.post_mortem.as_ref().map(|pm| pm.failure_reason)
    }

    pub fn post_mortem(&self) -> Option<&PostMortem> {
        self.post_mortem.as_ref()
    }

    /// 给 Planner 的反馈报告：结果行 + 失败时的验尸报告（含最后 5 条尝试过的策略）
    pub fn diagnostic_feedback(&self) -> String {
        let mut out = String::new();
        if self.success {
            out.push_str(&format!("SUCCESS: {}\n", self.message));
            return out;
        }
        out.push_str(&format!("FAILED: {}\n", self.message));
        let Some(pm) = &self.post_mortem else {
            return out;
        };
        out.push_str("\nPost-mortem:\n");
        out.push_str(&format!("  - Failure reason: {}\n", pm.failure_reason));
        if let Some(state) = &pm.last_screen_state {
            out.push_str(&format!("  - Last screen state: {}\n", state));
        }
        if let Some(detail) = &pm.error_detail {
            out.push_str(&format!("  - Error detail: {}\n", detail));
        }
        out.push_str(&format!("  - Suggested recovery: {}\n", pm.recovery_hint()));
        if !pm.attempted_strategies.is_empty() {
            out.push_str("  - Attempted strategies (last 5):\n");
            let start = pm
                .attempted_strategies
                .len()
                .saturating_sub(MAX_STRATEGIES_IN_FEEDBACK);
            for (i, strategy) in pm.attempted_strategies.iter().enumerate().skip(start) {
                out.push_str(&format!("    {}. {}\n", i + 1, strategy));
            }
        }
        out
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.success { "ok" } else { "failed" };
        write!(f, "[{}] {}", tag, self.message)
    }
}
