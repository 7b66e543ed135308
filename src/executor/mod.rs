//! 执行层接口：完成单个里程碑并返回结构化结果
//!
//! 感知与操作（截图、坐标映射、输入注入）不在本 crate 范围内；这里只定义编排器看到的边界，
//! 外加测试用的脚本执行器与演示用的空跑执行器。

pub mod dry_run;
pub mod scripted;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::core::AgentError;
use crate::model::{ExecutionOutcome, Step};

pub use dry_run::DryRunExecutor;
pub use scripted::{ScriptedExecutor, ScriptedStep};

/// 步骤执行器
///
/// 普通任务失败以 `ExecutionOutcome` 返回（success = false + FailureReason），Err 只用于致命错误。
/// `cancel` 在用户中断时被取消，执行器应在内部检查并尽快结束当前步骤。
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute_step(
        &self,
        step: &Step,
        context: &mut ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, AgentError>;

    fn request_interrupt(&self) {}

    fn clear_interrupt(&self) {}

    fn is_interrupted(&self) -> bool {
        false
    }
}
