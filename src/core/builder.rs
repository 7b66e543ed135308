//! 编排器构建器：统一的初始化逻辑
//!
//! Planner 与 Executor 必填；事件观察者默认 NoopEventSink，语音摘要默认关闭（未提供服务），参数默认取配置默认值。

use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{Orchestrator, OrchestratorConfig};
use crate::events::{NoopEventSink, WorkflowEventSink};
use crate::executor::StepExecutor;
use crate::planner::Planner;
use crate::voice::VoiceSummaryService;

pub struct OrchestratorBuilder {
    planner: Arc<dyn Planner>,
    executor: Arc<dyn StepExecutor>,
    sink: Option<Arc<dyn WorkflowEventSink>>,
    voice: Option<Arc<dyn VoiceSummaryService>>,
    config: OrchestratorConfig,
}

impl OrchestratorBuilder {
    pub fn new(planner: Arc<dyn Planner>, executor: Arc<dyn StepExecutor>) -> Self {
        Self {
            planner,
            executor,
            sink: None,
            voice: None,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn WorkflowEventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_voice_summary(mut self, voice: Arc<dyn VoiceSummaryService>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// 从应用配置推导编排器参数
    pub fn with_app_config(self, cfg: &AppConfig) -> Self {
        self.with_config(OrchestratorConfig::from_app_config(cfg))
    }

    pub fn build(self) -> Orchestrator {
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(NoopEventSink) as Arc<dyn WorkflowEventSink>);
        tracing::debug!(
            max_replans = ?self.config.max_replans,
            step_timeout = ?self.config.step_timeout,
            voice = self.voice.is_some(),
            "Building orchestrator"
        );
        Orchestrator::from_parts(self.planner, self.executor, sink, self.voice, self.config)
    }
}
