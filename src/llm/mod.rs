//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod message;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;

pub use message::{Message, Role};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

/// 根据配置与环境变量选择后端：有 OPENAI_API_KEY 时走 OpenAI 兼容端点，否则用 Mock
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    let provider = cfg.provider.to_lowercase();
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if provider != "mock" => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.model);
            Arc::new(OpenAiClient::new(
                cfg.base_url.as_deref(),
                &cfg.model,
                Some(key.as_str()),
                cfg.timeouts.request,
            ))
        }
        _ => {
            tracing::warn!("No API key set or provider is mock, using Mock LLM");
            Arc::new(MockLlmClient::default())
        }
    }
}
