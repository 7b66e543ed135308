//! 语音摘要：计划完成后生成一句简短播报
//!
//! 在独立 tokio 任务中执行，主循环从不等待；失败只记日志，不影响运行结果。

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::core::AgentError;
use crate::events::{notify_guarded, WorkflowEventSink};
use crate::llm::{LlmClient, Message};

const VOICE_SYSTEM_PROMPT: &str = "You are a friendly assistant. Summarize the finished task in one short spoken sentence, at most 20 characters, for example \"Message sent\". Only state the result.";

/// 播报文本生成服务
#[async_trait]
pub trait VoiceSummaryService: Send + Sync {
    async fn request_summary(
        &self,
        goal_text: &str,
        steps_executed: u32,
        elapsed_ms: u64,
    ) -> Result<String, AgentError>;
}

/// 基于 LLM 的播报生成
pub struct LlmVoiceSummary {
    llm: Arc<dyn LlmClient>,
}

impl LlmVoiceSummary {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl VoiceSummaryService for LlmVoiceSummary {
    async fn request_summary(
        &self,
        goal_text: &str,
        steps_executed: u32,
        elapsed_ms: u64,
    ) -> Result<String, AgentError> {
        let user = format!(
            "User goal: {}\nExecuted {} steps in {} seconds\n\nSummarize the result in one sentence",
            goal_text,
            steps_executed,
            elapsed_ms / 1000
        );
        self.llm
            .complete(&[Message::system(VOICE_SYSTEM_PROMPT), Message::user(user)])
            .await
            .map_err(AgentError::VoiceFailed)
    }
}

/// 清理播报文本：去首尾空白与引号、换行折叠为空格、按字符截断并加 "..."；结果为空时返回 None
pub fn clean_announcement(raw: &str, max_chars: usize) -> Option<String> {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix(is_quote).unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(is_quote).unwrap_or(trimmed);

    let text = trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return None;
    }
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        return Some(format!("{}...", head));
    }
    Some(text)
}

fn is_quote(c: char) -> bool {
    c == '"' || c == '\''
}

/// 在后台生成播报并交给观察者；返回的句柄仅供测试等待，调用方无需 await
pub fn spawn_voice_summary(
    service: Arc<dyn VoiceSummaryService>,
    sink: Arc<dyn WorkflowEventSink>,
    goal_text: String,
    steps_executed: u32,
    elapsed_ms: u64,
    max_chars: usize,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        match service
            .request_summary(&goal_text, steps_executed, elapsed_ms)
            .await
        {
            Ok(raw) => match clean_announcement(&raw, max_chars) {
                Some(text) => {
                    tracing::info!("Voice announcement generated: {}", text);
                    notify_guarded(sink.as_ref(), "voice_announcement", |s| {
                        s.on_voice_announcement(&text)
                    });
                }
                None => tracing::warn!("Voice summary was empty, skipping announcement"),
            },
            Err(e) => tracing::warn!("Voice summary failed: {}", e),
        }
    })
}
