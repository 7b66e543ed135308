//! 环境快照（屏幕截图引用）
//!
//! 编排器本身不解读截图；快照只在 Planner 与 Executor 之间传递。采集由外部的 SnapshotProvider 完成。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub captured_at: DateTime<Utc>,
    /// 可选的文字描述（如 UI 树摘要），供纯文本 LLM 使用
    pub description: Option<String>,
    /// Base64 编码的图片数据
    pub image_base64: Option<String>,
    pub mime_type: String,
}

impl EnvironmentSnapshot {
    pub fn from_image(image_base64: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            captured_at: Utc::now(),
            description: None,
            image_base64: Some(image_base64.into()),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_description(description: impl Into<String>) -> Self {
        Self {
            captured_at: Utc::now(),
            description: Some(description.into()),
            image_base64: None,
            mime_type: "text/plain".to_string(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// 用于拼入 prompt 的一行说明
    pub fn prompt_note(&self) -> String {
        match (&self.description, &self.image_base64) {
            (Some(desc), _) => desc.clone(),
            (None, Some(image)) => format!(
                "A screenshot ({}, {} bytes base64) was captured at {}",
                self.mime_type,
                image.len(),
                self.captured_at.to_rfc3339()
            ),
            (None, None) => "No screen information available".to_string(),
        }
    }
}

/// 屏幕采集器（截图、坐标映射等实现不在本 crate 范围内）
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn capture(&self) -> Result<EnvironmentSnapshot, AgentError>;
}
