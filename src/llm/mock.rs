//! Mock LLM 客户端（用于本地演示与测试，无需 API）
//!
//! 规划请求（system prompt 含 "milestone"）时返回一个两步 JSON 计划；其它请求返回一句简短总结。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message, Role};

#[derive(Debug, Default)]
pub struct MockLlmClient {
    /// 收到的请求数（测试中用于断言调用次数）
    calls: Mutex<usize>,
}

impl MockLlmClient {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        *self.calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;

        let last_user = messages
            .iter()
            .rev()
            .find(|m| matches!(m.role, Role::User))
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        let wants_plan = messages
            .iter()
            .any(|m| matches!(m.role, Role::System) && m.content.contains("milestone"));

        if !wants_plan {
            return Ok("Task completed".to_string());
        }

        let goal = last_user
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .unwrap_or("the goal");
        let plan = serde_json::json!({
            "plan": [
                {
                    "id": 1,
                    "desc": format!("Prepare the environment for: {goal}"),
                    "type": "LAUNCH_APP",
                    "dod": "The required application is open and ready",
                    "complexity": 1
                },
                {
                    "id": 2,
                    "desc": format!("Complete: {goal}"),
                    "type": "EXECUTE_WORKFLOW",
                    "dod": "The goal's result is visible on screen",
                    "complexity": 3
                }
            ]
        });
        Ok(plan.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_returns_plan_for_planning_prompt() {
        let client = MockLlmClient::default();
        let out = client
            .complete(&[
                Message::system("Break goals into milestone steps"),
                Message::user("## User Goal\nopen the calculator"),
            ])
            .await
            .unwrap();
        assert!(out.contains("\"plan\""));
        assert!(out.contains("open the calculator"));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_returns_text_otherwise() {
        let client = MockLlmClient::default();
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "Task completed");
    }
}
