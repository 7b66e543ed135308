//! 规划输出解析：从 LLM 回复中提取步骤
//!
//! 优先解析 JSON（```json 代码块、通用代码块、或以 `{` 开头的裸文本），
//! 失败时降级为编号 / 项目符号列表解析，并按关键词猜测步骤类型。
//! 两者都解析不出步骤时返回空列表，由调用方决定兜底。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::AgentError;
use crate::model::{Step, StepType, DEFAULT_COMPLEXITY};

static JSON_FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static GENERIC_FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();
static LIST_ITEM_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn json_fence() -> Option<&'static Regex> {
    JSON_FENCE_RE
        .get_or_init(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").ok())
        .as_ref()
}

fn generic_fence() -> Option<&'static Regex> {
    GENERIC_FENCE_RE
        .get_or_init(|| Regex::new(r"```\s*([\s\S]*?)\s*```").ok())
        .as_ref()
}

fn list_item() -> Option<&'static Regex> {
    LIST_ITEM_RE
        .get_or_init(|| Regex::new(r"(?m)^\s*(?:\d+[.、)]|[-*])\s*(.+?)\s*$").ok())
        .as_ref()
}

/// 从回复中解析步骤：JSON 优先，失败时按列表文本解析
pub fn parse_steps(response: &str) -> Vec<Step> {
    match parse_json_steps(response) {
        Ok(steps) => steps,
        Err(e) => {
            tracing::warn!("JSON plan parsing failed, falling back to text parsing: {}", e);
            parse_text_steps(response)
        }
    }
}

/// 提取回复中的 JSON 文本
pub fn extract_json(text: &str) -> Option<&str> {
    for re in [json_fence(), generic_fence()].into_iter().flatten() {
        if let Some(body) = re.captures(text).and_then(|c| c.get(1)) {
            return Some(body.as_str().trim());
        }
    }
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }
    None
}

/// 解析 `{"plan": [...]}`；`plan` 缺失或不是数组时返回空列表
pub fn parse_json_steps(response: &str) -> Result<Vec<Step>, AgentError> {
    let json = extract_json(response)
        .ok_or_else(|| AgentError::JsonParseError("no JSON object found in response".into()))?;
    let root: Value = serde_json::from_str(json)?;

    let Some(items) = root.get("plan").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    let steps = items.iter().map(step_from_json).collect();
    Ok(steps)
}

fn step_from_json(node: &Value) -> Step {
    let description = node
        .get("desc")
        .or_else(|| node.get("description"))
        .map(value_to_text)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Unknown step".to_string());
    let step_type = node
        .get("type")
        .and_then(Value::as_str)
        .map(StepType::parse)
        .unwrap_or(StepType::Unknown);
    let complexity = node
        .get("complexity")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .unwrap_or(i64::from(DEFAULT_COMPLEXITY));

    let mut step = Step::new(description, step_type).with_complexity(complexity);
    if let Some(dod) = node.get("dod").map(value_to_text) {
        step = step.with_completion_criteria(dod);
    }
    step
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// 降级方案：解析 `1. xxx` / `1) xxx` / `- xxx` / `* xxx` 形式的行
pub fn parse_text_steps(text: &str) -> Vec<Step> {
    let Some(re) = list_item() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|desc| !desc.is_empty())
        .map(|desc| Step::new(desc, guess_step_type(desc)))
        .collect()
}

/// 按关键词猜测里程碑类型；都不匹配时为 COMPLEX
pub fn guess_step_type(desc: &str) -> StepType {
    let d = desc.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| d.contains(w));

    if has(&["启动", "打开应用", "launch", "open app"]) {
        StepType::LaunchApp
    } else if has(&["导航", "进入", "跳转", "navigate", "go to"]) {
        StepType::NavigateTo
    } else if has(&["完成", "提交", "发送", "workflow", "execute", "submit", "send"]) {
        StepType::ExecuteWorkflow
    } else if has(&["确认", "验证", "检查", "verify", "confirm", "check"]) {
        StepType::VerifyState
    } else {
        StepType::Complex
    }
}
