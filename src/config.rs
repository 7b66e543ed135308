//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WAYPOINT__*` 覆盖（双下划线表示嵌套，如 `WAYPOINT__ORCHESTRATOR__MAX_REPLANS=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub orchestrator: OrchestratorSection,
    pub planner: PlannerSection,
    pub voice: VoiceSection,
    pub llm: LlmSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [orchestrator] 段：恢复策略阈值与可选的保护上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 连续失败达到该次数时触发 Re-plan
    pub max_consecutive_failures: u32,
    /// 全局中止启发式：累计失败步数达到该值
    pub abort_after_failed_steps: u32,
    /// 全局中止启发式：失败率严格大于该值
    pub abort_failure_rate: f64,
    /// 单次运行的 Re-plan 上限；不设置则不限（参考行为）
    pub max_replans: Option<u32>,
    /// 编排器层面的单步超时（秒）；不设置则无限等待执行器
    pub step_timeout_secs: Option<u64>,
    /// 低复杂度步骤在 ELEMENT_NOT_FOUND / TIMEOUT 时以 SKIP_STEP 代替 RETRY_STEP
    pub complexity_aware_recovery: bool,
    pub milestone_log_capacity: usize,
    /// 计划完成后是否发起语音摘要
    pub voice_summary: bool,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 2,
            abort_after_failed_steps: 3,
            abort_failure_rate: 0.5,
            max_replans: None,
            step_timeout_secs: None,
            complexity_aware_recovery: false,
            milestone_log_capacity: 50,
            voice_summary: true,
        }
    }
}

/// [planner] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlannerSection {
    /// 规划时是否附带当前屏幕快照
    pub include_snapshot: bool,
    /// 建议的步骤数区间（仅用于日志提示，不强制）
    pub min_steps: usize,
    pub max_steps: usize,
    /// 规划器保留的历史条数
    pub history_limit: usize,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            include_snapshot: true,
            min_steps: 2,
            max_steps: 5,
            history_limit: 50,
        }
    }
}

/// [voice] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceSection {
    /// 播报文本最大字符数
    pub max_chars: usize,
}

impl Default for VoiceSection {
    fn default() -> Self {
        Self { max_chars: 20 }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// 从 config 目录加载配置，环境变量 WAYPOINT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WAYPOINT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WAYPOINT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
