//! Waypoint 命令行
//!
//! 入口：初始化日志、加载配置、用 LLM 规划器 + 空跑执行器执行命令行给出的目标，并打印结果与执行摘要。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use waypoint::config::load_config;
use waypoint::events::TracingEventSink;
use waypoint::executor::DryRunExecutor;
use waypoint::llm::create_llm_from_config;
use waypoint::planner::LlmPlanner;
use waypoint::voice::LlmVoiceSummary;
use waypoint::{observability, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::var("WAYPOINT_CONFIG").ok().map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load configuration")?;

    let goal = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    anyhow::ensure!(!goal.trim().is_empty(), "usage: waypoint <goal>");

    let llm = create_llm_from_config(&cfg.llm);
    let planner = Arc::new(LlmPlanner::new(llm.clone(), cfg.planner.clone()));
    let orchestrator = Orchestrator::builder(planner, Arc::new(DryRunExecutor::default()))
        .with_event_sink(Arc::new(TracingEventSink))
        .with_voice_summary(Arc::new(LlmVoiceSummary::new(llm)))
        .with_app_config(&cfg)
        .build();

    let run = orchestrator.execute_goal(&goal);
    tokio::pin!(run);
    let result = tokio::select! {
        result = &mut run => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Ctrl+C received, interrupting");
            orchestrator.interrupt();
            (&mut run).await
        }
    };

    println!(
        "{} {}",
        if result.success { "[ok]" } else if result.partial { "[partial]" } else { "[failed]" },
        result.message
    );
    println!("\n{}", orchestrator.execution_summary());
    if let Some(audit) = orchestrator.last_context_audit() {
        println!("{}", audit.summary());
    }

    // 给后台语音摘要一点时间完成
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    Ok(())
}
