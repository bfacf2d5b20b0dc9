//! 健康聊天 CLI 客户端（测试版）
//!
//! 非交互式 CLI，用于测试和展示本地缓存与远端同步流程：
//! 启动时完成用户引导与恢复决策，可选地提交一次化验分析、
//! 在活跃会话中追问一句，或清空本地数据。

use anyhow::Result;
use clap::Parser;
use healthchat_sdk_core_rust::{
    ChatSyncer, ChatSyncerConfig, EntryState, LabField, LabReport, UserProfile,
};
use tracing::{error, info};

/// 健康聊天 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "healthchat-cli")]
#[command(about = "健康聊天 CLI 客户端 - 用于测试本地缓存与远端同步", long_about = None)]
struct Args {
    /// SQLite 数据库 URL
    #[arg(long, default_value = "sqlite://ai_chat.db?mode=rwc")]
    db_path: String,

    /// 远端 AI 服务地址
    #[arg(long, default_value = "http://localhost:8000")]
    api_base_url: String,

    /// 用户姓名（仅首次引导时用于创建远端用户）
    #[arg(long, default_value = "张三")]
    name: String,

    /// 年龄
    #[arg(long, default_value = "32")]
    age: i64,

    /// 性别
    #[arg(long, default_value = "male")]
    gender: String,

    /// 化验指标，形如 --lab glucose=95，可重复
    #[arg(long)]
    lab: Vec<String>,

    /// 采样日期（YYYY-MM-DD，默认今天）
    #[arg(long)]
    test_date: Option<String>,

    /// 在活跃会话中追问的一句话
    #[arg(short, long)]
    message: Option<String>,

    /// 清空全部本地聊天数据后退出
    #[arg(long)]
    reset: bool,

    /// 日志级别
    #[arg(long, default_value = "info,healthchat_sdk_core_rust=debug")]
    log_level: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str) {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    // 创建日志文件（追加模式）
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("无法创建日志文件 debug.log");

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: debug.log");
}

/// 解析 --lab glucose=95 形式的指标参数
fn parse_labs(args: &[String], test_date: String) -> Result<LabReport> {
    let mut report = LabReport::new(test_date);
    for item in args {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("指标格式应为 key=value: {}", item))?;
        let field: LabField = key.parse()?;
        let value: f64 = value
            .parse()
            .map_err(|_| anyhow::anyhow!("指标值不是数字: {}", item))?;
        report.insert(field, value);
    }
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logger(&args.log_level);

    info!("[CLI] 🚀 健康聊天 CLI 客户端（测试模式）");
    info!("[CLI] 💾 数据库: {}", args.db_path);
    info!("[CLI] 🌐 服务地址: {}", args.api_base_url);

    let config = ChatSyncerConfig {
        api_base_url: args.api_base_url.clone(),
        db_path: args.db_path.clone(),
    };
    let mut syncer = ChatSyncer::new(config).await?;

    if args.reset {
        syncer.reset().await?;
        info!("[CLI] 🗑️ 本地数据已清空，退出");
        return Ok(());
    }

    let profile = UserProfile {
        name: args.name.clone(),
        age: args.age,
        gender: args.gender.clone(),
    };

    // 引导 + 恢复决策
    match syncer.entry_state(&profile).await? {
        EntryState::FirstAnalysis => {
            info!("[CLI] 🆕 尚无历史会话，请通过 --lab 提交第一次化验分析");
        }
        EntryState::Resumable(candidates) => {
            info!("[CLI] 📋 发现历史会话（展示最近 {} 个）:", candidates.len());
            for conv in &candidates {
                info!(
                    "[CLI]   - {} | 更新于: {} | 风险: {}",
                    conv.conversation_id,
                    conv.updated_at,
                    conv.overall_risk.as_deref().unwrap_or("-")
                );
            }

            // 默认恢复最近更新的会话并重放对话
            let latest_id = candidates[0].conversation_id.clone();
            let resumed = syncer.resume(&latest_id).await?;
            info!("[CLI] ▶️ 已恢复会话: {}", latest_id);
            if let Some(explanation) = &resumed.conversation.ai_explanation {
                info!("[CLI] 🧾 上次解读: {}", explanation);
            }
            for msg in &resumed.messages {
                let who = if msg.is_user { "用户" } else { "助手" };
                info!("[CLI]   [{}] {}", who, msg.content);
            }
        }
    }

    // 可选：提交一次化验分析
    if !args.lab.is_empty() {
        let test_date = args
            .test_date
            .clone()
            .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());
        let report = parse_labs(&args.lab, test_date)?;

        info!("[CLI] 🧪 提交化验分析，指标数: {}", report.values.len());
        let data = syncer.submit_analysis(&report).await?;
        info!("[CLI] ✅ 分析完成，会话: {}", data.conversation_id);
        info!("[CLI] 🩺 解读: {}", data.ai_explanation);
        info!("[CLI] 📊 总体风险: {}", data.analysis.overall_risk);
        for rec in &data.analysis.recommendations {
            info!("[CLI]   💡 [{}] {}: {}", rec.kind, rec.title, rec.description);
        }
    }

    // 可选：在活跃会话中追问一句
    if let Some(message) = &args.message {
        let active = syncer
            .session()
            .and_then(|s| s.active_conversation_id.clone());
        match active {
            Some(conversation_id) => {
                let turn = syncer.continue_conversation(&conversation_id, message).await?;
                info!("[CLI] 🤖 助手: {}", turn.assistant_response);
            }
            None => {
                error!("[CLI] ❌ 没有活跃会话，请先通过 --lab 提交分析或恢复历史会话");
            }
        }
    }

    info!("[CLI] 👋 完成");
    Ok(())
}
