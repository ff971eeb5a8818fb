/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::error::SinkError;
use crate::orchestrator::RunSummary;

/// 初始化日志
///
/// 控制台总是输出；传入日志文件时同时写入文件（无颜色）。
/// 默认级别为 info，可通过 `RUST_LOG` 覆盖。重复调用不会 panic（测试中会多次初始化）。
pub fn init(log_file: Option<File>) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
    });
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();
}

/// 初始化日志文件
///
/// 创建所在目录，写入表头，返回以追加方式打开的文件。
pub fn init_log_file(log_file_path: &Path) -> Result<File, SinkError> {
    let write_failed = |source| SinkError::WriteFailed {
        path: log_file_path.display().to_string(),
        source,
    };

    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent).map_err(write_failed)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .map_err(write_failed)?;
    let log_header = format!(
        "{}\n病例报告图片流水线日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    file.write_all(log_header.as_bytes()).map_err(write_failed)?;
    Ok(file)
}

/// 记录程序启动信息
pub fn log_startup(config: &Config, window: &str) {
    info!("{}", "=".repeat(60));
    info!("🏥 病例报告图片分析流水线启动");
    info!("📅 检索范围: {}", window);
    info!("📊 最大论文数: {}", config.max_papers);
    info!("🚦 请求速率: {:.1} 次/秒", config.effective_requests_per_second());
    info!("🧠 选择题生成: {}", if config.enable_mcq { "开启" } else { "关闭" });
    info!("⚙️ 并发论文数: {}", config.max_concurrent_papers);
    info!("{}", "=".repeat(60));
}

/// 记录阶段切换
pub fn log_stage(stage: impl std::fmt::Display) {
    info!("\n{}", "─".repeat(60));
    info!("▶ 阶段: {}", stage);
    info!("{}", "─".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(summary: &RunSummary, output_path: Option<&str>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 流水线运行统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📋 检索到论文: {}", summary.papers_found);
    info!("📄 处理论文: {}", summary.papers_processed);
    info!("🖼️ 提取图片: {}", summary.figures_extracted);
    info!("🔗 CDN 原图链接: {}", summary.cdn_links);
    info!("🧠 生成选择题: {}", summary.mcqs_generated);
    info!("📝 输出行数: {}", summary.rows_written);
    if summary.cancelled {
        info!("⚠️ 运行被中断，输出为部分结果");
    }
    for (reason, count) in &summary.skipped {
        info!("⏭️ 跳过 [{}]: {}", reason, count);
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = output_path {
        info!("\n结果已保存至: {}", path);
    }
}
