use anyhow::Result;
use clap::Parser;
use tracing::warn;

use case_report_figures::cli::Cli;
use case_report_figures::orchestrator::App;
use case_report_figures::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 读取 .env（不存在时忽略）
    dotenvy::dotenv().ok();

    // 解析参数与配置
    let cli = Cli::parse();
    let config = cli.load_config()?;
    let selection = cli.selection()?;

    // 运行前检查，通过后才创建会话目录
    let app = App::initialize(config, selection)?;

    // 初始化日志（控制台 + 会话日志文件）
    let log_file = logging::init_log_file(&app.paths().log_path)?;
    logging::init(Some(log_file));

    let cancel = app.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("⚠️ 收到 Ctrl-C，当前论文处理完后停止");
            cancel.cancel();
        }
    });

    app.run().await?;

    Ok(())
}
