//! 应用入口 - 编排层
//!
//! 负责运行前检查、组装真实的网络与模型实现、创建输出文件，
//! 然后把一次运行交给 `Pipeline`。

use std::sync::Arc;

use tracing::info;

use crate::config::{Config, EXAMPLE_PAPER_COUNT};
use crate::error::AppResult;
use crate::infrastructure::ReqwestFetcher;
use crate::models::{QueryWindow, Selection};
use crate::orchestrator::pipeline::{CancellationFlag, Pipeline};
use crate::orchestrator::summary::RunSummary;
use crate::services::{ChatModel, CsvRowSink, LlmService, OutputPaths};
use crate::utils::logging;

/// 应用主结构
pub struct App {
    config: Config,
    window: QueryWindow,
    cap: usize,
    example: bool,
    paths: OutputPaths,
    cancel: CancellationFlag,
}

impl App {
    /// 初始化应用
    ///
    /// 所有配置错误都在这里暴露，此时还没有任何网络请求，也没有创建任何文件。
    pub fn initialize(config: Config, selection: Selection) -> AppResult<Self> {
        config.validate()?;
        let window = selection.resolve()?;
        let example = selection.is_example();
        let cap = if example { EXAMPLE_PAPER_COUNT } else { config.max_papers };
        let paths = OutputPaths::now(&config.output_dir);

        Ok(Self {
            config,
            window,
            cap,
            example,
            paths,
            cancel: CancellationFlag::new(),
        })
    }

    /// 本次运行的输出路径（含日志文件）
    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    /// 取消标志（交给 Ctrl-C 处理器）
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> AppResult<RunSummary> {
        let config = self.config.clone().downgrade_mcq_without_key();
        if self.example {
            info!("🧪 示例模式：检索最近的 {} 篇病例报告", EXAMPLE_PAPER_COUNT);
        }
        logging::log_startup(&config, &self.window.to_string());
        info!("📁 会话目录: {}", self.paths.session_dir.display());

        let fetcher = Arc::new(ReqwestFetcher::new(config.request_timeout())?);
        let model = config
            .enable_mcq
            .then(|| Arc::new(LlmService::new(&config)) as Arc<dyn ChatModel>);

        let mut sink = CsvRowSink::create(&self.paths.csv_path)?;

        let mut pipeline = Pipeline::new(&config, fetcher, model).with_cancellation(self.cancel.clone());
        let summary = pipeline.run(&self.window, self.cap, &mut sink).await?;

        summary.write_json(&self.paths.summary_path)?;
        logging::print_final_stats(&summary, Some(&self.paths.csv_path.display().to_string()));
        info!("摘要已保存至: {}", self.paths.summary_path.display());

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            ncbi_email: "curator@example.org".to_string(),
            output_dir: "outputs".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_example_mode_caps_papers() {
        let app = App::initialize(Config { max_papers: 50, ..config() }, Selection::Example).unwrap();
        assert_eq!(app.cap, EXAMPLE_PAPER_COUNT);
        assert!(app.paths().log_path.starts_with(&app.paths().session_dir));
        assert!(app.paths().session_dir.starts_with("outputs"));
    }

    #[test]
    fn test_invalid_config_fails_before_any_file_is_created() {
        let result = App::initialize(Config::default(), Selection::Example);
        assert!(result.is_err());
        let bad_month = App::initialize(config(), Selection::Month { month: 13, year: 2024 });
        assert!(bad_month.is_err());
    }
}
