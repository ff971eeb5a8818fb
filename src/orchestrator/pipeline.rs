//! 流水线 - 编排层
//!
//! ## 职责
//!
//! 把检索、抓图、出题、写出串成一次完整的运行：
//!
//! `Init → Retrieving → ScrapingFigures → (GeneratingMcqs)? → Writing → Done`
//!
//! 配置错误或输出失败时进入 `Failed`；单篇论文或单张图片的失败只计入摘要。
//!
//! ## 并发
//!
//! 默认逐篇处理。`max_concurrent_papers > 1` 时用 `buffered` 同时处理多篇，
//! 但结果仍按检索顺序交付，所以每篇论文的行在输出中始终连续。
//! 所有网络请求共用同一个限流器。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info, warn};

use crate::clients::EutilsClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{HttpFetch, RateLimitedClient, RateLimiter, RetryPolicy};
use crate::models::QueryWindow;
use crate::orchestrator::summary::RunSummary;
use crate::services::{CaseReportRetriever, ChatModel, FigureScraper, McqGenerator, RowSink};
use crate::utils::logging;
use crate::workflow::{PaperCtx, PaperFlow};

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Retrieving,
    ScrapingFigures,
    GeneratingMcqs,
    Writing,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Init => "Init",
            PipelineStage::Retrieving => "Retrieving",
            PipelineStage::ScrapingFigures => "ScrapingFigures",
            PipelineStage::GeneratingMcqs => "GeneratingMcqs",
            PipelineStage::Writing => "Writing",
            PipelineStage::Done => "Done",
            PipelineStage::Failed => "Failed",
        }
    }

    fn description(self) -> &'static str {
        match self {
            PipelineStage::Init => "初始化",
            PipelineStage::Retrieving => "检索论文",
            PipelineStage::ScrapingFigures => "抓取图片",
            PipelineStage::GeneratingMcqs => "生成选择题",
            PipelineStage::Writing => "写出结果",
            PipelineStage::Done => "完成",
            PipelineStage::Failed => "失败",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_str())
    }
}

/// 取消标志，在论文之间检查
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 流水线
pub struct Pipeline {
    retriever: CaseReportRetriever,
    flow: PaperFlow,
    mcq_enabled: bool,
    max_concurrent_papers: usize,
    cancel: CancellationFlag,
    stage: PipelineStage,
}

impl Pipeline {
    /// 用给定的网络抓取与模型实现组装流水线
    ///
    /// 所有组件共享同一个限流器。
    pub fn new(config: &Config, fetcher: Arc<dyn HttpFetch>, model: Option<Arc<dyn ChatModel>>) -> Self {
        Self::with_limiter(config, fetcher, model, Arc::new(RateLimiter::from_config(config)))
    }

    pub fn with_limiter(
        config: &Config,
        fetcher: Arc<dyn HttpFetch>,
        model: Option<Arc<dyn ChatModel>>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let http = RateLimitedClient::new(fetcher, limiter, RetryPolicy::from_config(config));
        let eutils = EutilsClient::new(http.clone(), config);
        let retriever = CaseReportRetriever::new(eutils, config);
        let scraper = FigureScraper::new(http, config);
        let generator = McqGenerator::new(model, config);
        let mcq_enabled = generator.is_enabled();

        Self {
            flow: PaperFlow::new(retriever.clone(), scraper, generator),
            retriever,
            mcq_enabled,
            max_concurrent_papers: config.max_concurrent_papers.max(1),
            cancel: CancellationFlag::new(),
            stage: PipelineStage::Init,
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
        logging::log_stage(stage);
    }

    /// 执行一次完整运行
    ///
    /// 只有输出失败会返回错误；其余失败都记录在摘要里。
    pub async fn run(&mut self, window: &QueryWindow, cap: usize, sink: &mut dyn RowSink) -> AppResult<RunSummary> {
        let mut summary = RunSummary::new(window.to_string());
        summary.output_csv = sink.location();

        // ========== 检索 ==========
        self.enter(PipelineStage::Retrieving);
        let ids = self.retriever.search(window, cap).await;
        summary.papers_found = ids.len();

        if ids.is_empty() {
            warn!("⚠️ 没有检索到符合条件的论文");
        }

        // ========== 逐篇处理 ==========
        self.enter(PipelineStage::ScrapingFigures);
        if self.mcq_enabled {
            self.enter(PipelineStage::GeneratingMcqs);
        }

        let total = ids.len();
        let flow = self.flow.clone();
        let cancel = self.cancel.clone();
        let mut reports = futures::stream::iter(ids.into_iter().enumerate())
            .map(|(i, id)| {
                let flow = &flow;
                let cancel = &cancel;
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let ctx = PaperCtx::new(id, i + 1, total);
                    Some(flow.run(&ctx).await)
                }
            })
            .buffered(self.max_concurrent_papers);

        while let Some(report) = reports.next().await {
            let Some(report) = report else {
                warn!("⚠️ 收到取消信号，停止处理剩余论文");
                summary.cancelled = true;
                break;
            };

            let written = report
                .rows
                .iter()
                .try_for_each(|row| sink.write_row(row))
                .and_then(|_| sink.flush());
            if let Err(e) = written {
                error!("❌ 写出 {} 的结果失败: {}", report.paper_id, e);
                self.stage = PipelineStage::Failed;
                summary.finish(self.stage.as_str());
                return Err(e.into());
            }
            summary.absorb(&report);
        }
        drop(reports);

        // ========== 收尾 ==========
        self.enter(PipelineStage::Writing);
        if let Err(e) = sink.flush() {
            self.stage = PipelineStage::Failed;
            return Err(e.into());
        }

        self.enter(PipelineStage::Done);
        summary.finish(self.stage.as_str());
        info!(
            "✓ 流水线完成：{} 篇论文，{} 行",
            summary.papers_processed, summary.rows_written
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(PipelineStage::Done.as_str(), "Done");
        assert_eq!(PipelineStage::Retrieving.to_string(), "检索论文 (Retrieving)");
    }
}
