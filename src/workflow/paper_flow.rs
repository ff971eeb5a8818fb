//! 论文处理流程 - 流程层
//!
//! 核心职责：定义"一篇论文"的完整处理流程
//!
//! 流程顺序：
//! 1. 元数据（esummary + efetch 摘要）
//! 2. 抓取图片
//! 3. 逐张图片生成选择题（可选）
//! 4. 组装输出行
//!
//! 任何一步失败都只影响这一篇论文，失败原因记录在 `PaperReport::skipped` 中。

use tracing::{info, warn};

use crate::models::OutputRow;
use crate::services::{CaseReportRetriever, FigureScraper, FigureStats, McqGenerator, McqStats};
use crate::utils::truncate_text;
use crate::workflow::paper_ctx::PaperCtx;

/// 单篇论文的处理结果
#[derive(Debug, Clone, Default)]
pub struct PaperReport {
    pub paper_id: String,
    /// 按图片在页面中的顺序排列
    pub rows: Vec<OutputRow>,
    pub figure_stats: FigureStats,
    pub mcq_stats: McqStats,
    /// 跳过原因（如 `metadata_parse`、`scrape_network_rejected`、`no_figures`）
    pub skipped: Option<String>,
}

impl PaperReport {
    fn skipped(paper_id: &str, reason: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.to_string(),
            skipped: Some(reason.into()),
            ..Default::default()
        }
    }

    /// 是否拿到了元数据并完成了图片抓取
    pub fn is_processed(&self) -> bool {
        self.skipped.is_none() || self.skipped.as_deref() == Some("no_figures")
    }
}

/// 论文处理流程
///
/// - 编排单篇论文的处理顺序
/// - 不持有输出，只返回结果行
/// - 只依赖业务能力（services）
#[derive(Clone)]
pub struct PaperFlow {
    retriever: CaseReportRetriever,
    scraper: FigureScraper,
    generator: McqGenerator,
}

impl PaperFlow {
    pub fn new(retriever: CaseReportRetriever, scraper: FigureScraper, generator: McqGenerator) -> Self {
        Self {
            retriever,
            scraper,
            generator,
        }
    }

    pub async fn run(&self, ctx: &PaperCtx) -> PaperReport {
        // ========== 步骤 1: 元数据 ==========
        let paper = match self.retriever.fetch_metadata(&ctx.paper_id).await {
            Ok(paper) => paper,
            Err(e) => {
                warn!("{} ⚠️ 元数据获取失败，跳过: {}", ctx, e);
                return PaperReport::skipped(&ctx.paper_id, format!("metadata_{}", e.kind()));
            }
        };
        info!("{} 📄 {}", ctx, truncate_text(&paper.title, 80));

        // ========== 步骤 2: 图片 ==========
        let figures = match self.scraper.scrape(&paper).await {
            Ok(figures) => figures,
            Err(e) => {
                warn!("{} ⚠️ 页面抓取失败，跳过: {}", ctx, e);
                return PaperReport::skipped(&paper.id, format!("scrape_{}", e.kind()));
            }
        };

        let mut report = PaperReport {
            paper_id: paper.id.clone(),
            ..Default::default()
        };
        report.figure_stats.record(&figures);

        if figures.is_empty() {
            info!("{} 没有可用的图片", ctx);
            report.skipped = Some("no_figures".to_string());
            return report;
        }
        info!(
            "{} 🖼️ 找到 {} 张图片（CDN 原图 {} 张）",
            ctx,
            figures.len(),
            report.figure_stats.cdn_links
        );

        // ========== 步骤 3: 选择题 ==========
        for figure in figures {
            let outcome = self.generator.generate_with_outcome(&paper, &figure).await;
            report.mcq_stats.record(&outcome);
            report.rows.push(OutputRow::new(&paper, figure, outcome.into_mcq()));
        }

        if self.generator.is_enabled() {
            info!(
                "{} 🧠 选择题 {}/{}",
                ctx,
                report.mcq_stats.generated,
                report.rows.len()
            );
        }

        report
    }
}
