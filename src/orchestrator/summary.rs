//! 运行摘要
//!
//! 汇总一次运行的计数与跳过原因，结束时写入 `processing_summary_<ts>.json`。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::SinkError;
use crate::services::{FigureStats, McqStats};
use crate::workflow::PaperReport;

/// 运行摘要
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// 检索窗口的可读描述
    pub window: String,
    pub started_at: String,
    pub finished_at: String,
    /// 结束时所处的阶段
    pub final_stage: String,
    pub papers_found: usize,
    pub papers_processed: usize,
    pub figures_extracted: usize,
    pub cdn_links: usize,
    pub mcqs_generated: usize,
    pub rows_written: usize,
    pub cancelled: bool,
    /// 跳过原因 → 论文数
    pub skipped: BTreeMap<String, usize>,
    pub figure_stats: FigureStats,
    pub mcq_stats: McqStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_csv: Option<String>,
}

impl RunSummary {
    pub fn new(window: impl Into<String>) -> Self {
        Self {
            window: window.into(),
            started_at: now(),
            ..Default::default()
        }
    }

    /// 合并一篇论文的结果（行已写出之后调用）
    pub fn absorb(&mut self, report: &PaperReport) {
        if report.is_processed() {
            self.papers_processed += 1;
        }
        if let Some(reason) = &report.skipped {
            *self.skipped.entry(reason.clone()).or_default() += 1;
        }
        self.figure_stats.merge(&report.figure_stats);
        self.mcq_stats.merge(&report.mcq_stats);

        self.figures_extracted = self.figure_stats.total_figures;
        self.cdn_links = self.figure_stats.cdn_links;
        self.mcqs_generated = self.mcq_stats.generated;
        self.rows_written += report.rows.len();
    }

    pub fn finish(&mut self, stage: impl std::fmt::Display) {
        self.final_stage = stage.to_string();
        self.finished_at = now();
    }

    /// 写出 JSON 摘要
    pub fn write_json(&self, path: &Path) -> Result<(), SinkError> {
        let write_failed = |source| SinkError::WriteFailed {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(write_failed)
    }
}

fn now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
