//! 病例报告检索服务 - 业务能力层
//!
//! 负责"按时间窗口找到论文并补全元数据"，不关心图片与选择题

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::clients::EutilsClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{normalize_pmcid, PaperMetadata, QueryWindow, ABSTRACT_NOT_AVAILABLE};

/// 病例报告检索器
#[derive(Clone)]
pub struct CaseReportRetriever {
    eutils: EutilsClient,
    page_size: usize,
    pmc_base_url: String,
}

impl CaseReportRetriever {
    pub fn new(eutils: EutilsClient, config: &Config) -> Self {
        Self {
            eutils,
            page_size: config.search_page_size.max(1),
            pmc_base_url: config.pmc_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// 分页检索论文编号
    ///
    /// 返回的编号已规范化为 `PMC<数字>`，去重且保持检索顺序，数量不超过 `cap`。
    /// 某一页失败时停止翻页，保留已取得的结果。
    pub async fn search(&self, window: &QueryWindow, cap: usize) -> Vec<String> {
        let mut ids = Vec::new();
        if cap == 0 {
            return ids;
        }

        let term = window.to_query();
        let mut seen = HashSet::new();
        let mut retstart = 0;
        info!("🔍 检索条件: {}", term);

        loop {
            let page = match self.eutils.esearch(&term, retstart, self.page_size).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("⚠️ 第 {} 条起的检索页失败，停止翻页: {}", retstart, e);
                    break;
                }
            };

            if page.ids.is_empty() {
                debug!("检索页为空，停止翻页");
                break;
            }

            let page_len = page.ids.len();
            for raw in page.ids {
                let id = normalize_pmcid(&raw);
                if seen.insert(id.clone()) {
                    ids.push(id);
                    if ids.len() >= cap {
                        break;
                    }
                }
            }

            retstart += page_len;
            debug!("已检索 {}/{} 条，累计 {} 个编号", retstart, page.total, ids.len());

            if ids.len() >= cap || retstart >= page.total {
                break;
            }
        }

        info!("✓ 检索到 {} 篇论文", ids.len());
        ids
    }

    /// 获取单篇论文的元数据
    ///
    /// esummary 失败时返回错误（调用方丢弃该论文）；摘要获取失败只会退化为占位文本。
    pub async fn fetch_metadata(&self, id: &str) -> AppResult<PaperMetadata> {
        let id = normalize_pmcid(id);
        let uid = id.trim_start_matches("PMC");

        let summary = self.eutils.esummary(uid).await?;

        let abstract_text = match self.eutils.efetch_abstract(uid).await {
            Ok(Some(text)) => text,
            Ok(None) => {
                debug!("{} 没有可用的摘要", id);
                ABSTRACT_NOT_AVAILABLE.to_string()
            }
            Err(e) => {
                warn!("⚠️ {} 摘要获取失败，使用占位文本: {}", id, e);
                ABSTRACT_NOT_AVAILABLE.to_string()
            }
        };

        Ok(PaperMetadata {
            paper_url: self.paper_url(&id),
            id,
            title: summary.title,
            journal: summary.journal,
            abstract_text,
            pmid: summary.pmid,
            pub_date: summary.pub_date,
        })
    }

    /// 检索并补全元数据，失败的论文被丢弃
    pub async fn retrieve(&self, window: &QueryWindow, cap: usize) -> Vec<PaperMetadata> {
        let ids = self.search(window, cap).await;
        let mut papers = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.fetch_metadata(id).await {
                Ok(paper) => papers.push(paper),
                Err(e) => warn!("⚠️ {} 元数据获取失败，已跳过: {}", id, e),
            }
        }
        papers
    }

    /// 论文全文页面地址
    pub fn paper_url(&self, id: &str) -> String {
        format!("{}/articles/{}/", self.pmc_base_url, id)
    }
}
