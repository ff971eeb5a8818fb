use serde::{Deserialize, Serialize};

/// 摘要缺失时的占位文本
pub const ABSTRACT_NOT_AVAILABLE: &str = "Abstract not available";

/// 将 PMC 编号规范化为 `PMC<数字>` 形式
pub fn normalize_pmcid(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("PMC")
        .or_else(|| trimmed.strip_prefix("pmc"))
        .unwrap_or(trimmed);
    format!("PMC{}", digits)
}

/// 论文元数据
///
/// 由检索器创建，之后只读。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    /// PMC 编号（如 PMC1234567）
    pub id: String,
    pub title: String,
    pub journal: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// 论文全文页面
    pub paper_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pmid: Option<String>,
    /// esummary 返回的原始发表日期
    #[serde(default)]
    pub pub_date: String,
}

/// 单个图片记录
///
/// 只有在标签和链接都齐全时才会被创建；图注可以为空字符串。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FigureRecord {
    pub paper_id: String,
    /// 图片标签（如 "Figure 1"）
    pub label: String,
    /// 图片的绝对链接：优先 CDN 原图，否则为 PMC 的图片页
    pub figure_url: String,
    pub caption: String,
}

impl FigureRecord {
    pub fn has_caption(&self) -> bool {
        !self.caption.trim().is_empty()
    }

    /// 链接是否为 CDN 原图
    pub fn is_cdn_link(&self) -> bool {
        crate::utils::text::is_cdn_image_url(&self.figure_url)
    }
}
