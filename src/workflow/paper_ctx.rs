//! 论文处理上下文
//!
//! 封装"我正在处理第几篇论文"这一信息，主要用于日志前缀

use std::fmt::Display;

/// 论文处理上下文
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperCtx {
    /// 论文编号（PMC 形式）
    pub paper_id: String,

    /// 在本次运行中的序号（从 1 开始）
    pub paper_index: usize,

    /// 本次运行的论文总数
    pub total: usize,
}

impl PaperCtx {
    pub fn new(paper_id: impl Into<String>, paper_index: usize, total: usize) -> Self {
        Self {
            paper_id: paper_id.into(),
            paper_index,
            total,
        }
    }
}

impl Display for PaperCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[论文 {}/{} {}]", self.paper_index, self.total, self.paper_id)
    }
}
