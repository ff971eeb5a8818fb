//! # Case Report Figures
//!
//! 从 PubMed Central 检索开放获取的病例报告，提取论文中的图片与图注，
//! 并为每张图片生成一道 USMLE 风格的选择题，每张图片输出一行结果。
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `RateLimiter` - 唯一的共享可变状态，所有 NCBI 请求都要先拿许可
//! - `RateLimitedClient` - 限流 + 有界重试的 HTTP 客户端
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单篇论文 / 单张图片
//! - `CaseReportRetriever` - 检索论文与元数据
//! - `FigureScraper` - 抓取图片
//! - `McqGenerator` - 生成选择题
//! - `RowSink` - 写出结果
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇论文"的完整处理流程
//! - `PaperCtx` - 上下文封装（序号 + PMCID）
//! - `PaperFlow` - 流程编排（元数据 → 图片 → 选择题 → 输出行）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 阶段切换、并发、取消、写出
//! - `orchestrator/app` - 运行前检查与真实依赖的组装

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use infrastructure::{HttpFetch, RateLimiter};
pub use models::{FigureRecord, Mcq, OutputRow, PaperMetadata, QueryWindow, Selection};
pub use orchestrator::{App, CancellationFlag, Pipeline, PipelineStage, RunSummary};
pub use services::{ChatModel, MemoryRowSink, RowSink};
pub use workflow::{PaperCtx, PaperFlow};
