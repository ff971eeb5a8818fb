//! 编排层（Orchestration Layer）
//!
//! ## 层次关系
//!
//! ```text
//! app (运行前检查、组装真实依赖、输出文件)
//!     ↓
//! pipeline (处理 Vec<PMCID>，阶段切换、并发、取消、写出)
//!     ↓
//! workflow::PaperFlow (处理单篇论文)
//!     ↓
//! services (能力层：检索 / 抓图 / 出题 / 写出)
//!     ↓
//! infrastructure (基础设施：限流器、HTTP 客户端)
//! ```
//!
//! 编排层只做调度和统计，不做具体业务判断。

pub mod app;
pub mod pipeline;
pub mod summary;

pub use app::App;
pub use pipeline::{CancellationFlag, Pipeline, PipelineStage};
pub use summary::RunSummary;
