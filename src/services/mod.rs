pub mod case_report_retriever;
pub mod figure_scraper;
pub mod llm_service;
pub mod mcq_generator;
pub mod row_writer;

pub use case_report_retriever::CaseReportRetriever;
pub use figure_scraper::{FigurePattern, FigureScraper, FigureStats};
pub use llm_service::{ChatModel, LlmService};
pub use mcq_generator::{McqGenerator, McqOutcome, McqParse, McqStats};
pub use row_writer::{CsvRowSink, MemoryRowSink, OutputPaths, RowSink};
