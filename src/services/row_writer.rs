//! 结果写入服务 - 业务能力层
//!
//! 只负责"把一行结果写出去"，不关心这行是怎么来的

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::SinkError;
use crate::models::{OutputRow, OUTPUT_COLUMNS};

/// 输出行的去处
pub trait RowSink: Send {
    fn write_row(&mut self, row: &OutputRow) -> Result<(), SinkError>;

    /// 每篇论文写完后调用
    fn flush(&mut self) -> Result<(), SinkError>;

    /// 输出位置（用于日志）
    fn location(&self) -> Option<String> {
        None
    }
}

/// 一次运行的输出路径
///
/// `<output_dir>/session_<ts>/case_reports_figures_<ts>.csv`、同目录下的
/// `processing_summary_<ts>.json` 与 `logs/pipeline_<ts>.log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub session_dir: PathBuf,
    pub csv_path: PathBuf,
    pub summary_path: PathBuf,
    pub log_path: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: impl AsRef<Path>, timestamp: &str) -> Self {
        let session_dir = output_dir.as_ref().join(format!("session_{}", timestamp));
        Self {
            csv_path: session_dir.join(format!("case_reports_figures_{}.csv", timestamp)),
            summary_path: session_dir.join(format!("processing_summary_{}.json", timestamp)),
            log_path: session_dir.join("logs").join(format!("pipeline_{}.log", timestamp)),
            session_dir,
        }
    }

    /// 以当前本地时间生成
    pub fn now(output_dir: impl AsRef<Path>) -> Self {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        Self::new(output_dir, &timestamp)
    }
}

/// CSV 文件输出
pub struct CsvRowSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvRowSink {
    /// 创建文件（必要时创建目录）并写入表头
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let path = path.into();
        let write_failed = |source| SinkError::WriteFailed {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        let file = File::create(&path).map_err(write_failed)?;
        let mut sink = Self {
            path: path.clone(),
            writer: BufWriter::new(file),
        };
        sink.write_record(OUTPUT_COLUMNS.iter().copied())?;
        sink.flush()?;
        debug!("创建输出文件: {}", path.display());
        Ok(sink)
    }

    fn write_record<'a>(&mut self, fields: impl Iterator<Item = &'a str>) -> Result<(), SinkError> {
        let line = fields.map(escape_field).collect::<Vec<_>>().join(",");
        writeln!(self.writer, "{}", line).map_err(|source| self.write_error(source))
    }

    fn write_error(&self, source: std::io::Error) -> SinkError {
        SinkError::WriteFailed {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl RowSink for CsvRowSink {
    fn write_row(&mut self, row: &OutputRow) -> Result<(), SinkError> {
        let fields = row.to_fields();
        self.write_record(fields.iter().map(String::as_str))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().map_err(|source| self.write_error(source))
    }

    fn location(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }
}

/// CSV 字段转义：含逗号、引号或换行时加引号，内部引号加倍
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// 内存输出，克隆后共享同一份数据（测试中用于检查结果）
#[derive(Clone, Default)]
pub struct MemoryRowSink {
    rows: Arc<Mutex<Vec<OutputRow>>>,
    flushes: Arc<Mutex<usize>>,
}

impl MemoryRowSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<OutputRow> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.lock().map(|count| *count).unwrap_or_default()
    }
}

impl RowSink for MemoryRowSink {
    fn write_row(&mut self, row: &OutputRow) -> Result<(), SinkError> {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push(row.clone());
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        if let Ok(mut count) = self.flushes.lock() {
            *count += 1;
        }
        Ok(())
    }
}
