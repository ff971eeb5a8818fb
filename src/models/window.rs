//! 检索时间窗口
//!
//! 三种互斥的输入方式（月份 / 日期区间 / 示例模式）统一解析为 `QueryWindow`，
//! 再翻译成 PMC 的检索语法。

use chrono::{Datelike, NaiveDate};

use crate::error::ConfigError;

/// 病例报告的基础检索条件
pub const CASE_REPORT_FILTER: &str = r#""case report"[ti] AND open access[filter]"#;

/// 用户选择的时间范围
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// 指定年月
    Month { month: u32, year: i32 },
    /// 指定起止日期（含两端）
    Range { start: NaiveDate, end: NaiveDate },
    /// 示例模式：最近的少量病例报告
    Example,
}

/// 闭区间日期窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// 解析后的检索窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryWindow {
    Dated(DateWindow),
    MostRecent,
}

impl Selection {
    /// 校验并解析为检索窗口
    pub fn resolve(&self) -> Result<QueryWindow, ConfigError> {
        match *self {
            Selection::Example => Ok(QueryWindow::MostRecent),
            Selection::Month { month, year } => {
                if !(1..=12).contains(&month) {
                    return Err(ConfigError::InvalidWindow {
                        reason: format!("月份 {} 不在 1-12 之间", month),
                    });
                }
                let start = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| {
                    ConfigError::InvalidWindow {
                        reason: format!("无效的年月 {}-{}", year, month),
                    }
                })?;
                let end = last_day_of_month(start).ok_or_else(|| ConfigError::InvalidWindow {
                    reason: format!("无法计算 {}-{} 的月末", year, month),
                })?;
                Ok(QueryWindow::Dated(DateWindow { start, end }))
            }
            Selection::Range { start, end } => {
                if start > end {
                    return Err(ConfigError::InvalidWindow {
                        reason: format!("起始日期 {} 晚于结束日期 {}", start, end),
                    });
                }
                Ok(QueryWindow::Dated(DateWindow { start, end }))
            }
        }
    }

    pub fn is_example(&self) -> bool {
        matches!(self, Selection::Example)
    }
}

impl QueryWindow {
    /// 翻译为 PMC esearch 的 term 参数
    pub fn to_query(&self) -> String {
        match self {
            QueryWindow::MostRecent => CASE_REPORT_FILTER.to_string(),
            QueryWindow::Dated(w) => format!(
                r#"{} AND ("{}"[PDAT] : "{}"[PDAT])"#,
                CASE_REPORT_FILTER,
                w.start.format("%Y/%m/%d"),
                w.end.format("%Y/%m/%d")
            ),
        }
    }
}

impl std::fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryWindow::MostRecent => write!(f, "最近发表"),
            QueryWindow::Dated(w) => write!(f, "{} 至 {}", w.start, w.end),
        }
    }
}

/// 解析 YYYY-MM-DD 日期
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ConfigError::InvalidDate {
        value: value.to_string(),
    })
}

fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}
