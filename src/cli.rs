//! 命令行参数
//!
//! 优先级：默认值 < `--config` 配置文件 < 环境变量（含 `.env`）< 命令行参数

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use crate::config::Config;
use crate::error::ConfigError;
use crate::models::{parse_date, Selection};

#[derive(Parser, Debug)]
#[command(
    name = "case-report-figures",
    version,
    about = "Retrieve open-access case reports from PMC, extract figures and generate USMLE-style MCQs."
)]
#[command(group(
    ArgGroup::new("window")
        .required(true)
        .args(["month", "start_date", "example"])
))]
pub struct Cli {
    /// 月份（1-12），需同时指定 --year
    #[arg(long, requires = "year")]
    pub month: Option<u32>,

    #[arg(long, requires = "month")]
    pub year: Option<i32>,

    /// 起始日期 YYYY-MM-DD，需同时指定 --end-date
    #[arg(long, alias = "start_date", requires = "end_date")]
    pub start_date: Option<String>,

    #[arg(long, alias = "end_date", requires = "start_date")]
    pub end_date: Option<String>,

    /// 示例模式：最近的 10 篇病例报告
    #[arg(long)]
    pub example: bool,

    #[arg(long, alias = "max_papers")]
    pub max_papers: Option<usize>,

    /// NCBI 联系邮箱
    #[arg(long)]
    pub email: Option<String>,

    /// NCBI API key
    #[arg(long, alias = "api_key")]
    pub api_key: Option<String>,

    /// OpenAI 兼容接口的 API key
    #[arg(long, alias = "openai_key")]
    pub openai_key: Option<String>,

    #[arg(long, alias = "output_dir")]
    pub output_dir: Option<String>,

    /// 关闭选择题生成
    #[arg(long)]
    pub disable_mcq: bool,

    /// 同时处理的论文数
    #[arg(long)]
    pub concurrency: Option<usize>,

    #[arg(long)]
    pub requests_per_second: Option<f64>,

    /// 选项打乱的随机种子
    #[arg(long)]
    pub seed: Option<u64>,

    /// TOML 配置文件
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// 解析时间范围
    pub fn selection(&self) -> Result<Selection, ConfigError> {
        if self.example {
            return Ok(Selection::Example);
        }
        match (self.month, self.year, self.start_date.as_deref(), self.end_date.as_deref()) {
            (Some(month), Some(year), None, None) => Ok(Selection::Month { month, year }),
            (None, None, Some(start), Some(end)) => Ok(Selection::Range {
                start: parse_date(start)?,
                end: parse_date(end)?,
            }),
            _ => Err(ConfigError::InvalidWindow {
                reason: "需要 --month/--year、--start-date/--end-date 或 --example 之一".to_string(),
            }),
        }
    }

    /// 合并配置文件、环境变量与命令行参数
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let base = match &self.config {
            Some(path) => Config::from_toml_file(path)?,
            None => Config::default(),
        };
        Ok(self.apply_overrides(base.with_env_overrides()))
    }

    fn apply_overrides(&self, config: Config) -> Config {
        Config {
            ncbi_email: self.email.clone().unwrap_or(config.ncbi_email),
            ncbi_api_key: self.api_key.clone().or(config.ncbi_api_key),
            llm_api_key: self.openai_key.clone().or(config.llm_api_key),
            output_dir: self.output_dir.clone().unwrap_or(config.output_dir),
            max_papers: self.max_papers.unwrap_or(config.max_papers),
            enable_mcq: config.enable_mcq && !self.disable_mcq,
            max_concurrent_papers: self.concurrency.unwrap_or(config.max_concurrent_papers),
            requests_per_second: self.requests_per_second.or(config.requests_per_second),
            mcq_shuffle_seed: self.seed.or(config.mcq_shuffle_seed),
            ..config
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("case-report-figures").chain(args.iter().copied()))
    }

    #[test]
    fn test_month_selection() {
        let cli = parse(&["--month", "12", "--year", "2024", "--email", "a@b.org"]).unwrap();
        assert_eq!(cli.selection().unwrap(), Selection::Month { month: 12, year: 2024 });
    }

    #[test]
    fn test_range_selection() {
        let cli = parse(&["--start-date", "2024-01-01", "--end-date", "2024-03-31"]).unwrap();
        assert!(matches!(cli.selection().unwrap(), Selection::Range { .. }));
        let cli = parse(&["--start_date", "2024-01-01", "--end_date", "not-a-date"]).unwrap();
        assert!(cli.selection().is_err());
    }

    #[test]
    fn test_window_flags_are_exclusive_and_required() {
        assert!(parse(&["--example", "--month", "1", "--year", "2024"]).is_err());
        assert!(parse(&["--month", "1"]).is_err());
        assert!(parse(&["--email", "a@b.org"]).is_err());
        assert!(parse(&["--example"]).is_ok());
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = parse(&[
            "--example",
            "--email",
            "cli@example.org",
            "--disable-mcq",
            "--max-papers",
            "3",
            "--seed",
            "9",
        ])
        .unwrap();
        let config = cli.apply_overrides(Config {
            ncbi_email: "file@example.org".to_string(),
            ..Config::default()
        });
        assert_eq!(config.ncbi_email, "cli@example.org");
        assert!(!config.enable_mcq);
        assert_eq!(config.max_papers, 3);
        assert_eq!(config.mcq_shuffle_seed, Some(9));
    }
}
