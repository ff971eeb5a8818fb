use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ConfigError;

/// 无 API key 时 NCBI 允许的请求速率
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 3.0;
/// 持有 NCBI API key 时的请求速率
pub const ELEVATED_REQUESTS_PER_SECOND: f64 = 10.0;
/// 允许配置的最低请求速率
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.01;
/// 示例模式固定的论文数量
pub const EXAMPLE_PAPER_COUNT: usize = 10;

/// 程序配置
///
/// 优先级：默认值 < 配置文件 < 环境变量 < 命令行参数
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- NCBI 配置 ---
    /// NCBI 要求的联系邮箱（必填）
    pub ncbi_email: String,
    /// NCBI API key，可将速率上限提高到 10 次/秒
    pub ncbi_api_key: Option<String>,
    pub eutils_base_url: String,
    pub pmc_base_url: String,
    // --- LLM 配置 ---
    pub llm_api_key: Option<String>,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    pub enable_mcq: bool,
    /// 图注短于该长度时不生成选择题
    pub min_caption_length: usize,
    pub mcq_temperature: f32,
    pub mcq_max_tokens: u32,
    pub mcq_timeout_secs: u64,
    /// 提示词中摘要的最大字符数
    pub abstract_prompt_chars: usize,
    /// 选项打乱的随机种子，设置后结果可复现
    pub mcq_shuffle_seed: Option<u64>,
    // --- 抓取配置 ---
    /// 最多处理的论文数
    pub max_papers: usize,
    /// 手动指定请求速率（次/秒），不设置时按是否有 API key 决定
    pub requests_per_second: Option<f64>,
    /// 限流器最长等待时间
    pub rate_limit_max_wait_secs: u64,
    /// 瞬时错误的最大尝试次数（含首次）
    pub max_retries: u32,
    /// 指数退避的基础等待时间
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// esearch 每页返回的编号数
    pub search_page_size: usize,
    /// 同时处理的论文数量
    pub max_concurrent_papers: usize,
    /// 图片内联链接不是 CDN 原图时，是否再请求图片页查找原图
    pub resolve_cdn_urls: bool,
    // --- 输出配置 ---
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ncbi_email: String::new(),
            ncbi_api_key: None,
            eutils_base_url: "https://eutils.ncbi.nlm.nih.gov/entrez/eutils".to_string(),
            pmc_base_url: "https://pmc.ncbi.nlm.nih.gov".to_string(),
            llm_api_key: None,
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
            enable_mcq: true,
            min_caption_length: 40,
            mcq_temperature: 0.2,
            mcq_max_tokens: 1024,
            mcq_timeout_secs: 45,
            abstract_prompt_chars: 1500,
            mcq_shuffle_seed: None,
            max_papers: 20,
            requests_per_second: None,
            rate_limit_max_wait_secs: 60,
            max_retries: 3,
            retry_base_delay_ms: 500,
            request_timeout_secs: 30,
            search_page_size: 100,
            max_concurrent_papers: 1,
            resolve_cdn_urls: true,
            output_dir: "outputs".to_string(),
        }
    }
}

impl Config {
    /// 从 TOML 配置文件加载，缺省字段使用默认值
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source,
            })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// 用环境变量覆盖已有配置
    pub fn with_env_overrides(self) -> Self {
        fn non_empty(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            non_empty(name).and_then(|v| v.trim().parse().ok())
        }

        Self {
            ncbi_email: non_empty("NCBI_EMAIL").unwrap_or(self.ncbi_email),
            ncbi_api_key: non_empty("NCBI_API_KEY").or(self.ncbi_api_key),
            llm_api_key: non_empty("OPENAI_API_KEY").or(self.llm_api_key),
            llm_api_base_url: non_empty("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            llm_model_name: non_empty("LLM_MODEL_NAME").unwrap_or(self.llm_model_name),
            enable_mcq: parsed("ENABLE_MCQ").unwrap_or(self.enable_mcq),
            max_papers: parsed("MAX_PAPERS").unwrap_or(self.max_papers),
            requests_per_second: parsed("REQUESTS_PER_SECOND").or(self.requests_per_second),
            max_concurrent_papers: parsed("MAX_CONCURRENT_PAPERS")
                .unwrap_or(self.max_concurrent_papers),
            output_dir: non_empty("OUTPUT_DIR").unwrap_or(self.output_dir),
            ..self
        }
    }

    /// 运行前检查，任何网络请求之前调用
    pub fn validate(&self) -> Result<(), ConfigError> {
        let email = self.ncbi_email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ConfigError::InvalidEmail {
                value: self.ncbi_email.clone(),
            });
        }
        if self.max_papers == 0 {
            return Err(invalid("max_papers", self.max_papers, "必须大于 0"));
        }
        if let Some(rps) = self.requests_per_second {
            if !(rps.is_finite() && rps >= MIN_REQUESTS_PER_SECOND) {
                return Err(invalid("requests_per_second", rps, "不能低于 0.01"));
            }
        }
        if self.max_concurrent_papers == 0 {
            return Err(invalid("max_concurrent_papers", self.max_concurrent_papers, "必须大于 0"));
        }
        if self.search_page_size == 0 {
            return Err(invalid("search_page_size", self.search_page_size, "必须大于 0"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries", self.max_retries, "至少尝试 1 次"));
        }
        Ok(())
    }

    /// 开启了选择题生成但缺少 LLM key 时，关闭该功能并给出警告
    pub fn downgrade_mcq_without_key(mut self) -> Self {
        if self.enable_mcq && !self.has_llm_key() {
            warn!("⚠️ 未提供 LLM API key，选择题生成已关闭");
            self.enable_mcq = false;
        }
        self
    }

    pub fn has_llm_key(&self) -> bool {
        self.llm_api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    /// 实际使用的请求速率
    pub fn effective_requests_per_second(&self) -> f64 {
        match self.requests_per_second {
            Some(rps) => rps,
            None if self.ncbi_api_key.is_some() => ELEVATED_REQUESTS_PER_SECOND,
            None => DEFAULT_REQUESTS_PER_SECOND,
        }
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_secs(self.rate_limit_max_wait_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn invalid(name: &str, value: impl std::fmt::Display, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
