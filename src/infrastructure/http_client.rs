//! HTTP 客户端 - 基础设施层
//!
//! `HttpFetch` 是对外部网络的唯一抽象（`fetch(url) -> bytes | Error`），
//! `RateLimitedClient` 在其外层叠加限流与有界重试。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, FetchError};
use crate::infrastructure::rate_limiter::RateLimiter;

/// 原始网络抓取能力
#[async_trait]
pub trait HttpFetch: Send + Sync {
    /// GET 指定 URL，非 2xx 状态码视为错误
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// 基于 reqwest 的实现
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("CaseReportFigures/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: format!("无法创建 HTTP 客户端: {}", e),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout { url: url.to_string() }
            } else {
                FetchError::Transport {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(classify)?;
        Ok(bytes.to_vec())
    }
}

/// 重试策略：指数退避，仅对瞬时错误生效
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: config.retry_base_delay(),
            max_delay: Duration::from_secs(8),
        }
    }

    /// 不等待的重试策略，用于测试
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// 第 `attempt` 次失败后的等待时间（attempt 从 1 开始）
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// 限流 + 重试的 HTTP 客户端
///
/// 可以安全地在多个任务间共享（内部都是 `Arc`）。
#[derive(Clone)]
pub struct RateLimitedClient {
    fetcher: Arc<dyn HttpFetch>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl RateLimitedClient {
    pub fn new(fetcher: Arc<dyn HttpFetch>, limiter: Arc<RateLimiter>, retry: RetryPolicy) -> Self {
        Self {
            fetcher,
            limiter,
            retry,
        }
    }

    /// GET 请求，瞬时错误按策略重试，其余错误立即返回
    pub async fn get(&self, url: &str) -> AppResult<Vec<u8>> {
        let mut attempt = 1;
        loop {
            let _permit = self.limiter.acquire().await?;
            debug!("GET {} (尝试 {}/{})", url, attempt, self.retry.max_attempts);

            match self.fetcher.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "请求失败 (尝试 {}/{}): {}，{}ms 后重试...",
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("请求失败，已重试 {} 次: {}", attempt, e);
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// GET 并按 UTF-8 解码（非法字节替换为 U+FFFD）
    pub async fn get_text(&self, url: &str) -> AppResult<String> {
        let body = self.get(url).await?;
        Ok(match String::from_utf8(body) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }

    /// GET 并反序列化 JSON
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, context: &str) -> AppResult<T> {
        let body = self.get(url).await?;
        serde_json::from_slice(&body).map_err(|e| AppError::json(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// 按顺序返回预设结果的抓取器
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedFetcher {
        fn new(responses: Vec<Result<Vec<u8>, FetchError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl HttpFetch for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Status { url: url.to_string(), status: 404 }))
        }
    }

    fn status(status: u16) -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Status {
            url: "https://example.org".to_string(),
            status,
        })
    }

    fn client(fetcher: Arc<ScriptedFetcher>, attempts: u32) -> RateLimitedClient {
        RateLimitedClient::new(
            fetcher,
            Arc::new(RateLimiter::unlimited()),
            RetryPolicy::immediate(attempts),
        )
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            status(503),
            Err(FetchError::Timeout { url: "u".into() }),
            Ok(b"ok".to_vec()),
        ]));
        let body = client(fetcher.clone(), 3).get("u").await.unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![
            status(500),
            status(502),
            status(503),
            Ok(b"too late".to_vec()),
        ]));
        let result = client(fetcher.clone(), 3).get("u").await;
        assert!(matches!(result, Err(AppError::Fetch(FetchError::Status { status: 503, .. }))));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![status(404), Ok(b"x".to_vec())]));
        let result = client(fetcher.clone(), 3).get("u").await;
        assert!(result.is_err());
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_rate_limited_status_is_retried() {
        let fetcher = Arc::new(ScriptedFetcher::new(vec![status(429), Ok(b"{}".to_vec())]));
        let value: serde_json::Value = client(fetcher.clone(), 3).get_json("u", "test").await.unwrap();
        assert!(value.is_object());
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(3),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(4), Duration::from_secs(3));
    }
}
