//! 限流器 - 基础设施层
//!
//! 整个流水线中唯一的共享可变状态。所有对 NCBI 的请求在发出前都必须先 `acquire()`。

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::Config;
use crate::error::RateLimitError;

/// 相邻两次请求的最大间隔，极小的速率也不会超过它
pub const MAX_INTERVAL: Duration = Duration::from_secs(3600);

/// 许可凭证，拿到即可发出一次请求
#[derive(Debug)]
#[must_use]
pub struct RatePermit {
    _private: (),
}

/// 固定间隔闸门
///
/// 每次 `acquire()` 预约下一个可用时间槽，相邻两个槽之间至少间隔 `1 / rps` 秒。
/// 预约在互斥锁内完成，等待在锁外进行，因此并发调用者按到达顺序依次放行。
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    max_wait: Duration,
    next_slot: Mutex<Instant>,
}

impl RateLimiter {
    /// 创建限流器
    ///
    /// # 参数
    /// - `requests_per_second`: 每秒最多请求数（必须为正数）
    /// - `max_wait`: 单次等待上限，超过则返回超时错误
    pub fn new(requests_per_second: f64, max_wait: Duration) -> Self {
        let interval = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            Duration::try_from_secs_f64(1.0 / requests_per_second)
                .map(|interval| interval.min(MAX_INTERVAL))
                .unwrap_or(MAX_INTERVAL)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            max_wait,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    /// 根据配置创建（有 API key 时速率更高）
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.effective_requests_per_second(),
            config.rate_limit_max_wait(),
        )
    }

    /// 不限速，用于测试
    pub fn unlimited() -> Self {
        Self {
            interval: Duration::ZERO,
            max_wait: Duration::MAX,
            next_slot: Mutex::new(Instant::now()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 获取一次请求许可，必要时挂起等待
    pub async fn acquire(&self) -> Result<RatePermit, RateLimitError> {
        if self.interval.is_zero() {
            return Ok(RatePermit { _private: () });
        }

        let slot = {
            let mut next = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = (*next).max(now);
            let wait = slot - now;
            if wait > self.max_wait {
                return Err(RateLimitError::Timeout {
                    waited_ms: wait.as_millis(),
                    max_wait_ms: self.max_wait.as_millis(),
                });
            }
            *next = slot + self.interval;
            if !wait.is_zero() {
                debug!("限流等待 {}ms", wait.as_millis());
            }
            slot
        };

        tokio::time::sleep_until(slot).await;
        Ok(RatePermit { _private: () })
    }
}
