pub mod http_client;
pub mod rate_limiter;

pub use http_client::{HttpFetch, RateLimitedClient, ReqwestFetcher, RetryPolicy};
pub use rate_limiter::{RateLimiter, RatePermit};
