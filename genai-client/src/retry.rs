//! Retry with exponential backoff for idempotent reads.
//!
//! Only `GET`-style calls (file/cache/model lookups and listings) go through
//! [`send_idempotent`]. Mutations and generation are sent exactly once.

use std::time::{Duration, SystemTime};

use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{info, warn};

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::http_response::error_from_response;

/// 重试配置。`attempts` 为总尝试次数（含首次请求）。
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    pub attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// 抖动比例（0.0 ~ 1.0）。
    pub jitter: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl RetryOptions {
    /// 关闭重试。
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            attempts: 1,
            ..Self::default()
        }
    }

    /// 无等待重试，主要用于测试。
    #[must_use]
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter: 0.0,
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let scaled = Duration::try_from_secs_f64(delay.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay);
        scaled.min(self.max_delay)
    }

    fn add_jitter(&self, duration: Duration) -> Duration {
        if self.jitter <= 0.0 || duration.is_zero() {
            return duration;
        }
        let range = duration.as_secs_f64() * self.jitter;
        let jittered = duration.as_secs_f64() + rand::thread_rng().gen_range(-range..=range);
        Duration::try_from_secs_f64(jittered.max(0.0))
            .unwrap_or(duration)
            .min(self.max_delay)
    }
}

/// 发送幂等请求，对传输错误与 408/429/5xx 按退避策略重试。
///
/// 非成功响应会被转换为错误（404 → [`Error::NotFound`]）。
pub(crate) async fn send_idempotent(
    inner: &ClientInner,
    request: reqwest::RequestBuilder,
    resource: &str,
) -> Result<reqwest::Response> {
    let options = &inner.config.retry_options;
    let request = request.build()?;
    let attempts = options.attempts.max(1);
    let mut delay = options.initial_delay;
    let mut attempt = 1;

    loop {
        let current = request.try_clone().ok_or_else(|| Error::InvalidConfig {
            message: "request body cannot be replayed for retry".into(),
        })?;
        let outcome = match inner.execute(current).await {
            Ok(response) if response.status().is_success() => Ok(response),
            Ok(response) => {
                let retry_after = retry_after(response.headers());
                Err((error_from_response(response, resource).await, retry_after))
            }
            Err(err) => Err((err, None)),
        };

        match outcome {
            Ok(response) => {
                if attempt > 1 {
                    info!(resource, attempt, "request succeeded after retry");
                }
                return Ok(response);
            }
            Err((err, retry_after)) if err.is_retryable() && attempt < attempts => {
                let wait = retry_after.map_or_else(
                    || options.add_jitter(delay),
                    |wait| wait.min(options.max_delay),
                );
                warn!(
                    resource,
                    attempt,
                    attempts,
                    error = %err,
                    wait_ms = wait.as_millis() as u64,
                    "retrying idempotent request"
                );
                tokio::time::sleep(wait).await;
                delay = options.next_delay(delay);
                attempt += 1;
            }
            Err((err, _)) => return Err(err),
        }
    }
}

/// 解析 `Retry-After`（秒数或 HTTP 日期）。
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let at = httpdate::parse_http_date(value).ok()?;
    Some(at.duration_since(SystemTime::now()).unwrap_or_default())
}
