//! 重试策略：最多 R 次尝试，每次尝试受超时 T 约束，尝试之间固定间隔
//!
//! 仅对瞬时错误（网络 / 非成功状态 / 解析失败 / 单次超时）重试；
//! InvalidRequest 立即返回。

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::warn;

use super::BackendError;

/// 重试耗尽后的错误：最后一次失败原因与实际尝试次数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhausted {
    pub last_error: BackendError,
    pub attempts: u32,
}

/// 固定次数、固定超时的重试策略
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数 R（含首次），至少为 1
    pub max_attempts: u32,
    /// 单次尝试超时 T
    pub attempt_timeout: Duration,
    /// 两次尝试之间的固定等待
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(20),
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            ..Self::default()
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// 执行操作：成功返回 (结果, 尝试次数)，全部失败返回 RetryExhausted
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<(T, u32), RetryExhausted>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match timeout(self.attempt_timeout, operation()).await {
                Ok(Ok(value)) => return Ok((value, attempt)),
                Ok(Err(e)) => e,
                Err(_) => BackendError::AttemptTimeout(self.attempt_timeout),
            };

            if !err.is_transient() || attempt >= max_attempts {
                return Err(RetryExhausted {
                    last_error: err,
                    attempts: attempt,
                });
            }

            warn!(
                attempt,
                max_attempts,
                error = %err,
                "Backend attempt failed, retrying"
            );
            if !self.retry_delay.is_zero() {
                sleep(self.retry_delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(50)).with_retry_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let (value, attempts) = policy(3)
            .execute(|| async { Ok::<_, BackendError>("ok") })
            .await
            .unwrap();
        assert_eq!(value, "ok");
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let (value, attempts) = policy(5)
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BackendError::NetworkError("reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausts_exactly_max_attempts() {
        let calls = AtomicU32::new(0);
        let err = policy(4)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<(), _>(BackendError::BadStatus {
                        status: 503,
                        body: "busy".into(),
                    })
                }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(err.attempts, 4);
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = policy(4)
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(BackendError::InvalidRequest("empty".into())) }
            })
            .await
            .unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_as_failure() {
        let err = policy(2)
            .execute(|| async {
                std::future::pending::<()>().await;
                Ok::<_, BackendError>(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 2);
        assert!(matches!(err.last_error, BackendError::AttemptTimeout(_)));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }
}
