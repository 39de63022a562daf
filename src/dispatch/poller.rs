//! 调用方轮询
//!
//! 整条流水线中唯一的挂起点：反复 take，取不到就睡眠固定间隔，
//! 最多 max_attempts 次；最后一个间隔结束后再取一次，仍没有则登记放弃并返回合成的 Timeout 结果。
//! 该超时与工作者的单次尝试超时 T 相互独立。

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{CompletionResult, CorrelationId, ResponseStore};

/// 轮询参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// 最长等待时间（max_attempts × interval，溢出时取 Duration::MAX）
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(900, Duration::from_millis(100))
    }
}

#[derive(Clone)]
pub struct PollingClient {
    store: Arc<ResponseStore>,
    config: PollConfig,
}

impl PollingClient {
    pub fn new(store: Arc<ResponseStore>, config: PollConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// 按默认参数等待
    pub async fn wait(&self, id: &CorrelationId) -> CompletionResult {
        self.wait_with(id, self.config).await
    }

    /// 按指定参数等待；每次未取到都会睡眠 interval，因此超时不早于 max_attempts × interval
    pub async fn wait_with(&self, id: &CorrelationId, config: PollConfig) -> CompletionResult {
        for _ in 0..config.max_attempts {
            if let Some(result) = self.store.take(id) {
                return result;
            }
            tokio::time::sleep(config.interval).await;
        }
        if let Some(result) = self.store.take_or_abandon(id) {
            return result;
        }
        warn!(
            correlation_id = %id,
            waited_ms = config.budget().as_millis() as u64,
            "Gave up waiting for result"
        );
        CompletionResult::timeout(id.clone())
    }
}
