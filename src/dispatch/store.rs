//! 结果存储：关联 ID → 结果
//!
//! - publish：每个 ID 只写一次；未领取的同 ID 结果存在时拒绝写入
//! - take：读取并移除，与移除原子化，同一 ID 至多投递一次；取走后不留痕迹
//! - take_or_abandon：调用方放弃等待时登记该 ID，之后迟到的结果直接丢弃
//! - 可选 TTL 清理：无人领取的结果与放弃登记在过期后删除

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CompletionResult, CorrelationId};

/// publish 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStatus {
    Stored,
    /// 同一 ID 已有未领取的结果
    Duplicate,
    /// 调用方已放弃等待，结果被丢弃
    Abandoned,
}

struct Entry {
    result: CompletionResult,
    published_at: Instant,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<CorrelationId, Entry>,
    /// 调用方已放弃的 ID 及放弃时间；对应结果发布时移除
    abandoned: HashMap<CorrelationId, Instant>,
}

/// 并发安全的结果存储
#[derive(Default)]
pub struct ResponseStore {
    inner: Mutex<Inner>,
}

impl ResponseStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn publish(&self, result: CompletionResult) -> PublishStatus {
        let mut inner = self.lock();
        let id = result.correlation_id.clone();
        if inner.abandoned.remove(&id).is_some() {
            debug!(correlation_id = %id, "Dropping result for an abandoned request");
            return PublishStatus::Abandoned;
        }
        if inner.pending.contains_key(&id) {
            warn!(correlation_id = %id, "Rejecting duplicate publish");
            return PublishStatus::Duplicate;
        }
        debug!(correlation_id = %id, "Result published");
        inner.pending.insert(
            id,
            Entry {
                result,
                published_at: Instant::now(),
            },
        );
        PublishStatus::Stored
    }

    /// 非阻塞地读取并移除
    pub fn take(&self, id: &CorrelationId) -> Option<CompletionResult> {
        self.lock().pending.remove(id).map(|e| e.result)
    }

    /// 最后一次 take；仍未取到则登记放弃，使之后发布的结果不再滞留
    pub fn take_or_abandon(&self, id: &CorrelationId) -> Option<CompletionResult> {
        let mut inner = self.lock();
        match inner.pending.remove(id) {
            Some(entry) => Some(entry.result),
            None => {
                inner.abandoned.insert(id.clone(), Instant::now());
                None
            }
        }
    }

    /// 是否有未领取的结果（不移除）
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.lock().pending.contains_key(id)
    }

    /// 未领取的结果数
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 删除发布超过 ttl 仍无人领取的结果，以及放弃超过 ttl 的登记；返回删除的结果数
    pub fn sweep_expired(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut inner = self.lock();
        let before = inner.pending.len();
        inner
            .pending
            .retain(|_, e| now.duration_since(e.published_at) < ttl);
        inner.abandoned.retain(|_, at| now.duration_since(*at) < ttl);
        before - inner.pending.len()
    }

    /// 后台定期清理，cancel 触发后退出
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        ttl: Duration,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.sweep_expired(ttl);
                        if removed > 0 {
                            info!(removed, "Swept unclaimed results");
                        }
                    }
                }
            }
        })
    }
}
