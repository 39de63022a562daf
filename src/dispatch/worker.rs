//! 工作者池
//!
//! N 个独立工作者共享一个队列：每个工作者一次只处理一个请求，
//! 处理完毕发布且仅发布一个结果，然后取下一个。池的总并发恰好为 N。
//! 单个请求的任何失败（包括后端 panic）都只变成该请求的 BackendFailure，
//! 工作者本身不会退出。关闭时队列中剩余的请求以 BackendFailure 结束，不让调用方空等。

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CompletionRequest, CompletionResult, ResponseStore};
use crate::llm::{CompletionBackend, RetryPolicy};

/// 单个请求的处理逻辑；测试可替换为不访问后端的实现
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    async fn process(&self, request: &CompletionRequest) -> CompletionResult;
}

/// 默认处理：带重试地调用补全后端
pub struct BackendProcessor {
    backend: Arc<dyn CompletionBackend>,
    policy: RetryPolicy,
}

impl BackendProcessor {
    pub fn new(backend: Arc<dyn CompletionBackend>, policy: RetryPolicy) -> Self {
        Self { backend, policy }
    }
}

#[async_trait]
impl RequestProcessor for BackendProcessor {
    async fn process(&self, request: &CompletionRequest) -> CompletionResult {
        let messages = request.messages();
        let backend = &self.backend;
        let params = &request.params;
        let id = request.correlation_id.clone();

        match self
            .policy
            .execute(|| backend.complete(&messages, params))
            .await
        {
            Ok((text, attempts)) => CompletionResult::success(id, text, attempts),
            Err(exhausted) => {
                warn!(
                    correlation_id = %id,
                    backend = backend.name(),
                    attempts = exhausted.attempts,
                    error = %exhausted.last_error,
                    "Backend failed, giving up"
                );
                CompletionResult::failure(id, exhausted.last_error.to_string(), exhausted.attempts)
            }
        }
    }
}

/// 预置回复处理：不访问后端，立即给出固定文本
pub struct CannedProcessor {
    text: String,
}

impl CannedProcessor {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl RequestProcessor for CannedProcessor {
    async fn process(&self, request: &CompletionRequest) -> CompletionResult {
        CompletionResult::success(request.correlation_id.clone(), self.text.clone(), 0)
    }
}

const SHUTTING_DOWN: &str = "shutting down";

/// 工作者统计
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    backend_attempts: AtomicU64,
}

impl WorkerStats {
    fn record(&self, result: &CompletionResult) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.backend_attempts
            .fetch_add(result.attempts as u64, Ordering::Relaxed);
        if result.outcome.is_success() {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            backend_attempts: self.backend_attempts.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStatsSnapshot {
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub backend_attempts: u64,
}

type SharedQueue = Arc<Mutex<mpsc::UnboundedReceiver<CompletionRequest>>>;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// 启动 size 个工作者（至少 1 个）
    pub fn spawn(
        size: usize,
        queue_rx: mpsc::UnboundedReceiver<CompletionRequest>,
        store: Arc<ResponseStore>,
        processor: Arc<dyn RequestProcessor>,
    ) -> Self {
        let queue: SharedQueue = Arc::new(Mutex::new(queue_rx));
        let cancel = CancellationToken::new();
        let stats = Arc::new(WorkerStats::default());

        let handles = (0..size.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&queue),
                    Arc::clone(&store),
                    Arc::clone(&processor),
                    Arc::clone(&stats),
                    cancel.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(workers = handles.len(), "Worker pool started");
        Self {
            handles,
            cancel,
            stats,
        }
    }

    /// 以补全后端 + 重试策略启动
    pub fn with_backend(
        size: usize,
        queue_rx: mpsc::UnboundedReceiver<CompletionRequest>,
        store: Arc<ResponseStore>,
        backend: Arc<dyn CompletionBackend>,
        policy: RetryPolicy,
    ) -> Self {
        let processor = Arc::new(BackendProcessor::new(backend, policy));
        Self::spawn(size, queue_rx, store, processor)
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// 停止取新请求：关闭队列，排队中的请求以 BackendFailure 结束；
    /// 处理中的请求完成并发布后工作者退出
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
        info!(stats = ?self.stats.snapshot(), "Worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: SharedQueue,
    store: Arc<ResponseStore>,
    processor: Arc<dyn RequestProcessor>,
    stats: Arc<WorkerStats>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "Worker started");
    loop {
        let request = {
            let mut rx = queue.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    drain_queue(worker_id, &mut rx, &store, &stats);
                    break;
                }
                next = rx.recv() => match next {
                    Some(request) => request,
                    None => break,
                },
            }
        };

        let queued_ms = chrono::Utc::now().timestamp_millis() - request.enqueued_at;
        debug!(
            worker_id,
            correlation_id = %request.correlation_id,
            caller_id = %request.caller_id,
            queued_ms,
            "Request dequeued"
        );

        let result = match AssertUnwindSafe(processor.process(&request))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    worker_id,
                    correlation_id = %request.correlation_id,
                    "Request processing panicked"
                );
                CompletionResult::failure(
                    request.correlation_id.clone(),
                    "backend panicked",
                    0,
                )
            }
        };

        stats.record(&result);
        store.publish(result);
    }
    debug!(worker_id, "Worker stopped");
}

/// 关闭队列并为剩余请求发布失败结果
fn drain_queue(
    worker_id: usize,
    rx: &mut mpsc::UnboundedReceiver<CompletionRequest>,
    store: &ResponseStore,
    stats: &WorkerStats,
) {
    rx.close();
    let mut drained = 0usize;
    while let Ok(request) = rx.try_recv() {
        let result = CompletionResult::failure(request.correlation_id, SHUTTING_DOWN, 0);
        stats.record(&result);
        store.publish(result);
        drained += 1;
    }
    if drained > 0 {
        info!(worker_id, drained, "Failed queued requests on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, Outcome};
    use crate::llm::mock::{ConcurrencyProbe, FailingBackend, PanickingBackend, StaticBackend};
    use crate::llm::ModelParameters;
    use std::time::Duration;

    async fn wait_for(store: &ResponseStore, id: &crate::dispatch::CorrelationId) -> CompletionResult {
        for _ in 0..200 {
            if let Some(result) = store.take(id) {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no result for {id}");
    }

    #[tokio::test]
    async fn test_worker_publishes_success() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::with_backend(
            2,
            rx,
            Arc::clone(&store),
            Arc::new(StaticBackend::new("晴天")),
            RetryPolicy::new(3, Duration::from_secs(1)),
        );

        let id = dispatcher
            .submit("1", "", "北京天气怎么样", ModelParameters::default())
            .unwrap();
        let result = wait_for(&store, &id).await;
        assert_eq!(result.outcome, Outcome::Success("晴天".into()));
        assert_eq!(result.attempts, 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_backend_does_not_kill_worker() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::with_backend(
            1,
            rx,
            Arc::clone(&store),
            Arc::new(PanickingBackend::new("爆炸")),
            RetryPolicy::new(1, Duration::from_secs(1)),
        );

        let first = dispatcher.submit("1", "", "爆炸", ModelParameters::default()).unwrap();
        let second = dispatcher.submit("1", "", "正常", ModelParameters::default()).unwrap();

        let r1 = wait_for(&store, &first).await;
        assert!(matches!(r1.outcome, Outcome::BackendFailure(_)));
        let r2 = wait_for(&store, &second).await;
        assert!(r2.outcome.is_success());

        let stats = pool.stats();
        assert_eq!(stats.processed, 2);
        assert_eq!(stats.failed, 1);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_does_not_orphan_queue() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let backend = Arc::new(FailingBackend::new());
        let pool = WorkerPool::with_backend(
            1,
            rx,
            Arc::clone(&store),
            backend.clone(),
            RetryPolicy::new(2, Duration::from_secs(1)).with_retry_delay(Duration::ZERO),
        );

        let ids: Vec<_> = (0..5)
            .map(|i| {
                dispatcher
                    .submit("1", "", format!("q{i}"), ModelParameters::default())
                    .unwrap()
            })
            .collect();
        for id in &ids {
            let result = wait_for(&store, id).await;
            assert!(matches!(result.outcome, Outcome::BackendFailure(_)));
            assert_eq!(result.attempts, 2);
        }
        assert_eq!(backend.calls(), 10);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_canned_processor_never_touches_backend() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::spawn(1, rx, Arc::clone(&store), Arc::new(CannedProcessor::new("固定")));

        let id = dispatcher.submit("1", "", "hi", ModelParameters::default()).unwrap();
        let result = wait_for(&store, &id).await;
        assert_eq!(result.outcome, Outcome::Success("固定".into()));
        assert_eq!(result.attempts, 0);
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_queued_requests() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::with_backend(
            1,
            rx,
            Arc::clone(&store),
            Arc::new(ConcurrencyProbe::new(Duration::from_millis(100))),
            RetryPolicy::new(1, Duration::from_secs(5)),
        );

        let ids: Vec<_> = (0..3)
            .map(|i| {
                dispatcher
                    .submit("1", "", format!("q{i}"), ModelParameters::default())
                    .unwrap()
            })
            .collect();
        // 等第一个请求进入处理
        tokio::time::sleep(Duration::from_millis(30)).await;
        pool.shutdown().await;

        let first = store.take(&ids[0]).unwrap();
        assert_eq!(first.outcome, Outcome::Success("q0".into()));
        for id in &ids[1..] {
            let result = store.take(id).unwrap();
            assert_eq!(result.outcome, Outcome::BackendFailure(SHUTTING_DOWN.into()));
        }
        assert!(store.is_empty());

        let err = dispatcher
            .submit("1", "", "late", ModelParameters::default())
            .unwrap_err();
        assert_eq!(err, crate::core::ChatError::DispatcherClosed);
    }

    #[tokio::test]
    async fn test_shutdown_stops_idle_workers() {
        let store = Arc::new(ResponseStore::new());
        let (dispatcher, rx) = Dispatcher::new(Arc::clone(&store));
        let pool = WorkerPool::spawn(3, rx, store, Arc::new(CannedProcessor::new("x")));
        assert_eq!(pool.size(), 3);
        tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
            .await
            .expect("shutdown should not hang");
        assert!(dispatcher.is_closed());
    }
}
