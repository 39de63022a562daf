//! 请求分发
//!
//! submit 生成新的关联 ID，把请求放入工作队列后立即返回；
//! 不调用后端，也不等待工作者空闲。调用方之后自行轮询或放弃。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::{CompletionRequest, CompletionResult, CorrelationId, ResponseStore};
use crate::core::ChatError;
use crate::llm::ModelParameters;

/// 分发器（可克隆，克隆共享同一队列与存储）
#[derive(Clone)]
pub struct Dispatcher {
    queue_tx: mpsc::UnboundedSender<CompletionRequest>,
    store: Arc<ResponseStore>,
    submitted: Arc<AtomicU64>,
}

impl Dispatcher {
    /// 创建分发器，返回队列接收端（交给 WorkerPool）
    pub fn new(store: Arc<ResponseStore>) -> (Self, mpsc::UnboundedReceiver<CompletionRequest>) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        (
            Self {
                queue_tx,
                store,
                submitted: Arc::new(AtomicU64::new(0)),
            },
            queue_rx,
        )
    }

    /// 入队一个请求，返回其关联 ID
    pub fn submit(
        &self,
        caller_id: &str,
        system_message: impl Into<String>,
        user_message: impl Into<String>,
        params: ModelParameters,
    ) -> Result<CorrelationId, ChatError> {
        let correlation_id = CorrelationId::new();
        let request = CompletionRequest {
            caller_id: caller_id.to_string(),
            correlation_id: correlation_id.clone(),
            system_message: system_message.into(),
            user_message: user_message.into(),
            params,
            enqueued_at: chrono::Utc::now().timestamp_millis(),
        };
        self.queue_tx
            .send(request)
            .map_err(|_| ChatError::DispatcherClosed)?;
        self.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(caller_id, correlation_id = %correlation_id, "Request queued");
        Ok(correlation_id)
    }

    /// 不经过队列与后端，直接发布预置的成功结果（离线演示与确定性测试用）
    pub fn submit_canned(&self, caller_id: &str, text: impl Into<String>) -> CorrelationId {
        let correlation_id = CorrelationId::new();
        self.store
            .publish(CompletionResult::success(correlation_id.clone(), text, 0));
        self.submitted.fetch_add(1, Ordering::Relaxed);
        debug!(caller_id, correlation_id = %correlation_id, "Canned result published");
        correlation_id
    }

    pub fn store(&self) -> &Arc<ResponseStore> {
        &self.store
    }

    /// 累计提交数
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.queue_tx.is_closed()
    }
}
