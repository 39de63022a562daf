//! 分发层：请求入队、工作者池、结果存储与调用方轮询
//!
//! 数据流：Dispatcher::submit → 队列 → WorkerPool → CompletionBackend
//! → ResponseStore::publish → PollingClient::wait（take）。
//! 队列与结果存储是仅有的共享可变状态，关联 ID 是唯一的同步键。

pub mod dispatcher;
pub mod poller;
pub mod request;
pub mod store;
pub mod worker;

pub use dispatcher::Dispatcher;
pub use poller::{PollConfig, PollingClient};
pub use request::{CompletionRequest, CompletionResult, CorrelationId, Outcome};
pub use store::{PublishStatus, ResponseStore};
pub use worker::{
    BackendProcessor, CannedProcessor, RequestProcessor, WorkerPool, WorkerStatsSnapshot,
};
