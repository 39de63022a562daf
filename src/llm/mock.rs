//! 测试替身后端（无需 API）
//!
//! - StaticBackend：固定回复
//! - EchoBackend：回显最后一条 User 消息（离线演示用）
//! - ScriptedBackend：按顺序返回预设结果
//! - FailingBackend：永远失败并计数
//! - StallingBackend：永不返回（触发单次超时）
//! - PanickingBackend：输入包含触发词时 panic
//! - RecordingBackend：记录收到的消息
//! - ConcurrencyProbe：统计同时进行中的调用峰值

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{BackendError, CompletionBackend, ModelParameters};
use crate::memory::{Message, Role};

fn last_user(messages: &[Message]) -> &str {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or("(no input)")
}

#[derive(Debug, Clone)]
pub struct StaticBackend {
    reply: String,
}

impl StaticBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for StaticBackend {
    async fn complete(&self, _messages: &[Message], _params: &ModelParameters) -> Result<String, BackendError> {
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[derive(Debug, Default)]
pub struct EchoBackend;

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(&self, messages: &[Message], params: &ModelParameters) -> Result<String, BackendError> {
        let input = last_user(messages);
        let tail = input
            .rsplit(crate::prompt::assembler::INPUT_LABEL)
            .next()
            .unwrap_or(input);
        Ok(format!("[{}] Echo: {}", params.model, tail))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// 按顺序返回预设结果；用完后返回最后一个
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    last: Mutex<Option<Result<String, BackendError>>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, BackendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, _messages: &[Message], _params: &ModelParameters) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(BackendError::InvalidRequest("empty script".into()))),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[derive(Debug, Default)]
pub struct FailingBackend {
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for FailingBackend {
    async fn complete(&self, _messages: &[Message], _params: &ModelParameters) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::BadStatus {
            status: 503,
            body: "service unavailable".into(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[derive(Debug, Default)]
pub struct StallingBackend {
    calls: AtomicUsize,
}

impl StallingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for StallingBackend {
    async fn complete(&self, _messages: &[Message], _params: &ModelParameters) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        unreachable!("pending future never resolves")
    }

    fn name(&self) -> &str {
        "stalling"
    }
}

#[derive(Debug)]
pub struct PanickingBackend {
    trigger: String,
}

impl PanickingBackend {
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }
}

#[async_trait]
impl CompletionBackend for PanickingBackend {
    async fn complete(&self, messages: &[Message], _params: &ModelParameters) -> Result<String, BackendError> {
        let input = last_user(messages);
        if input.contains(&self.trigger) {
            panic!("backend exploded on {:?}", self.trigger);
        }
        Ok(format!("ok: {input}"))
    }
}

/// 记录每次调用收到的消息，回复固定文本
pub struct RecordingBackend {
    reply: String,
    received: Mutex<Vec<Vec<Message>>>,
    params: Mutex<Vec<ModelParameters>>,
}

impl RecordingBackend {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            received: Mutex::new(Vec::new()),
            params: Mutex::new(Vec::new()),
        }
    }

    pub fn received_params(&self) -> Vec<ModelParameters> {
        self.params.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// 最近一次调用的 user 消息
    pub fn last_user_message(&self) -> Option<String> {
        self.received()
            .last()
            .map(|messages| last_user(messages).to_string())
    }
}

#[async_trait]
impl CompletionBackend for RecordingBackend {
    async fn complete(&self, messages: &[Message], params: &ModelParameters) -> Result<String, BackendError> {
        self.received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(messages.to_vec());
        self.params
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(params.clone());
        Ok(self.reply.clone())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 每次调用持续 delay，记录同时进行中调用数的峰值
#[derive(Debug)]
pub struct ConcurrencyProbe {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ConcurrencyProbe {
    async fn complete(&self, messages: &[Message], _params: &ModelParameters) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(last_user(messages).to_string())
    }

    fn name(&self) -> &str {
        "probe"
    }
}
