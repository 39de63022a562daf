//! 分发请求与结果类型
//!
//! 关联 ID 是请求与结果之间唯一的同步键；Outcome 取代字符串哨兵值，
//! 避免与后端正常返回文本碰撞。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::llm::ModelParameters;
use crate::memory::Message;

/// 关联 ID（每次提交新建 UUID v4）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(format!("req_{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// 排队中的请求（创建后不可变，结果产生后丢弃）
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub caller_id: String,
    pub correlation_id: CorrelationId,
    pub system_message: String,
    pub user_message: String,
    pub params: ModelParameters,
    /// 入队时间（毫秒时间戳）
    pub enqueued_at: i64,
}

impl CompletionRequest {
    /// 发送给后端的消息列表；空 system 消息省略
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2);
        if !self.system_message.is_empty() {
            messages.push(Message::system(self.system_message.clone()));
        }
        messages.push(Message::user(self.user_message.clone()));
        messages
    }
}

/// 请求的最终结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    BackendFailure(String),
    Timeout,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResult {
    pub correlation_id: CorrelationId,
    pub outcome: Outcome,
    /// 后端实际尝试次数（超时结果与预置结果为 0）
    pub attempts: u32,
}

impl CompletionResult {
    pub fn success(correlation_id: CorrelationId, text: impl Into<String>, attempts: u32) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Success(text.into()),
            attempts,
        }
    }

    pub fn failure(correlation_id: CorrelationId, detail: impl Into<String>, attempts: u32) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::BackendFailure(detail.into()),
            attempts,
        }
    }

    pub fn timeout(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            outcome: Outcome::Timeout,
            attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_correlation_ids_unique() {
        let ids: HashSet<_> = (0..1000).map(|_| CorrelationId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_request_messages_skip_empty_system() {
        let req = CompletionRequest {
            caller_id: "1".into(),
            correlation_id: CorrelationId::new(),
            system_message: String::new(),
            user_message: "hi".into(),
            params: ModelParameters::default(),
            enqueued_at: 0,
        };
        assert_eq!(req.messages(), vec![Message::user("hi")]);
    }
}
