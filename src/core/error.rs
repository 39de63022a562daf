//! 对话编排错误类型
//!
//! ChatError 是调用方可见的错误分类：TemplateNotFound（调用方错误，不重试）、
//! BackendFailure（后端在 R 次尝试后仍失败）、Timeout（调用方轮询耗尽）。
//! 其余变体覆盖注册表与持久化等外围操作。

use thiserror::Error;

/// 调用方可见的错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// 轮询次数耗尽仍未取到结果；后台请求可能稍后完成并被丢弃
    #[error("Timed out waiting for {correlation_id} after {waited_ms}ms")]
    Timeout {
        correlation_id: String,
        waited_ms: u64,
    },

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent already exists: {0}")]
    AgentExists(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Agent {agent_id} is not a member of group {group_id}")]
    NotGroupMember { group_id: String, agent_id: String },

    /// 工作队列已关闭（WorkerPool 已停止）
    #[error("Dispatcher closed")]
    DispatcherClosed,

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl ChatError {
    /// 面向用户的固定失败提示，不暴露内部细节
    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::TemplateNotFound(_) => "未找到对应任务的prompt",
            ChatError::BackendFailure(_) => "模型服务暂时不可用，请稍后重试",
            ChatError::Timeout { .. } => "没有找到响应",
            ChatError::AgentNotFound(_) => "智能体不存在",
            ChatError::AgentExists(_) => "智能体ID已存在",
            ChatError::GroupNotFound(_) => "群组不存在",
            ChatError::NotGroupMember { .. } => "发起者不在群组中",
            ChatError::DispatcherClosed => "服务正在关闭",
            ChatError::Persistence(_) => "记忆保存失败",
        }
    }

    /// 是否值得由调用方稍后重试（超时与后端故障），调用方错误返回 false
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::BackendFailure(_) | ChatError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_distinct_for_core_outcomes() {
        let template = ChatError::TemplateNotFound("x".into()).user_message();
        let backend = ChatError::BackendFailure("boom".into()).user_message();
        let timeout = ChatError::Timeout {
            correlation_id: "c".into(),
            waited_ms: 10,
        }
        .user_message();
        assert_ne!(template, backend);
        assert_ne!(backend, timeout);
        assert_ne!(template, timeout);
    }

    #[test]
    fn test_user_message_hides_detail() {
        let err = ChatError::BackendFailure("api key sk-secret rejected".into());
        assert!(!err.user_message().contains("sk-secret"));
    }

    #[test]
    fn test_retryable() {
        assert!(ChatError::BackendFailure("x".into()).is_retryable());
        assert!(!ChatError::TemplateNotFound("x".into()).is_retryable());
        assert!(!ChatError::DispatcherClosed.is_retryable());
    }
}
