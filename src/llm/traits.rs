//! 补全后端抽象
//!
//! 所有后端（OpenAI 兼容 / 通用 HTTP / Mock）实现 CompletionBackend：
//! 输入按角色标注的消息列表与模型参数，返回生成文本或 BackendError。
//! 后端只由 WorkerPool 调用，调用方从不直接接触。

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::Message;

/// 模型参数：模型名与温度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub model: String,
    pub temperature: f32,
}

impl ModelParameters {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self::new("gpt-3.5-turbo", 0.2)
    }
}

/// 单次后端调用的失败原因
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Bad status {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    /// 单次尝试超过 T
    #[error("Attempt timed out after {0:?}")]
    AttemptTimeout(Duration),

    /// 请求本身不合法（构造失败），重试无意义
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl BackendError {
    /// 是否为瞬时错误（网络 / 非成功状态 / 解析失败 / 超时），瞬时错误才重试
    pub fn is_transient(&self) -> bool {
        !matches!(self, BackendError::InvalidRequest(_))
    }
}

/// 补全后端 trait
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// 非流式补全
    async fn complete(
        &self,
        messages: &[Message],
        params: &ModelParameters,
    ) -> Result<String, BackendError>;

    /// 后端名称（用于日志）
    fn name(&self) -> &str {
        "backend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(BackendError::NetworkError("reset".into()).is_transient());
        assert!(BackendError::BadStatus {
            status: 502,
            body: String::new()
        }
        .is_transient());
        assert!(BackendError::ParseError("eof".into()).is_transient());
        assert!(BackendError::AttemptTimeout(Duration::from_secs(1)).is_transient());
        assert!(!BackendError::InvalidRequest("empty".into()).is_transient());
    }
}
