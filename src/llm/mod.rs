//! 补全后端层：抽象、重试策略与实现（OpenAI 兼容 / DeepSeek / 通用 HTTP / Mock）

pub mod deepseek;
pub mod http;
pub mod mock;
pub mod openai;
pub mod retry;
pub mod traits;

use std::sync::Arc;

pub use deepseek::{create_deepseek_backend, DEEPSEEK_CHAT, DEEPSEEK_REASONER};
pub use http::HttpBackend;
pub use mock::EchoBackend;
pub use openai::OpenAiBackend;
pub use retry::{RetryExhausted, RetryPolicy};
pub use traits::{BackendError, CompletionBackend, ModelParameters};

use crate::config::LlmSection;

/// 根据配置与环境变量选择补全后端；缺少密钥或端点时退回 Echo 后端
pub fn create_backend_from_config(cfg: &LlmSection) -> Arc<dyn CompletionBackend> {
    let provider = cfg.provider.to_lowercase();
    let has_key = |var: &str| cfg.api_key.is_some() || std::env::var(var).is_ok();

    match provider.as_str() {
        "deepseek" if has_key("DEEPSEEK_API_KEY") || has_key("OPENAI_API_KEY") => {
            tracing::info!(model = %cfg.model, "Using DeepSeek backend");
            Arc::new(create_deepseek_backend(cfg.api_key.as_deref()))
        }
        "openai" if has_key("OPENAI_API_KEY") => {
            tracing::info!(model = %cfg.model, "Using OpenAI-compatible backend");
            Arc::new(OpenAiBackend::new(
                cfg.base_url.as_deref(),
                cfg.api_key.as_deref(),
            ))
        }
        "http" => match &cfg.http.endpoint {
            Some(endpoint) => {
                tracing::info!(endpoint = %endpoint, "Using HTTP backend");
                Arc::new(HttpBackend::new(endpoint.clone(), cfg.api_key.clone()))
            }
            None => {
                tracing::warn!("llm.http.endpoint not set, using echo backend");
                Arc::new(EchoBackend)
            }
        },
        "mock" => Arc::new(EchoBackend),
        other => {
            tracing::warn!(provider = other, "No API key set or provider unknown, using echo backend");
            Arc::new(EchoBackend)
        }
    }
}
