//! DeepSeek 预设（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat (常规对话), deepseek-reasoner (思考模式)

use crate::llm::OpenAiBackend;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";
pub const DEEPSEEK_REASONER: &str = "deepseek-reasoner";

/// 创建 DeepSeek 后端
///
/// 密钥优先取参数，其次 `DEEPSEEK_API_KEY`，最后 `OPENAI_API_KEY`
pub fn create_deepseek_backend(api_key: Option<&str>) -> OpenAiBackend {
    let api_key = api_key
        .map(String::from)
        .or_else(|| std::env::var("DEEPSEEK_API_KEY").ok())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    OpenAiBackend::new(Some(DEEPSEEK_BASE_URL), api_key.as_deref())
}
