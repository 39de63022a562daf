//! OpenAI 兼容补全后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；支持 DeepSeek、OpenAI、自建代理等。
//! 模型名与温度取自每个请求的 ModelParameters，而不是后端实例。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use tracing::debug;

use crate::llm::{BackendError, CompletionBackend, ModelParameters};
use crate::memory::{Message, Role};

pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    /// api_key 未提供时读取 OPENAI_API_KEY
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
        }
    }

    fn to_openai_messages(
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, BackendError> {
        messages
            .iter()
            .map(|m| {
                let content = m.content.clone();
                let built = match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(content)
                        .build()
                        .map(ChatCompletionRequestMessage::System),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(content)
                        .build()
                        .map(ChatCompletionRequestMessage::User),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(content)
                        .build()
                        .map(ChatCompletionRequestMessage::Assistant),
                };
                built.map_err(map_openai_error)
            })
            .collect()
    }
}

/// 把 async_openai 的错误归入 BackendError；参数构造错误不可重试
fn map_openai_error(err: OpenAIError) -> BackendError {
    match err {
        OpenAIError::Reqwest(e) => BackendError::NetworkError(e.to_string()),
        OpenAIError::ApiError(e) => BackendError::BadStatus {
            status: 0,
            body: e.to_string(),
        },
        OpenAIError::JSONDeserialize(..) => BackendError::ParseError(err.to_string()),
        OpenAIError::InvalidArgument(msg) => BackendError::InvalidRequest(msg),
        other => BackendError::NetworkError(other.to_string()),
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(
        &self,
        messages: &[Message],
        params: &ModelParameters,
    ) -> Result<String, BackendError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&params.model)
            .temperature(params.temperature)
            .messages(Self::to_openai_messages(messages)?)
            .build()
            .map_err(map_openai_error)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        if let Some(usage) = &response.usage {
            debug!(
                model = %params.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion token usage"
            );
        }

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| BackendError::ParseError("response has no message content".into()))
    }

    fn name(&self) -> &str {
        "openai"
    }
}
