//! 通用 JSON-over-HTTP 补全后端
//!
//! POST `{model, temperature, messages}` 到配置的端点，回复支持两种形态：
//! OpenAI 风格的 `choices[0].message.content`，或网关风格的 `[{"text": ...}]`。
//! 连接失败、非 2xx 状态与回复解析失败分别映射为 NetworkError / BadStatus / ParseError。

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::llm::{BackendError, CompletionBackend, ModelParameters};
use crate::memory::Message;

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    temperature: f32,
    messages: &'a [Message],
    stream: bool,
}

pub struct HttpBackend {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

/// 从回复 JSON 中取出生成文本
fn extract_text(body: &Value) -> Result<String, BackendError> {
    if let Some(content) = body
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return Ok(content.to_string());
    }
    if let Some(text) = body.pointer("/0/text").and_then(Value::as_str) {
        return Ok(text.to_string());
    }
    Err(BackendError::ParseError(
        "no choices[0].message.content or [0].text in response".into(),
    ))
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn complete(
        &self,
        messages: &[Message],
        params: &ModelParameters,
    ) -> Result<String, BackendError> {
        let body = ChatBody {
            model: &params.model,
            temperature: params.temperature,
            messages,
            stream: false,
        };

        debug!(endpoint = %self.endpoint, model = %params.model, "Sending completion request");

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BackendError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Completion endpoint returned error");
            return Err(BackendError::BadStatus { status, body });
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| BackendError::ParseError(e.to_string()))?;
        extract_text(&json)
    }

    fn name(&self) -> &str {
        "http"
    }
}
