//! Generic OpenAI-compatible provider.
//!
//! Works with any API that implements the OpenAI chat completions
//! interface: OpenRouter, Groq, LM Studio, vLLM, llama.cpp server, or
//! Ollama's own `/v1` shim.
//!
//! Config example:
//! ```yaml
//! model:
//!   provider: openai-compat
//!   model: qwen2.5-coder
//!   endpoint: http://localhost:8080/v1/chat/completions
//!   api_key: $LLAMA_KEY   # optional; some local servers need none
//! ```

use std::any::Any;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ChatMessage, ModelProvider, ProviderResponse, TokenUsage};

/// Provider that talks to any OpenAI-compatible chat completions API.
pub struct OpenAICompatProvider {
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OpenAICompatProvider {
    /// Create a provider with explicit configuration.
    ///
    /// `api_key` may be empty for local servers that don't require auth.
    pub fn new(
        endpoint: String,
        api_key: String,
        model: String,
        temperature: f32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            api_key,
            endpoint,
            model,
            temperature,
            client,
        })
    }

    async fn post(&self, body: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let mut req = self.client.post(&self.endpoint).json(body);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI-compat API returned {status}: {text}");
        }

        resp.json().await.context("invalid JSON from OpenAI-compat API")
    }
}

#[async_trait]
impl ModelProvider for OpenAICompatProvider {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error> {
        let body = json!({
            "model": self.model,
            "messages": super::serialize_messages(messages),
            "temperature": self.temperature,
        });

        let json = self.post(&body).await?;
        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        Ok(content)
    }

    async fn send_chat_with_functions(
        &self,
        messages: &[ChatMessage],
        functions: &[serde_json::Value],
    ) -> Result<(ProviderResponse, Option<TokenUsage>), anyhow::Error> {
        let mut body = json!({
            "model": self.model,
            "messages": super::serialize_messages(messages),
            "temperature": self.temperature,
        });

        if !functions.is_empty() {
            body["tools"] = serde_json::Value::Array(functions.to_vec());
            body["tool_choice"] = json!("auto");
        }

        let json = self.post(&body).await?;
        let usage = super::parse_token_usage(&json);

        if let Some(pr) = super::parse_tool_calls(&json) {
            return Ok((pr, usage));
        }

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();

        Ok((ProviderResponse::Final(content), usage))
    }

    fn name(&self) -> &str {
        "openai-compat"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(endpoint: &str, key: &str) -> OpenAICompatProvider {
        OpenAICompatProvider::new(
            endpoint.into(),
            key.into(),
            "llama3".into(),
            0.2,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn construct_with_empty_key() {
        let p = provider("http://localhost:8080/v1/chat/completions", "");
        assert_eq!(p.model, "llama3");
        assert!(p.api_key.is_empty());
    }

    #[tokio::test]
    async fn send_chat_fails_without_server() {
        let p = provider("http://127.0.0.1:1/v1/chat/completions", "");
        let msgs = vec![ChatMessage::new("user", "hi")];
        assert!(p.send_chat(&msgs).await.is_err());
    }

    #[tokio::test]
    async fn tool_calls_are_parsed_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": null, "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "read-file", "arguments": "{\"file_path\":\"a.py\"}"}}
                ]}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
            })))
            .mount(&server)
            .await;

        let p = provider(&format!("{}/v1/chat/completions", server.uri()), "sk-test");
        let funcs = vec![json!({"type": "function", "function": {"name": "read-file"}})];
        let (resp, usage) = p
            .send_chat_with_functions(&[ChatMessage::new("user", "read a.py")], &funcs)
            .await
            .unwrap();
        match resp {
            ProviderResponse::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].id, "call_1");
                assert_eq!(calls[0].name, "read-file");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert_eq!(usage.unwrap().total_tokens, 5);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let p = provider(&format!("{}/v1/chat/completions", server.uri()), "");
        let err = p
            .send_chat(&[ChatMessage::new("user", "hi")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
    }
}
