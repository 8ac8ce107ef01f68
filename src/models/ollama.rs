//! Native Ollama provider (`POST /api/chat`, non-streaming).
//!
//! Ollama differs from the OpenAI wire format in three ways that matter
//! here: tool-call arguments are JSON objects rather than strings, tool
//! calls carry no ids, and the sampling temperature lives under
//! `options`.

use std::any::Any;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{ChatMessage, FunctionCallItem, ModelProvider, ProviderResponse, TokenUsage};

pub struct OllamaProvider {
    /// Base URL, e.g. `http://localhost:11434`.
    base_url: String,
    model: String,
    temperature: f32,
    client: Client,
}

impl OllamaProvider {
    pub fn new(
        base_url: String,
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
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature,
            client,
        })
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> anyhow::Result<Value> {
        let mut body = json!({
            "model": self.model,
            "messages": serialize_ollama_messages(messages),
            "stream": false,
            "options": { "temperature": self.temperature },
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.to_vec());
        }

        let url = self.chat_url();
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API returned {status}: {text}");
        }

        resp.json().await.context("invalid JSON from Ollama API")
    }
}

/// Messages in Ollama's dialect: argument objects instead of strings and
/// `tool_name` on tool results.
fn serialize_ollama_messages(messages: &[ChatMessage]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut msg = json!({ "role": m.role, "content": m.content });
            if let Some(ref tcs) = m.tool_calls {
                let calls: Vec<Value> = tcs
                    .iter()
                    .map(|tc| {
                        let func = &tc["function"];
                        let args = match &func["arguments"] {
                            Value::String(s) => serde_json::from_str(s).unwrap_or(json!({})),
                            Value::Null => json!({}),
                            other => other.clone(),
                        };
                        json!({ "function": { "name": func["name"], "arguments": args } })
                    })
                    .collect();
                msg["tool_calls"] = Value::Array(calls);
            }
            if let Some(ref name) = m.name {
                msg["tool_name"] = json!(name);
            }
            msg
        })
        .collect()
}

/// Extract tool calls from an Ollama chat response.
fn parse_ollama_tool_calls(json: &Value) -> Vec<FunctionCallItem> {
    json["message"]["tool_calls"]
        .as_array()
        .map(|calls| {
            calls
                .iter()
                .filter_map(|tc| {
                    let func = tc.get("function")?;
                    let name = func.get("name")?.as_str()?.to_string();
                    let arguments = match func.get("arguments") {
                        Some(Value::String(s)) => s.clone(),
                        Some(Value::Null) | None => "{}".to_string(),
                        Some(other) => other.to_string(),
                    };
                    let id = tc
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string();
                    Some(FunctionCallItem { id, name, arguments })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_ollama_usage(json: &Value) -> Option<TokenUsage> {
    let prompt = json.get("prompt_eval_count")?.as_u64()?;
    let completion = json.get("eval_count").and_then(Value::as_u64).unwrap_or(0);
    Some(TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
    })
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn send_chat(&self, messages: &[ChatMessage]) -> Result<String, anyhow::Error> {
        let json = self.chat(messages, &[]).await?;
        Ok(json["message"]["content"].as_str().unwrap_or("").to_string())
    }

    async fn send_chat_with_functions(
        &self,
        messages: &[ChatMessage],
        functions: &[Value],
    ) -> Result<(ProviderResponse, Option<TokenUsage>), anyhow::Error> {
        let json = self.chat(messages, functions).await?;
        let usage = parse_ollama_usage(&json);
        let content = json["message"]["content"].as_str().unwrap_or("").to_string();

        let calls = parse_ollama_tool_calls(&json);
        if calls.is_empty() {
            Ok((ProviderResponse::Final(content), usage))
        } else {
            Ok((ProviderResponse::ToolCalls { content, calls }, usage))
        }
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(base: String) -> OllamaProvider {
        OllamaProvider::new(base, "llama3.1".into(), 0.7, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn trailing_slash_trimmed() {
        let p = provider("http://localhost:11434/".into());
        assert_eq!(p.chat_url(), "http://localhost:11434/api/chat");
    }

    #[test]
    fn tool_call_arguments_become_objects() {
        let mut m = ChatMessage::new("assistant", "");
        m.tool_calls = Some(vec![json!({
            "id": "call_1",
            "type": "function",
            "function": {"name": "read-file", "arguments": "{\"file_path\":\"a\"}"}
        })]);
        let tool = ChatMessage {
            name: Some("read-file".into()),
            tool_call_id: Some("call_1".into()),
            ..ChatMessage::new("tool", "contents")
        };
        let out = serialize_ollama_messages(&[m, tool]);
        assert_eq!(out[0]["tool_calls"][0]["function"]["arguments"]["file_path"], "a");
        assert_eq!(out[1]["tool_name"], "read-file");
    }

    #[tokio::test]
    async fn parses_tool_calls_without_ids() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"stream": false, "model": "llama3.1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [
                        {"function": {"name": "read-file", "arguments": {"file_path": "main.py"}}},
                        {"function": {"name": "format-code", "arguments": {"file_path": "main.py"}}}
                    ]
                },
                "prompt_eval_count": 10,
                "eval_count": 4
            })))
            .mount(&server)
            .await;

        let p = provider(server.uri());
        let (resp, usage) = p
            .send_chat_with_functions(&[ChatMessage::new("user", "tidy main.py")], &[json!({})])
            .await
            .unwrap();
        match resp {
            ProviderResponse::ToolCalls { calls, .. } => {
                assert_eq!(calls.len(), 2);
                assert!(calls[0].id.is_empty());
                assert_eq!(calls[1].name, "format-code");
                let args: Value = serde_json::from_str(&calls[0].arguments).unwrap();
                assert_eq!(args["file_path"], "main.py");
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
        assert_eq!(usage.unwrap().total_tokens, 14);
    }

    #[tokio::test]
    async fn plain_reply_is_final() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": {"role": "assistant", "content": "hello"}
            })))
            .mount(&server)
            .await;

        let p = provider(server.uri());
        let reply = p.send_chat(&[ChatMessage::new("user", "hi")]).await.unwrap();
        assert_eq!(reply, "hello");
    }

    #[tokio::test]
    async fn unreachable_server_errors() {
        let p = provider("http://127.0.0.1:1".into());
        assert!(p.send_chat(&[ChatMessage::new("user", "hi")]).await.is_err());
    }
}
