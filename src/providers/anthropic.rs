use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{FetchRequest, Provider};
use super::configs::AnthropicProviderConfig;
use crate::cache::LocalCache;
use crate::errors::AgentError;
use crate::models::message::{ContentBlock, Message, MessageContent, OutputMessage, Role};

const ANTHROPIC_API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
    cache: Option<LocalCache>,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig, cache: Option<LocalCache>) -> Result<Self> {
        if config.api_key.is_none() && cache.is_none() {
            return Err(AgentError::NoBackendConfigured(
                "Anthropic provider needs an api key or a cache".to_string(),
            )
            .into());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(600)) // 10 minutes timeout
            .build()?;

        Ok(Self {
            client,
            config,
            cache,
        })
    }

    /// Anthropic reports input and output separately; the metering contract
    /// wants their sum.
    fn get_usage(data: &Value) -> u32 {
        let usage = &data["usage"];
        let input = usage["input_tokens"].as_u64().unwrap_or(0);
        let output = usage["output_tokens"].as_u64().unwrap_or(0);
        (input + output) as u32
    }

    /// The internal block model maps one to one onto Anthropic's content
    /// blocks, so conversion is mechanical.
    fn messages_to_anthropic_spec(messages: &[Message]) -> Vec<Value> {
        messages
            .iter()
            .map(|message| {
                let role = match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                };
                let content = match &message.content {
                    MessageContent::Text(text) => json!(text),
                    MessageContent::Blocks(blocks) => json!(blocks
                        .iter()
                        .map(|block| match block {
                            ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                            ContentBlock::ToolUse { id, name, input } => json!({
                                "type": "tool_use",
                                "id": id,
                                "name": name,
                                "input": input,
                            }),
                            ContentBlock::ToolResult {
                                tool_use_id,
                                content,
                            } => json!({
                                "type": "tool_result",
                                "tool_use_id": tool_use_id,
                                "content": content,
                            }),
                        })
                        .collect::<Vec<_>>()),
                };
                json!({"role": role, "content": content})
            })
            .collect()
    }

    fn response_to_blocks(response: &Value) -> Result<Vec<ContentBlock>> {
        let content = response["content"]
            .as_array()
            .ok_or_else(|| anyhow!("Invalid response format from Anthropic API"))?;

        let mut blocks = Vec::new();
        for item in content {
            match item["type"].as_str() {
                Some("text") => {
                    let text = item["text"]
                        .as_str()
                        .ok_or_else(|| anyhow!("Text block without text"))?;
                    blocks.push(ContentBlock::text(text));
                }
                Some("tool_use") => {
                    blocks.push(ContentBlock::tool_use(
                        item["id"].as_str().unwrap_or_default(),
                        item["name"].as_str().unwrap_or_default(),
                        item["input"].clone(),
                    ));
                }
                other => {
                    tracing::warn!(block_type = ?other, "skipping unsupported content block");
                }
            }
        }
        Ok(blocks)
    }

    async fn post(&self, api_key: &str, payload: Value) -> Result<Value> {
        let url = format!("{}/v1/messages", self.config.host.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_API_VERSION)
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            _ => {
                let error_text = response.text().await?;
                Err(anyhow!("Request failed: {}", error_text))
            }
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn cache(&self) -> Option<&LocalCache> {
        self.cache.as_ref()
    }

    async fn fetch_raw_message(&self, request: &FetchRequest<'_>) -> Result<OutputMessage> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            AgentError::NoBackendConfigured(
                "request missed the cache and no Anthropic api key is configured".to_string(),
            )
        })?;

        let mut payload = json!({
            "model": request.model,
            "messages": Self::messages_to_anthropic_spec(request.messages),
            "max_tokens": request.max_tokens,
        });

        if let Some(system) = request.system {
            payload
                .as_object_mut()
                .expect("payload is an object")
                .insert("system".to_string(), json!(system));
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": tool.name,
                        "description": tool.description,
                        "input_schema": tool.input_schema,
                    })
                })
                .collect();
            payload
                .as_object_mut()
                .expect("payload is an object")
                .insert("tools".to_string(), json!(tools));
        }

        let response = self.post(api_key, payload).await?;

        let blocks = Self::response_to_blocks(&response)?;
        Ok(OutputMessage::new(
            Role::Assistant,
            MessageContent::Blocks(blocks),
            Self::get_usage(&response),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup_mock_server(response_body: Value) -> (MockServer, AnthropicProvider) {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test_api_key"))
            .and(header("anthropic-version", ANTHROPIC_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body))
            .mount(&mock_server)
            .await;

        let config =
            AnthropicProviderConfig::new(mock_server.uri(), Some("test_api_key".to_string()));
        let provider = AnthropicProvider::new(config, None).unwrap();
        (mock_server, provider)
    }

    fn request<'a>(messages: &'a [Message]) -> FetchRequest<'a> {
        FetchRequest {
            system: Some("You are a helpful assistant."),
            model: "claude-3-5-haiku-20241022",
            messages,
            tools: &[],
            max_tokens: 1000,
            name: None,
        }
    }

    #[test]
    fn test_no_key_and_no_cache_fails_at_construction() {
        let config = AnthropicProviderConfig::new("https://example.com".to_string(), None);
        assert!(AnthropicProvider::new(config, None).is_err());
    }

    #[tokio::test]
    async fn test_fetch_basic_message() -> Result<()> {
        let response_body = json!({
            "id": "msg_123",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Hello! How can I assist you today?"}],
            "model": "claude-3-5-haiku-20241022",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 15}
        });
        let (_server, provider) = setup_mock_server(response_body).await;

        let messages = vec![Message::user().with_text("Hello?")];
        let message = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await?;

        assert_eq!(
            message.content.blocks()[0].as_text(),
            Some("Hello! How can I assist you today?")
        );
        assert_eq!(message.tokens_used, 27);
        Ok(())
    }

    #[tokio::test]
    async fn test_fetch_tool_use_message() -> Result<()> {
        let response_body = json!({
            "id": "msg_tool",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "Let me check."},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "SF"}}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 10}
        });
        let (_server, provider) = setup_mock_server(response_body).await;

        let messages = vec![Message::user().with_text("Weather in SF?")];
        let message = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await?;

        assert_eq!(message.content.blocks().len(), 2);
        assert_eq!(
            message.content.blocks()[1],
            ContentBlock::tool_use("toolu_1", "get_weather", json!({"location": "SF"}))
        );
        assert_eq!(message.tokens_used, 30);
        Ok(())
    }

    #[test]
    fn test_messages_to_anthropic_spec_blocks() {
        let messages = vec![
            Message::assistant().with_tool_use("1", "echo", json!({"message": "hi"})),
            Message::user().with_tool_result("1", "hi"),
        ];
        let spec = AnthropicProvider::messages_to_anthropic_spec(&messages);
        assert_eq!(spec[0]["content"][0]["type"], json!("tool_use"));
        assert_eq!(spec[1]["content"][0]["tool_use_id"], json!("1"));
    }
}
