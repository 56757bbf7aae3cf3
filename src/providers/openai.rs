use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;

use super::base::{FetchRequest, Provider};
use super::configs::OpenAiProviderConfig;
use super::utils::{messages_to_openai_spec, openai_response_to_blocks, tools_to_openai_spec};
use crate::cache::LocalCache;
use crate::errors::AgentError;
use crate::models::message::{MessageContent, OutputMessage, Role};

#[derive(Debug)]
pub struct OpenAiProvider {
    client: Client,
    config: OpenAiProviderConfig,
    cache: Option<LocalCache>,
}

impl OpenAiProvider {
    /// Fails fast when neither credentials nor a cache are available: such a
    /// provider could never answer anything.
    pub fn new(config: OpenAiProviderConfig, cache: Option<LocalCache>) -> Result<Self> {
        if config.api_key.is_none() && cache.is_none() {
            return Err(AgentError::NoBackendConfigured(
                "OpenAI provider needs an api key or a cache".to_string(),
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

    /// Total tokens for the call, falling back to prompt + completion.
    fn get_usage(data: &Value) -> u32 {
        let usage = &data["usage"];
        usage["total_tokens"]
            .as_u64()
            .or_else(|| {
                match (
                    usage["prompt_tokens"].as_u64(),
                    usage["completion_tokens"].as_u64(),
                ) {
                    (Some(input), Some(output)) => Some(input + output),
                    _ => None,
                }
            })
            .unwrap_or(0) as u32
    }

    async fn post(&self, api_key: &str, payload: Value) -> Result<Value> {
        let url = format!(
            "{}/v1/chat/completions",
            self.config.host.trim_end_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            status if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500 => {
                Err(anyhow!("Server error: {}", status))
            }
            _ => Err(anyhow!(
                "Request failed: {}\nPayload: {}",
                response.status(),
                payload
            )),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn cache(&self) -> Option<&LocalCache> {
        self.cache.as_ref()
    }

    async fn fetch_raw_message(&self, request: &FetchRequest<'_>) -> Result<OutputMessage> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            AgentError::NoBackendConfigured(
                "request missed the cache and no OpenAI api key is configured".to_string(),
            )
        })?;

        let mut messages_array = Vec::new();
        if let Some(system) = request.system {
            messages_array.push(json!({"role": "system", "content": system}));
        }
        messages_array.extend(messages_to_openai_spec(request.messages));

        let mut payload = json!({
            "model": request.model,
            "messages": messages_array,
            "max_tokens": request.max_tokens,
        });

        if !request.tools.is_empty() {
            let tools_spec = tools_to_openai_spec(request.tools)?;
            payload
                .as_object_mut()
                .expect("payload is an object")
                .insert("tools".to_string(), json!(tools_spec));
        }

        let response = self.post(api_key, payload).await?;

        if let Some(error) = response.get("error") {
            return Err(anyhow!("OpenAI API error: {}", error));
        }

        let blocks = openai_response_to_blocks(&response)?;
        Ok(OutputMessage::new(
            Role::Assistant,
            MessageContent::Blocks(blocks),
            Self::get_usage(&response),
        ))
    }
}
