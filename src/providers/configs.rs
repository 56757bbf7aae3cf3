use std::env;

pub const OPENAI_HOST: &str = "https://api.openai.com";
pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";

/// Configuration for the OpenAI chat-completions backend. The api key is
/// optional so a cache-only provider can replay recorded calls without
/// credentials.
#[derive(Debug)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: Option<String>,
}

impl OpenAiProviderConfig {
    pub fn new(host: String, api_key: Option<String>) -> Self {
        Self { host, api_key }
    }

    pub fn from_env() -> Self {
        Self::new(
            env::var("OPENAI_HOST").unwrap_or_else(|_| OPENAI_HOST.to_string()),
            env::var("OPENAI_API_KEY").ok(),
        )
    }
}

/// Configuration for the Anthropic messages backend.
pub struct AnthropicProviderConfig {
    pub host: String,
    pub api_key: Option<String>,
}

impl AnthropicProviderConfig {
    pub fn new(host: String, api_key: Option<String>) -> Self {
        Self { host, api_key }
    }

    pub fn from_env() -> Self {
        Self::new(
            env::var("ANTHROPIC_HOST").unwrap_or_else(|_| ANTHROPIC_HOST.to_string()),
            env::var("ANTHROPIC_API_KEY").ok(),
        )
    }
}
