use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::base::{FetchRequest, Provider};
use crate::cache::LocalCache;
use crate::models::message::{MessageContent, OutputMessage, Role};

/// A snapshot of one request as the backend saw it, for assertions on the
/// outgoing system prompt and budgets.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub name: Option<String>,
}

/// A provider that replays pre-configured responses, for tests and examples.
///
/// Responses are returned in order; once the script runs out, every further
/// call produces an empty assistant message. The backend call counter makes
/// "exactly N provider calls" assertions possible, and every request that
/// reaches the backend is recorded.
pub struct MockProvider {
    responses: Arc<Mutex<Vec<OutputMessage>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    calls: AtomicUsize,
    cache: Option<LocalCache>,
}

impl MockProvider {
    /// Create a new mock provider with a sequence of responses
    pub fn new(responses: Vec<OutputMessage>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicUsize::new(0),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: LocalCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// How many times the raw backend was invoked (cache hits not included).
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request the raw backend received, in call order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("mock request lock").clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn cache(&self) -> Option<&LocalCache> {
        self.cache.as_ref()
    }

    async fn fetch_raw_message(&self, request: &FetchRequest<'_>) -> Result<OutputMessage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("mock request lock")
            .push(RecordedRequest {
                system: request.system.map(str::to_string),
                model: request.model.to_string(),
                max_tokens: request.max_tokens,
                name: request.name.map(str::to_string),
            });
        let mut responses = self.responses.lock().expect("mock script lock");
        if responses.is_empty() {
            Ok(OutputMessage::new(
                Role::Assistant,
                MessageContent::Blocks(Vec::new()),
                0,
            ))
        } else {
            Ok(responses.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::{ContentBlock, Message};
    use crate::observation::Observation;
    use serde_json::json;
    use tempfile::tempdir;

    fn text_response(text: &str, tokens: u32) -> OutputMessage {
        OutputMessage::new(
            Role::Assistant,
            MessageContent::Blocks(vec![ContentBlock::text(text)]),
            tokens,
        )
    }

    fn request<'a>(messages: &'a [Message]) -> FetchRequest<'a> {
        FetchRequest {
            system: None,
            model: "test-model",
            messages,
            tools: &[],
            max_tokens: 100,
            name: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let provider = MockProvider::new(vec![text_response("one", 1), text_response("two", 2)]);
        let messages = vec![Message::user().with_text("hi")];

        let first = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await
            .unwrap();
        let second = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await
            .unwrap();

        assert_eq!(first.content.blocks()[0].as_text(), Some("one"));
        assert_eq!(second.content.blocks()[0].as_text(), Some("two"));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_returns_empty_message() {
        let provider = MockProvider::new(vec![]);
        let messages = vec![Message::user().with_text("hi")];
        let message = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await
            .unwrap();
        assert!(message.content.blocks().is_empty());
        assert_eq!(message.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_cache_short_circuits_backend() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("cache.json"));
        let provider = MockProvider::new(vec![text_response("answer", 7)]).with_cache(cache);
        let messages = vec![Message::user().with_text("question")];

        let first = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await
            .unwrap();
        let second = provider
            .fetch_message(&request(&messages), &Observation::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.call_count(), 1);
        // Replayed calls never reach the backend, so only one is recorded
        assert_eq!(provider.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_requests_are_recorded_in_order() {
        let provider = MockProvider::new(vec![text_response("one", 1), text_response("two", 2)]);
        let messages = vec![Message::user().with_text("hi")];

        let first = FetchRequest {
            system: Some("first system"),
            model: "test-model",
            messages: &messages,
            tools: &[],
            max_tokens: 100,
            name: Some("turn-1"),
        };
        let second = FetchRequest {
            system: Some("second system"),
            model: "test-model",
            messages: &messages,
            tools: &[],
            max_tokens: 90,
            name: Some("turn-2"),
        };
        provider
            .fetch_message(&first, &Observation::default())
            .await
            .unwrap();
        provider
            .fetch_message(&second, &Observation::default())
            .await
            .unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].system.as_deref(), Some("first system"));
        assert_eq!(requests[0].max_tokens, 100);
        assert_eq!(requests[1].name.as_deref(), Some("turn-2"));
        assert_eq!(requests[1].max_tokens, 90);
    }

    #[tokio::test]
    async fn test_cache_key_ignores_tool_instance() {
        let dir = tempdir().unwrap();
        let cache = LocalCache::new(dir.path().join("cache.json"));
        let provider = MockProvider::new(vec![text_response("a", 1), text_response("b", 1)])
            .with_cache(cache);
        let messages = vec![Message::user().with_text("hi")];
        let make_tool = || {
            crate::tool::Tool::new(
                "echo",
                "Echoes back the input",
                json!({"type": "object"}),
                |_, _| async { Ok(String::new()) },
            )
        };

        let tools_a = vec![make_tool()];
        let tools_b = vec![make_tool()];
        let request_a = FetchRequest {
            system: None,
            model: "test-model",
            messages: &messages,
            tools: &tools_a,
            max_tokens: 100,
            name: None,
        };
        let request_b = FetchRequest {
            system: None,
            model: "test-model",
            messages: &messages,
            tools: &tools_b,
            max_tokens: 100,
            name: None,
        };

        let first = provider
            .fetch_message(&request_a, &Observation::default())
            .await
            .unwrap();
        let second = provider
            .fetch_message(&request_b, &Observation::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.call_count(), 1);
    }
}
