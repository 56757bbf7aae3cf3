use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cache::LocalCache;
use crate::models::message::{Message, OutputMessage};
use crate::observation::Observation;
use crate::tool::Tool;

/// Version tag baked into every cache key so a change to the cache entry
/// format invalidates old entries instead of misreading them.
pub const CACHE_KEY_VERSION: u32 = 1;

/// One model call: everything a backend needs to produce the next message.
pub struct FetchRequest<'a> {
    pub system: Option<&'a str>,
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [Tool],
    pub max_tokens: u32,
    /// Caller-supplied label for this call, e.g. `turn-3`.
    pub name: Option<&'a str>,
}

impl FetchRequest<'_> {
    /// The normalized projection a request is cached under. The observation
    /// handle is deliberately excluded: it is not part of the request
    /// semantics and would never hash stably.
    pub fn cache_key(&self) -> Result<Value> {
        let tools: Vec<Value> = self.tools.iter().map(|tool| tool.identity()).collect();
        Ok(json!({
            "version": CACHE_KEY_VERSION,
            "system": self.system,
            "model": self.model,
            "messages": serde_json::to_value(self.messages)?,
            "tools": tools,
            "name": self.name,
            "max_tokens": self.max_tokens,
        }))
    }
}

/// A backend that turns a request into one assistant message.
///
/// `fetch_raw_message` is the only thing a concrete backend implements: the
/// translation to and from its vendor wire format. The provided
/// `fetch_message` wraps it with the caching and observation protocol, so
/// every backend gets replayability for free.
///
/// Token metering contract: `tokens_used` on a returned message is the total
/// (input + output) token count for the call. Backends adapt whatever their
/// vendor reports to that convention.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The cache consulted before, and written after, each raw call.
    fn cache(&self) -> Option<&LocalCache> {
        None
    }

    /// Perform the actual backend call. Implementations do wire translation
    /// only; no retries, no caching.
    async fn fetch_raw_message(&self, request: &FetchRequest<'_>) -> Result<OutputMessage>;

    /// Fetch the next message, consulting the cache first and recording the
    /// result on a miss. Entries are only ever written on a miss, so a
    /// recorded call is never overwritten.
    async fn fetch_message(
        &self,
        request: &FetchRequest<'_>,
        observation: &Observation,
    ) -> Result<OutputMessage> {
        let key = request.cache_key()?;
        let generation = observation.generation(&key, Some(request.model), Some(request.max_tokens));

        if let Some(cache) = self.cache() {
            if let Some(hit) = cache.get(&key)? {
                let message: OutputMessage = serde_json::from_value(hit)?;
                generation.end(&serde_json::to_value(&message)?);
                return Ok(message);
            }
        }

        let message = self.fetch_raw_message(request).await?;
        if let Some(cache) = self.cache() {
            cache.set(&key, serde_json::to_value(&message)?)?;
        }
        generation.end(&serde_json::to_value(&message)?);
        Ok(message)
    }
}
