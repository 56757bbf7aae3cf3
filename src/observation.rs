use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A tracing backend. Implementations record generations and their outputs;
/// the crate ships none, so tracing stays fully optional.
pub trait Tracer: Send + Sync {
    /// Start a child observation for one model generation.
    fn generation(&self, input: &Value, model: Option<&str>, max_tokens: Option<u32>)
        -> Box<dyn Tracer>;

    /// Record the output of this observation.
    fn end(&self, output: &Value);
}

/// An explicitly passed observation handle. With no tracer attached every
/// operation is a no-op, so tests and cache-only replays need no backend.
#[derive(Clone, Default)]
pub struct Observation {
    tracer: Option<Arc<dyn Tracer>>,
}

impl Observation {
    pub fn new(tracer: Arc<dyn Tracer>) -> Self {
        Observation {
            tracer: Some(tracer),
        }
    }

    pub fn generation(&self, input: &Value, model: Option<&str>, max_tokens: Option<u32>) -> Self {
        match &self.tracer {
            Some(tracer) => Observation {
                tracer: Some(Arc::from(tracer.generation(input, model, max_tokens))),
            },
            None => Observation::default(),
        }
    }

    pub fn end(&self, output: &Value) {
        if let Some(tracer) = &self.tracer {
            tracer.end(output);
        }
    }
}

impl fmt::Debug for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observation")
            .field("traced", &self.tracer.is_some())
            .finish()
    }
}
