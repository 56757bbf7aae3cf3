use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::fmt;
use std::future::Future;

use crate::errors::AgentResult;
use crate::models::message::Message;
use crate::observation::Observation;

/// Context handed to a tool handler for one invocation.
pub struct ToolContext {
    /// A fresh unique id for this invocation, generated by the agent.
    pub id: String,
    /// The transcript up to the point the model requested the tool.
    pub messages: Vec<Message>,
    pub observation: Observation,
}

type ToolHandler =
    dyn Fn(Value, ToolContext) -> BoxFuture<'static, AgentResult<String>> + Send + Sync;

/// A named, schema-typed capability the model may request.
///
/// The handler runs locally; expected domain failures should be reported in
/// the returned text so the model can react to them. An `Err` from the
/// handler aborts the whole agent call.
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    handler: Box<ToolHandler>,
}

impl Tool {
    /// Create a new tool with the given name, description and input schema
    pub fn new<N, D, F, Fut>(name: N, description: D, input_schema: Value, handler: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<String>> + Send + 'static,
    {
        Tool {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Box::new(move |input, context| Box::pin(handler(input, context))),
        }
    }

    /// Create a tool that takes no structured input. The input schema
    /// defaults to an empty object.
    pub fn without_input_schema<N, D, F, Fut>(name: N, description: D, handler: F) -> Self
    where
        N: Into<String>,
        D: Into<String>,
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AgentResult<String>> + Send + 'static,
    {
        Self::new(name, description, json!({"type": "object"}), handler)
    }

    pub async fn call(&self, input: Value, context: ToolContext) -> AgentResult<String> {
        (self.handler)(input, context).await
    }

    /// The projection used for cache identity. Two structurally identical
    /// tool definitions produce identical projections regardless of which
    /// instance they came from.
    pub fn identity(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema,
        })
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}
