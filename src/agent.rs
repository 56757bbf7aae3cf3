use serde_json::Value;
use uuid::Uuid;

use crate::errors::{AgentError, AgentResult};
use crate::json_validator::JsonValidator;
use crate::models::message::{
    select_all_text, select_last_text, ContentBlock, Message, MessageContent, OutputMessage,
    Response, Role,
};
use crate::observation::Observation;
use crate::providers::base::{FetchRequest, Provider};
use crate::tool::{Tool, ToolContext};

pub const DEFAULT_MAX_TURNS: u32 = 5;

/// Options for one agent call. The provider is passed per call so the same
/// agent definition can run against different backends or replay caches.
pub struct GetResponseOptions<'a> {
    pub messages: &'a [Message],
    pub provider: &'a dyn Provider,
    pub model: &'a str,
    /// When set, the final answer must validate against this schema; the
    /// repair loop enforces it after the turn loop ends.
    pub json_schema: Option<&'a Value>,
    pub max_tokens: u32,
    /// Defaults to [`DEFAULT_MAX_TURNS`].
    pub max_turns: Option<u32>,
    pub observation: Option<Observation>,
}

/// An agent owns its instructions and tools; each call drives the turn loop
/// that interleaves model generations with tool invocations under the
/// caller's turn and token budgets.
#[derive(Default)]
pub struct Agent {
    instructions: Option<String>,
    tools: Vec<Tool>,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions<S: Into<String>>(mut self, instructions: S) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Run the turn loop to completion and return the terminal response.
    ///
    /// Budget exhaustion is a normal exit, never an error: hitting the turn
    /// or token ceiling returns whatever was produced so far. Within the
    /// loop only tool resolution can fail hard.
    pub async fn get_response(&self, options: GetResponseOptions<'_>) -> AgentResult<Response> {
        let GetResponseOptions {
            messages,
            provider,
            model,
            json_schema,
            max_tokens,
            max_turns,
            observation,
        } = options;
        let observation = observation.unwrap_or_default();
        let max_turns = max_turns.unwrap_or(DEFAULT_MAX_TURNS);

        let mut turns: u32 = 0;
        let mut tokens: u32 = 0;
        let mut output_messages: Vec<OutputMessage> = Vec::new();

        let mut system_message = self.instructions.clone().unwrap_or_default();
        if let Some(schema) = json_schema {
            let schema_text = serde_json::to_string_pretty(schema)
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            system_message.push_str(&format!(
                "\nIn your final message, you must return only a JSON object that matches \
                 the below schema with no other commentary.\n\
                 <json_output_schema>\n{schema_text}\n</json_output_schema>\n"
            ));
        }

        loop {
            turns += 1;
            if turns > max_turns {
                tracing::debug!(turns, max_turns, "max turns reached");
                break;
            }
            if tokens >= max_tokens {
                tracing::debug!(tokens, max_tokens, "max tokens reached");
                break;
            }

            // The full transcript goes out every turn; no model-side state
            // is assumed.
            let transcript: Vec<Message> = messages
                .iter()
                .cloned()
                .chain(output_messages.iter().map(OutputMessage::as_message))
                .collect();
            let system = format!(
                "{system_message}\n{}",
                budget_message(tokens, turns, max_tokens, max_turns)
            );
            let name = format!("turn-{turns}");
            let request = FetchRequest {
                system: Some(&system),
                model,
                messages: &transcript,
                tools: &self.tools,
                max_tokens: max_tokens - tokens,
                name: Some(&name),
            };
            let new_message = provider.fetch_message(&request, &observation).await?;
            tokens += new_message.tokens_used;

            let tool_uses: Vec<ContentBlock> = new_message
                .content
                .tool_use_blocks()
                .into_iter()
                .cloned()
                .collect();
            output_messages.push(new_message);

            if tool_uses.is_empty() {
                // The model produced a final answer
                break;
            }

            // All tool results from one assistant turn are appended before
            // the next model call, strictly in the order requested.
            for tool_use in &tool_uses {
                let result = self.run_tool(tool_use, &transcript, &observation).await?;
                output_messages.push(OutputMessage::new(
                    Role::User,
                    MessageContent::Blocks(vec![result]),
                    0,
                ));
            }
        }

        if let Some(schema) = json_schema {
            let validator =
                JsonValidator::new(provider, model, schema, observation.clone(), max_tokens);
            let seed = select_last_text(&output_messages).unwrap_or_default();
            let input = serde_json::to_string(messages)
                .map_err(|e| AgentError::Internal(e.to_string()))?;
            let validated = validator
                .validate(self.instructions.as_deref().unwrap_or_default(), &input, &seed)
                .await?;
            tokens += validated.tokens_used;
            output_messages.extend(validated.output);
            return Ok(Response {
                output: output_messages,
                output_text: validated.output_text,
                tokens_used: tokens,
            });
        }

        let output_text = select_all_text(&output_messages);
        Ok(Response {
            output: output_messages,
            output_text,
            tokens_used: tokens,
        })
    }

    fn find_tool_by_name(&self, name: &str) -> AgentResult<&Tool> {
        self.tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Execute one tool-use block and build the correlated result block.
    /// The correlation id comes from the tool-use block the model emitted;
    /// the invocation id handed to the tool is freshly generated here.
    async fn run_tool(
        &self,
        tool_use: &ContentBlock,
        transcript: &[Message],
        observation: &Observation,
    ) -> AgentResult<ContentBlock> {
        let ContentBlock::ToolUse { id, name, input } = tool_use else {
            return Err(AgentError::Internal(
                "run_tool called with a non tool_use block".to_string(),
            ));
        };
        let tool = self.find_tool_by_name(name)?;
        let context = ToolContext {
            id: Uuid::new_v4().to_string(),
            messages: transcript.to_vec(),
            observation: observation.clone(),
        };
        let content = tool.call(input.clone(), context).await?;
        Ok(ContentBlock::tool_result(id.clone(), content))
    }
}

/// The model is told how much budget remains so it can pace itself; it is
/// not told how to request more.
fn budget_message(tokens: u32, turns: u32, max_tokens: u32, max_turns: u32) -> String {
    format!(
        "You have used {tokens} tokens and {turns} turns to provide a response. \
         You have {} tokens and {} turns remaining.",
        max_tokens - tokens,
        max_turns - turns
    )
}
