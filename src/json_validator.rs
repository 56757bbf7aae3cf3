use serde_json::Value;

use crate::errors::{AgentError, AgentResult};
use crate::models::message::{
    select_last_text, Message, MessageContent, OutputMessage, Role,
};
use crate::observation::Observation;
use crate::providers::base::{FetchRequest, Provider};

const VALIDATOR_INSTRUCTIONS: &str =
    "You are a JSON validator. You help ensure responses match the request JSON schema.";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// How many characters of the offending text travel with a validation
/// failure.
const SNIPPET_LEN: usize = 100;

/// Extract the first balanced top-level JSON object from free text.
///
/// Scans from the first `{`, tracking string and escape state so braces
/// inside string values do not confuse the depth count. Returns the empty
/// string when no balanced object exists; truncated output is never
/// guessed at.
pub fn select_json_in_text(text: &str) -> &str {
    let start = match text.find('{') {
        Some(index) => index,
        None => return "",
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[start..=start + offset];
                }
            }
            _ => {}
        }
    }

    ""
}

enum Validation {
    Valid(Value),
    Invalid(Vec<String>),
}

/// Parse and validate candidate text against a schema. A parse failure
/// yields the parser's message as the sole error; schema failures yield one
/// message per violation in the validator's emission order.
fn validate_against_schema(text: &str, schema: &Value) -> AgentResult<Validation> {
    let parsed: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return Ok(Validation::Invalid(vec![e.to_string()])),
    };

    let validator = jsonschema::validator_for(schema)
        .map_err(|e| AgentError::Internal(format!("invalid JSON schema: {e}")))?;
    let errors: Vec<String> = validator
        .iter_errors(&parsed)
        .map(|error| error.to_string())
        .collect();

    if errors.is_empty() {
        Ok(Validation::Valid(parsed))
    } else {
        Ok(Validation::Invalid(errors))
    }
}

/// The outcome of a successful repair run: every message exchanged while
/// repairing (empty when the seed was already valid), the canonical JSON
/// text, and the tokens the repair calls consumed.
#[derive(Debug)]
pub struct ValidatedJson {
    pub output: Vec<OutputMessage>,
    pub output_text: String,
    pub tokens_used: u32,
}

/// Bounded self-correction loop turning a possibly-invalid model reply into
/// schema-valid JSON or a fatal error.
pub struct JsonValidator<'a> {
    provider: &'a dyn Provider,
    model: &'a str,
    json_schema: &'a Value,
    observation: Observation,
    max_tokens: u32,
    max_attempts: u32,
}

impl<'a> JsonValidator<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        model: &'a str,
        json_schema: &'a Value,
        observation: Observation,
        max_tokens: u32,
    ) -> Self {
        Self {
            provider,
            model,
            json_schema,
            observation,
            max_tokens,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Validate `result` against the schema, re-prompting the model with the
    /// validation errors up to `max_attempts` times. The original
    /// instructions, user input, and invalid response seed the transcript;
    /// later attempts rely on the growing transcript alone.
    pub async fn validate(
        &self,
        instructions: &str,
        input: &str,
        result: &str,
    ) -> AgentResult<ValidatedJson> {
        let input_messages = vec![
            Message {
                role: Role::User,
                content: MessageContent::Text(format!(
                    "<instructions>{instructions}</instructions>\n<user_input>{input}</user_input>"
                )),
            },
            Message {
                role: Role::Assistant,
                content: MessageContent::Text(result.to_string()),
            },
        ];

        let mut output_messages: Vec<OutputMessage> = Vec::new();
        let mut tokens_used: u32 = 0;
        let mut attempts: u32 = 0;
        let mut candidate = result.to_string();

        loop {
            attempts += 1;
            let selected = select_json_in_text(&candidate);

            let errors = match validate_against_schema(selected, self.json_schema)? {
                Validation::Valid(parsed) => {
                    let output_text = serde_json::to_string(&parsed)
                        .map_err(|e| AgentError::Internal(e.to_string()))?;
                    return Ok(ValidatedJson {
                        output: output_messages,
                        output_text,
                        tokens_used,
                    });
                }
                Validation::Invalid(errors) => errors,
            };

            if attempts > self.max_attempts {
                return Err(AgentError::InvalidJsonAfterMaxAttempts {
                    attempts: self.max_attempts,
                    snippet: candidate.chars().take(SNIPPET_LEN).collect(),
                });
            }

            tracing::debug!(attempt = attempts, errors = errors.len(), "JSON invalid, re-prompting");
            output_messages.push(error_report_message(&errors));

            let transcript: Vec<Message> = input_messages
                .iter()
                .cloned()
                .chain(output_messages.iter().map(OutputMessage::as_message))
                .collect();
            let request = FetchRequest {
                system: Some(VALIDATOR_INSTRUCTIONS),
                model: self.model,
                messages: &transcript,
                tools: &[],
                max_tokens: self.max_tokens.saturating_sub(tokens_used),
                name: Some("structure_json"),
            };
            let reply = self.provider.fetch_message(&request, &self.observation).await?;

            tokens_used += reply.tokens_used;
            candidate = select_last_text(std::slice::from_ref(&reply)).unwrap_or_default();
            output_messages.push(reply);
        }
    }
}

/// The synthetic user message reporting validation errors back to the model.
fn error_report_message(errors: &[String]) -> OutputMessage {
    OutputMessage::new(
        Role::User,
        MessageContent::Text(format!(
            "The JSON response contained the following errors. Can you fix them?\n\
             <errors>\n{}\n</errors>\n\
             Return only the corrected JSON object with no other commentary.",
            errors.join("\n")
        )),
        0,
    )
}
