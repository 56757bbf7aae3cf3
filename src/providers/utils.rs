use anyhow::{anyhow, Result};
use regex::Regex;
use serde_json::{json, Value};

use crate::models::message::{ContentBlock, Message, MessageContent};
use crate::tool::Tool;

/// Convert internal messages to OpenAI's chat-completions message spec.
///
/// A message carrying tool-use blocks becomes one assistant message with
/// `tool_calls`; each tool-result block becomes its own `tool` role message
/// correlated by `tool_call_id`.
pub fn messages_to_openai_spec(messages: &[Message]) -> Vec<Value> {
    let mut spec = Vec::new();

    for message in messages {
        let role = match message.role {
            crate::models::message::Role::User => "user",
            crate::models::message::Role::Assistant => "assistant",
        };

        match &message.content {
            MessageContent::Text(text) => {
                spec.push(json!({"role": role, "content": text}));
            }
            MessageContent::Blocks(blocks) => {
                let mut texts = Vec::new();
                let mut tool_calls = Vec::new();
                let mut tool_results = Vec::new();

                for block in blocks {
                    match block {
                        ContentBlock::Text { text } => texts.push(text.as_str()),
                        ContentBlock::ToolUse { id, name, input } => tool_calls.push(json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": sanitize_function_name(name),
                                "arguments": input.to_string(),
                            }
                        })),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                        } => tool_results.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        })),
                    }
                }

                if !tool_calls.is_empty() {
                    let mut converted = json!({
                        "role": "assistant",
                        "tool_calls": tool_calls,
                    });
                    if !texts.is_empty() {
                        converted["content"] = json!(texts.join("\n\n"));
                    }
                    spec.push(converted);
                } else if !texts.is_empty() {
                    spec.push(json!({"role": role, "content": texts.join("\n\n")}));
                }
                spec.extend(tool_results);
            }
        }
    }

    spec
}

/// Convert internal tool definitions to OpenAI's function-tool spec.
pub fn tools_to_openai_spec(tools: &[Tool]) -> Result<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(anyhow!("Duplicate tool name: {}", tool.name));
        }
        result.push(json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "parameters": tool.input_schema,
            }
        }));
    }

    Ok(result)
}

/// Replace characters OpenAI rejects in function names.
pub fn sanitize_function_name(name: &str) -> String {
    let re = Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex");
    re.replace_all(name, "_").to_string()
}

/// Convert an OpenAI chat-completions response body to content blocks.
pub fn openai_response_to_blocks(response: &Value) -> Result<Vec<ContentBlock>> {
    let message = &response["choices"][0]["message"];
    let mut blocks = Vec::new();

    if let Some(text) = message.get("content").and_then(|c| c.as_str()) {
        blocks.push(ContentBlock::text(text));
    }

    if let Some(tool_calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default().to_string();
            let name = tool_call["function"]["name"]
                .as_str()
                .unwrap_or_default()
                .to_string();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();
            let input: Value = serde_json::from_str(arguments)
                .map_err(|e| anyhow!("Invalid tool call arguments for {}: {}", name, e))?;
            blocks.push(ContentBlock::tool_use(id, name, input));
        }
    }

    Ok(blocks)
}
