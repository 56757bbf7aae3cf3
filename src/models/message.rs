use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single typed unit of message content.
///
/// This is a closed union: every consumer matches exhaustively, so a new
/// variant is a compile error at each site that needs to handle it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// A model request to invoke a registered tool. Only ever appears in
    /// assistant messages.
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// The outcome of a tool invocation, correlated to a prior `ToolUse`
    /// by id. Only ever appears in user messages, and the correlation id is
    /// always produced by the agent, never by the model.
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use<I: Into<String>, N: Into<String>>(id: I, name: N, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn tool_result<I: Into<String>, C: Into<String>>(tool_use_id: I, content: C) -> Self {
        ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: content.into(),
        }
    }

    /// Get the text if this is a Text block
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Message content is either one raw string or an ordered list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// The typed blocks, if this content is block-structured.
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Text(_) => &[],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    /// All tool-use blocks, in the order they appear.
    pub fn tool_use_blocks(&self) -> Vec<&ContentBlock> {
        self.blocks()
            .iter()
            .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
            .collect()
    }

    fn push(&mut self, block: ContentBlock) {
        match self {
            MessageContent::Blocks(blocks) => blocks.push(block),
            MessageContent::Text(text) => {
                let mut blocks = Vec::new();
                if !text.is_empty() {
                    blocks.push(ContentBlock::text(std::mem::take(text)));
                }
                blocks.push(block);
                *self = MessageContent::Blocks(blocks);
            }
        }
    }
}

/// A message to or from the model. The role is fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Create a new user message with no content
    pub fn user() -> Self {
        Message {
            role: Role::User,
            content: MessageContent::Blocks(Vec::new()),
        }
    }

    /// Create a new assistant message with no content
    pub fn assistant() -> Self {
        Message {
            role: Role::Assistant,
            content: MessageContent::Blocks(Vec::new()),
        }
    }

    /// Add any content block to the message
    pub fn with_content(mut self, block: ContentBlock) -> Self {
        self.content.push(block);
        self
    }

    /// Add a text block to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(ContentBlock::text(text))
    }

    /// Add a tool-use block to the message
    pub fn with_tool_use<I: Into<String>, N: Into<String>>(
        self,
        id: I,
        name: N,
        input: Value,
    ) -> Self {
        self.with_content(ContentBlock::tool_use(id, name, input))
    }

    /// Add a tool-result block to the message
    pub fn with_tool_result<I: Into<String>, C: Into<String>>(
        self,
        tool_use_id: I,
        content: C,
    ) -> Self {
        self.with_content(ContentBlock::tool_result(tool_use_id, content))
    }
}

/// A message produced during one agent call, with its token cost.
///
/// Providers produce these for model replies; the agent produces them with
/// `tokens_used = 0` for synthesized tool-result messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub role: Role,
    pub content: MessageContent,
    pub tokens_used: u32,
}

impl OutputMessage {
    pub fn new(role: Role, content: MessageContent, tokens_used: u32) -> Self {
        OutputMessage {
            role,
            content,
            tokens_used,
        }
    }

    /// The role/content projection sent back to the model on later turns.
    pub fn as_message(&self) -> Message {
        Message {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// The terminal result of one agent call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub output: Vec<OutputMessage>,
    pub output_text: String,
    pub tokens_used: u32,
}

/// The most recent text anywhere in the output sequence, scanning messages
/// and their blocks from the end.
pub fn select_last_text(messages: &[OutputMessage]) -> Option<String> {
    for message in messages.iter().rev() {
        match &message.content {
            MessageContent::Text(text) => return Some(text.clone()),
            MessageContent::Blocks(blocks) => {
                for block in blocks.iter().rev() {
                    if let ContentBlock::Text { text } = block {
                        return Some(text.clone());
                    }
                }
            }
        }
    }
    None
}

/// Every piece of assistant text in emission order. Text blocks within a
/// message and messages themselves are joined with a blank line.
pub fn select_all_text(messages: &[OutputMessage]) -> String {
    messages
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .map(|message| match &message.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join("\n\n"),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
