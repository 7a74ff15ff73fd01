//! Core types for kernel conversations

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Message roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

impl Role {
    /// Get the role as a wire string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Function => "function",
        }
    }
}

/// Stable identity of a message, assigned at creation.
///
/// Identities are monotonically increasing within a process. Cloning a
/// message preserves its id, so bookkeeping keyed by id (ephemeral
/// entries, the promoted set, the summary reference) survives the
/// deep copies the loop makes. Two messages with identical content are
/// still distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(u64);

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

impl MessageId {
    /// Allocate the next message id.
    pub fn next() -> Self {
        MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::next()
    }
}

/// A single content block: text, or an image referenced by local path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentItem {
    /// Text content
    Text { text: String },
    /// Image content, referring to a file on the local filesystem
    Image { image: String },
}

impl ContentItem {
    /// Create a text item
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create an image item from a filesystem path
    pub fn image(path: impl Into<String>) -> Self {
        Self::Image { image: path.into() }
    }

    /// Get text if this is a text item
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

/// Message content: a plain string, a list of content items, or a
/// structured payload (tool results)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text
    Text(String),
    /// Multimodal content items
    Items(Vec<ContentItem>),
    /// Structured payload, typically a tool result
    Data(serde_json::Value),
}

impl Content {
    /// Combined text rendering of this content.
    ///
    /// Structured payloads serialize to compact JSON; image items render
    /// as an empty string (the path is not prose).
    pub fn text(&self) -> String {
        match self {
            Content::Text(text) => text.clone(),
            Content::Items(items) => items
                .iter()
                .filter_map(|item| item.as_text())
                .collect::<Vec<_>>()
                .join(""),
            Content::Data(value) => serde_json::to_string(value).unwrap_or_default(),
        }
    }

    /// Character length of the text rendering
    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }
}

impl Default for Content {
    fn default() -> Self {
        Content::Text(String::new())
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Content::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Content::Text(text)
    }
}

impl From<serde_json::Value> for Content {
    fn from(value: serde_json::Value) -> Self {
        Content::Data(value)
    }
}

/// A function call emitted by the model on an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Tool name
    pub name: String,
    /// Arguments as a JSON-encoded string, as produced by the model
    pub arguments: String,
}

/// Free-form message metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extra {
    /// Pairs an assistant tool call with its function reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_id: Option<String>,
}

/// A typed conversational unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Stable identity, preserved across clones
    #[serde(default)]
    pub id: MessageId,
    pub role: Role,
    pub content: Content,
    /// Tool name, for function-role messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool call requested by the model, on assistant messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default)]
    pub extra: Extra,
    /// Creation time, epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    fn new(role: Role, content: Content) -> Self {
        Self {
            id: MessageId::next(),
            role,
            content,
            name: None,
            function_call: None,
            extra: Extra::default(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a system message
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, Content::Text(text.into()))
    }

    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, Content::Text(text.into()))
    }

    /// Create an assistant message with text content
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Content::Text(text.into()))
    }

    /// Create an assistant message carrying a tool call
    pub fn assistant_call(
        name: impl Into<String>,
        arguments: impl Into<String>,
        function_id: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Assistant, Content::Text(String::new()));
        msg.function_call = Some(FunctionCall {
            name: name.into(),
            arguments: arguments.into(),
        });
        msg.extra.function_id = Some(function_id.into());
        msg
    }

    /// Create a function-role message (a tool reply)
    pub fn function(
        name: impl Into<String>,
        content: Content,
        function_id: Option<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Function, content);
        msg.name = Some(name.into());
        msg.extra.function_id = function_id;
        msg
    }

    /// Whether this message has the given role
    pub fn is_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Combined text rendering of the content
    pub fn text(&self) -> String {
        self.content.text()
    }
}

/// Tool definition exposed to the model via the function list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Tool name (used in tool calls)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for parameters
    pub parameters: serde_json::Value,
}

impl FunctionSpec {
    /// Create a new function spec
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}
