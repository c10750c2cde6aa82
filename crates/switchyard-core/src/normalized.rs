//! Provider-neutral completion request and response types

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Completion request in a provider-neutral shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Caller-visible request identifier, stable across failover attempts
    pub request_id: String,

    /// List of messages in the conversation
    pub messages: Vec<Message>,

    /// Optional system prompt
    #[serde(default)]
    pub system: Option<String>,

    /// Model identifier
    pub model: String,

    /// Maximum number of tokens to generate
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling parameters (temperature, top_p, frequency_penalty, ...)
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Whether to stream the response
    #[serde(default)]
    pub stream: bool,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CompletionRequest {
    /// Create a request with a fresh request ID
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            messages,
            system: None,
            model: model.into(),
            max_tokens: None,
            parameters: BTreeMap::new(),
            stream: false,
            metadata: HashMap::new(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    /// Numeric value of a sampling parameter
    pub fn parameter_f64(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(|v| v.as_f64())
    }

    /// Whether any message carries non-text parts
    pub fn has_multimodal_content(&self) -> bool {
        self.messages
            .iter()
            .any(|m| matches!(m.content, MessageContent::Parts(ref parts) if parts.iter().any(|p| !matches!(p, ContentPart::Text { .. }))))
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Content of the message (can be text or multimodal)
    pub content: MessageContent,

    /// Optional name of the sender
    #[serde(default)]
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            name: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text)
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Content of a message (text or multimodal)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),

    /// Multimodal content (text, images, etc.)
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Return a copy with `prefix` placed in front of the text
    pub fn prepended(&self, prefix: &str) -> Self {
        match self {
            MessageContent::Text(text) => MessageContent::Text(format!("{}{}", prefix, text)),
            MessageContent::Parts(parts) => {
                let mut parts = parts.clone();
                parts.insert(
                    0,
                    ContentPart::Text {
                        text: prefix.to_string(),
                    },
                );
                MessageContent::Parts(parts)
            }
        }
    }
}

/// A part of multimodal content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { url: String },
}

/// Completion response from a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Response identifier assigned by the backend
    pub id: String,

    /// Model that produced the response
    pub model: String,

    /// Generated text
    pub content: String,

    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,

    /// Token usage statistics
    pub usage: Usage,

    /// Additional metadata
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
