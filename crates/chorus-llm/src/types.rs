//! Message, descriptor, and chunk types shared by providers and the orchestrator.
//!
//! Conversations use the OpenAI chat message shape. Everything a provider
//! streams back is expressed as a [`StreamChunk`], and the orchestrator and
//! its callers speak only that vocabulary.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Conversation types ──────────────────────────────────────────────────

/// The author of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One part of a multimodal message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// A plain text segment.
    Text { text: String },
    /// An image referenced by URL (or data URI).
    ImageUrl { image_url: ImageUrl },
}

/// Image reference inside a [`ContentPart::ImageUrl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message body: either plain text or a list of multimodal parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Returns the textual content, joining text parts with newlines.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A message in a conversation.
///
/// An ordered `Vec<Message>` forms a conversation; order is chronological
/// and is preserved all the way to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// Create a plain-text message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a multimodal message from parts.
    pub fn with_parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

// ── Provider metadata ───────────────────────────────────────────────────

fn default_true() -> bool {
    true
}

/// Static metadata describing a provider adapter.
///
/// Created once when the adapter is registered and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    /// Unique provider name.
    pub name: String,

    /// Base URL of the upstream service.
    #[serde(default)]
    pub url: String,

    /// Human-readable label, if different from the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Whether the adapter can stream incremental chunks.
    #[serde(default, alias = "supportsStream")]
    pub supports_stream: bool,

    #[serde(default, alias = "supportsSystemMessage")]
    pub supports_system_message: bool,

    #[serde(default, alias = "supportsMessageHistory")]
    pub supports_message_history: bool,

    /// Model used when a request does not name one.
    #[serde(default, alias = "defaultModel")]
    pub default_model: String,

    /// Providers marked as not working are never selected.
    #[serde(default = "default_true")]
    pub working: bool,

    /// Whether the upstream requires credentials.
    #[serde(default, alias = "needsAuth")]
    pub needs_auth: bool,
}

impl ProviderDescriptor {
    /// Create a descriptor with no optional capabilities.
    pub fn new(name: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: String::new(),
            label: None,
            supports_stream: false,
            supports_system_message: false,
            supports_message_history: false,
            default_model: default_model.into(),
            working: true,
            needs_auth: false,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_stream(mut self, supported: bool) -> Self {
        self.supports_stream = supported;
        self
    }

    pub fn with_system_message(mut self, supported: bool) -> Self {
        self.supports_system_message = supported;
        self
    }

    pub fn with_message_history(mut self, supported: bool) -> Self {
        self.supports_message_history = supported;
        self
    }

    pub fn with_working(mut self, working: bool) -> Self {
        self.working = working;
        self
    }

    pub fn with_needs_auth(mut self, needs_auth: bool) -> Self {
        self.needs_auth = needs_auth;
        self
    }

    /// The model a request will run against: the requested one if present
    /// and non-empty, otherwise this provider's default.
    pub fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(model) if !model.is_empty() => model.to_owned(),
            _ => self.default_model.clone(),
        }
    }

    /// Build the "provider selected" payload for a request.
    pub fn info(&self, requested_model: Option<&str>) -> ProviderInfo {
        ProviderInfo {
            name: self.name.clone(),
            url: self.url.clone(),
            label: self.label.clone(),
            model: self.resolve_model(requested_model),
        }
    }
}

/// Identifies the provider (and resolved model) an attempt runs against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub model: String,
}

// ── Streaming types ─────────────────────────────────────────────────────

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    /// Parse an upstream finish reason string.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "stop" => Self::Stop,
            "length" => Self::Length,
            "tool_calls" => Self::ToolCalls,
            "content_filter" => Self::ContentFilter,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Other(other) => other,
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// A generated image result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub urls: Vec<String>,
    #[serde(default)]
    pub alt: String,
}

/// A recoverable failure surfaced in-band as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub kind: String,
    pub message: String,
}

impl ErrorChunk {
    /// Snapshot an error as a plain-data marker.
    pub fn from_error(provider: Option<&str>, err: &crate::error::ProviderError) -> Self {
        Self {
            provider: provider.map(str::to_owned),
            kind: err.kind().to_owned(),
            message: err.to_string(),
        }
    }
}

/// A single unit of streamed output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum StreamChunk {
    /// A fragment of generated text.
    Text(String),
    /// A generated image.
    Image(ImageResponse),
    /// The orchestrator selected a provider for the next attempt.
    Provider(ProviderInfo),
    /// Generation finished.
    Finish(FinishReason),
    /// Token accounting.
    Usage(Usage),
    /// A recoverable error marker.
    Error(ErrorChunk),
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Whether this chunk is model-generated content.
    ///
    /// Only non-empty text and images count; once one of these reaches the
    /// caller the response has started and can no longer be moved to a
    /// different provider.
    pub fn is_content(&self) -> bool {
        match self {
            Self::Text(text) => !text.is_empty(),
            Self::Image(image) => !image.urls.is_empty(),
            Self::Provider(_) | Self::Finish(_) | Self::Usage(_) | Self::Error(_) => false,
        }
    }

    /// Empty text fragments carry nothing and are never forwarded.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

// ── Requests and results ────────────────────────────────────────────────

/// Per-call options passed through to adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Provider names to skip for this call only.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub ignored: BTreeSet<String>,

    /// Do not filter candidates by streaming support.
    #[serde(default)]
    pub ignore_stream: bool,

    /// Per-invocation timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Provider-specific keys, forwarded untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A completion request as seen by the orchestrator and adapters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Explicit model id; `None` means "the provider's default".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub options: RequestOptions,
}

impl CompletionRequest {
    /// Create a non-streaming request with the provider's default model.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            model: None,
            messages,
            stream: false,
            options: RequestOptions::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn ignoring(mut self, provider: impl Into<String>) -> Self {
        self.options.ignored.insert(provider.into());
        self
    }

    pub fn with_ignore_stream(mut self, ignore: bool) -> Self {
        self.options.ignore_stream = ignore;
        self
    }

    /// Attach a provider-specific option.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.extra.insert(key.into(), value);
        self
    }
}

/// The aggregated result of a non-streaming call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    /// Concatenation of every text chunk, in order.
    pub text: String,
    /// Images produced along the way.
    pub images: Vec<ImageResponse>,
    /// The provider that produced the result.
    pub provider: Option<ProviderInfo>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl Completion {
    /// Fold one chunk into the result. Error markers are skipped.
    ///
    /// A provider announcement starts a new attempt, so metadata left over
    /// from an earlier provider is discarded.
    pub fn push(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Text(text) => self.text.push_str(&text),
            StreamChunk::Image(image) => self.images.push(image),
            StreamChunk::Provider(info) => {
                self.provider = Some(info);
                self.images.clear();
                self.finish_reason = None;
                self.usage = None;
            }
            StreamChunk::Finish(reason) => self.finish_reason = Some(reason),
            StreamChunk::Usage(usage) => self.usage = Some(usage),
            StreamChunk::Error(_) => {}
        }
    }

    pub fn from_chunks(chunks: impl IntoIterator<Item = StreamChunk>) -> Self {
        let mut completion = Self::default();
        for chunk in chunks {
            completion.push(chunk);
        }
        completion
    }
}
