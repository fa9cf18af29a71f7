use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashMap;

// ===================================================================
// Top-level transcript entry: one per JSONL line
// ===================================================================

/// A single line of a session transcript.
///
/// The envelope (`id`, `parentId`, `timestamp`) is shared by every kind;
/// the remaining fields are decoded according to the `type` discriminator.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: String,
    /// Weak back-reference to another entry's `id`. May dangle.
    pub parent_id: Option<String>,
    pub timestamp: Option<String>,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    Message(Message),
    ModelChange(ModelChange),
    Compaction(Compaction),
    BranchSummary(BranchSummary),
    CustomMessage(CustomMessage),
    SessionHeader(SessionHeader),
    /// A `type` (or message role) this crate does not know about. Kept so
    /// the graph stays intact; never rendered or counted.
    Unknown { kind: String, raw: Value },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
}

/// Treat an explicit `null` the same as a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ===================================================================
// Messages
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    ToolResult,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::ToolResult => "toolResult",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    ToolResult(ToolResultMessage),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub stop_reason: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Output of a tool invocation, linked back to the `toolCall` block that
/// produced it through `tool_call_id`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMessage {
    #[serde(default)]
    pub tool_call_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i64>,
    #[serde(default)]
    pub cancelled: Option<bool>,
    /// Tool-specific payload; kept opaque apart from `diff`.
    #[serde(default)]
    pub details: Option<Value>,
}

impl ToolResultMessage {
    /// Unified diff attached by editing tools, if any.
    pub fn diff(&self) -> Option<&str> {
        self.details.as_ref()?.get("diff")?.as_str()
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageBlock> {
        self.content.blocks().iter().filter_map(|b| match b {
            ContentBlock::Image(img) => Some(img),
            _ => None,
        })
    }
}

impl Message {
    /// Decode the `message` object of a `message` entry. Returns `Ok(None)`
    /// for roles this crate does not model.
    fn decode(value: Option<&Value>) -> serde_json::Result<Option<Self>> {
        let value = match value {
            Some(v) if v.is_object() => v,
            _ => return Err(serde_json::Error::custom("missing `message` object")),
        };
        let message = match value.get("role").and_then(Value::as_str) {
            Some("user") => Message::User(UserMessage::deserialize(value)?),
            Some("assistant") => Message::Assistant(AssistantMessage::deserialize(value)?),
            Some("toolResult") => Message::ToolResult(ToolResultMessage::deserialize(value)?),
            Some(_) => return Ok(None),
            None => return Err(serde_json::Error::custom("missing `message.role`")),
        };
        Ok(Some(message))
    }

    pub fn role(&self) -> Role {
        match self {
            Message::User(_) => Role::User,
            Message::Assistant(_) => Role::Assistant,
            Message::ToolResult(_) => Role::ToolResult,
        }
    }

    pub fn content(&self) -> &MessageContent {
        match self {
            Message::User(m) => &m.content,
            Message::Assistant(m) => &m.content,
            Message::ToolResult(m) => &m.content,
        }
    }
}

/// `content` can be a plain string (user text) or an array of content
/// blocks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Blocks(Vec::new())
    }
}

impl MessageContent {
    pub fn blocks(&self) -> &[ContentBlock] {
        match self {
            MessageContent::Blocks(b) => b,
            MessageContent::Text(_) => &[],
        }
    }

    /// Non-empty text pieces in order. A plain-string content counts as a
    /// single text block.
    pub fn texts(&self) -> Vec<&str> {
        match self {
            MessageContent::Text(t) if !t.is_empty() => vec![t.as_str()],
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text(t) if !t.text.is_empty() => Some(t.text.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }

    /// True when there is at least one block and every block is a text
    /// block whose trimmed text is empty.
    pub fn is_blank_text_only(&self) -> bool {
        match self {
            MessageContent::Text(t) => t.trim().is_empty(),
            MessageContent::Blocks(blocks) => {
                !blocks.is_empty()
                    && blocks.iter().all(|b| match b {
                        ContentBlock::Text(t) => t.text.trim().is_empty(),
                        _ => false,
                    })
            }
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCallBlock> {
        self.blocks().iter().filter_map(|b| match b {
            ContentBlock::ToolCall(tc) => Some(tc),
            _ => None,
        })
    }
}

// ===================================================================
// Content blocks inside message.content[]
// ===================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text(TextBlock),
    Thinking(ThinkingBlock),
    ToolCall(ToolCallBlock),
    Image(ImageBlock),
    /// Unrecognised `type`, or a known type whose fields did not decode.
    Unknown(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TextBlock {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingBlock {
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub thinking_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolCallBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlock {
    pub mime_type: String,
    pub data: String,
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Value::deserialize(deserializer)?;
        let kind = raw.get("type").and_then(Value::as_str).map(str::to_owned);
        let decoded = match kind.as_deref() {
            Some("text") => TextBlock::deserialize(&raw).map(ContentBlock::Text),
            Some("thinking") => ThinkingBlock::deserialize(&raw).map(ContentBlock::Thinking),
            Some("toolCall") => ToolCallBlock::deserialize(&raw).map(ContentBlock::ToolCall),
            Some("image") => ImageBlock::deserialize(&raw).map(ContentBlock::Image),
            _ => return Ok(ContentBlock::Unknown(raw)),
        };
        Ok(decoded.unwrap_or(ContentBlock::Unknown(raw)))
    }
}

// ===================================================================
// Usage (token counts and pre-priced cost on assistant messages)
// ===================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    #[serde(default)]
    pub input: u64,
    #[serde(default)]
    pub output: u64,
    #[serde(default)]
    pub cache_read: u64,
    #[serde(default)]
    pub cache_write: u64,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub cost: Option<UsageCost>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCost {
    #[serde(default)]
    pub input: f64,
    #[serde(default)]
    pub output: f64,
    #[serde(default)]
    pub cache_read: f64,
    #[serde(default)]
    pub cache_write: f64,
    #[serde(default)]
    pub total: Option<f64>,
}

impl UsageCost {
    /// The producer's `total` when present, otherwise the sum of the parts.
    pub fn amount(&self) -> f64 {
        self.total
            .unwrap_or(self.input + self.output + self.cache_read + self.cache_write)
    }
}

// ===================================================================
// Non-message entry kinds
// ===================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelChange {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compaction {
    #[serde(default)]
    pub tokens_before: Option<u64>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub first_kept_entry_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchSummary {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub from_id: Option<String>,
}

/// Extension-injected message (`customType` names the producer).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomMessage {
    #[serde(default)]
    pub custom_type: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub content: MessageContent,
    #[serde(default)]
    pub display: Option<bool>,
}

/// First line of a transcript file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SessionHeader {
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl Entry {
    /// Decode one already-parsed JSONL line.
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        let envelope = Envelope::deserialize(&value)?;
        let kind = match envelope.kind.as_str() {
            "message" => match Message::decode(value.get("message"))? {
                Some(message) => EntryKind::Message(message),
                None => EntryKind::Unknown {
                    kind: envelope.kind.clone(),
                    raw: value,
                },
            },
            "model_change" => EntryKind::ModelChange(ModelChange::deserialize(&value)?),
            "compaction" => EntryKind::Compaction(Compaction::deserialize(&value)?),
            "branch_summary" => EntryKind::BranchSummary(BranchSummary::deserialize(&value)?),
            "custom_message" => EntryKind::CustomMessage(CustomMessage::deserialize(&value)?),
            "session" | "session_header" => {
                EntryKind::SessionHeader(SessionHeader::deserialize(&value)?)
            }
            other => EntryKind::Unknown {
                kind: other.to_string(),
                raw: value,
            },
        };
        Ok(Entry {
            id: envelope.id,
            parent_id: envelope.parent_id,
            timestamp: envelope.timestamp,
            kind,
        })
    }

    /// Stable name of the entry kind, as written on the wire for known kinds.
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            EntryKind::Message(_) => "message",
            EntryKind::ModelChange(_) => "model_change",
            EntryKind::Compaction(_) => "compaction",
            EntryKind::BranchSummary(_) => "branch_summary",
            EntryKind::CustomMessage(_) => "custom_message",
            EntryKind::SessionHeader(_) => "session_header",
            EntryKind::Unknown { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match &self.kind {
            EntryKind::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_message(&self) -> bool {
        self.message().is_some()
    }

    pub fn role(&self) -> Option<Role> {
        self.message().map(Message::role)
    }
}

// ===================================================================
// Transcript: parsed JSONL with typed entries and an id index
// ===================================================================

/// A parsed session transcript. Immutable once built.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<Entry>,
    by_id: HashMap<String, usize>, // id → index of its first occurrence
}

impl Transcript {
    /// An empty transcript (no entries).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from already-decoded entries, preserving their order.
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let mut by_id = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            by_id.entry(entry.id.clone()).or_insert(i);
        }
        Self { entries, by_id }
    }

    /// Parse a JSONL transcript string. Returns the transcript and any
    /// lines that failed to parse (with 1-based line number and error).
    /// Blank lines are skipped silently.
    pub fn parse(contents: &str) -> (Self, Vec<(usize, String)>) {
        let mut entries = Vec::new();
        let mut errors = Vec::new();

        for (i, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let decoded = serde_json::from_str::<Value>(line).and_then(Entry::from_value);
            match decoded {
                Ok(entry) => entries.push(entry),
                Err(e) => errors.push((i + 1, format!("{e}"))),
            }
        }

        (Self::from_entries(entries), errors)
    }

    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.index_of(id).map(|i| &self.entries[i])
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// All entries in line order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The first session header in the transcript, if any.
    pub fn header(&self) -> Option<(&Entry, &SessionHeader)> {
        self.entries.iter().find_map(|e| match &e.kind {
            EntryKind::SessionHeader(h) => Some((e, h)),
            _ => None,
        })
    }

    /// Id of the last `message` entry, the leaf a viewer selects on load.
    pub fn last_message_id(&self) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.is_message())
            .map(|e| e.id.as_str())
    }
}
