use crate::graph::{ConversationGraph, FlatNode};
use crate::transcript::{Entry, EntryKind, Message, Role};
use std::collections::HashMap;

/// Maximum number of characters of message text used for display and search.
pub const DISPLAY_TEXT_CHARS: usize = 100;

// ===================================================================
// FilterMode: mutually exclusive tree views
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    /// Everything except blank assistant "settings" entries and entry
    /// types this build does not recognize.
    #[default]
    Default,
    /// `Default`, minus tool results.
    NoTools,
    /// Only user messages.
    UserOnly,
    /// Only entries carrying a label.
    LabeledOnly,
    /// Every entry, unrecognized types included.
    All,
}

impl FilterMode {
    /// Parse a mode name. Unknown names fall back to `All`.
    pub fn parse(s: &str) -> Self {
        match s {
            "default" => FilterMode::Default,
            "no-tools" => FilterMode::NoTools,
            "user-only" => FilterMode::UserOnly,
            "labeled-only" => FilterMode::LabeledOnly,
            _ => FilterMode::All,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FilterMode::Default => "default",
            FilterMode::NoTools => "no-tools",
            FilterMode::UserOnly => "user-only",
            FilterMode::LabeledOnly => "labeled-only",
            FilterMode::All => "all",
        }
    }
}

// ===================================================================
// Entry predicates
// ===================================================================

/// Text shown for a tree row: the first 100 characters of a user or
/// assistant message's text blocks. Empty for every other entry.
pub fn display_text(entry: &Entry) -> String {
    match entry.message() {
        Some(m @ (Message::User(_) | Message::Assistant(_))) => m
            .content()
            .texts()
            .join("\n")
            .chars()
            .take(DISPLAY_TEXT_CHARS)
            .collect(),
        _ => String::new(),
    }
}

/// An assistant message whose content is nothing but blank text.
pub fn is_settings_entry(entry: &Entry) -> bool {
    matches!(entry.message(), Some(Message::Assistant(m)) if m.content.is_blank_text_only())
}

// ===================================================================
// EntryFilter
// ===================================================================

/// A filter mode plus an optional case-insensitive search over display text.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    mode: FilterMode,
    needle: String,
    labels: HashMap<String, String>,
}

impl EntryFilter {
    pub fn new(mode: FilterMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    /// Restrict to entries whose display text contains `query`, ignoring
    /// case. An empty query matches everything.
    pub fn search(mut self, query: &str) -> Self {
        self.needle = query.to_lowercase();
        self
    }

    /// Labels assigned outside the transcript, keyed by entry id.
    pub fn labels(mut self, labels: HashMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn label(&self, id: &str) -> Option<&str> {
        self.labels
            .get(id)
            .map(String::as_str)
            .filter(|l| !l.is_empty())
    }

    pub fn matches(&self, entry: &Entry) -> bool {
        if !self.needle.is_empty()
            && !display_text(entry).to_lowercase().contains(&self.needle)
        {
            return false;
        }

        if self.mode != FilterMode::All && matches!(entry.kind, EntryKind::Unknown { .. }) {
            return false;
        }

        match self.mode {
            FilterMode::Default => !is_settings_entry(entry),
            FilterMode::NoTools => {
                entry.role() != Some(Role::ToolResult) && !is_settings_entry(entry)
            }
            FilterMode::UserOnly => entry.role() == Some(Role::User),
            FilterMode::LabeledOnly => self.label(&entry.id).is_some(),
            FilterMode::All => true,
        }
    }

    /// The subset of `nodes` that pass, in flatten order.
    pub fn apply(&self, graph: &ConversationGraph<'_>, nodes: &[FlatNode]) -> Vec<FlatNode> {
        nodes
            .iter()
            .copied()
            .filter(|n| self.matches(graph.entry(n.index)))
            .collect()
    }
}
