use crate::badges::{BadgeChange, BadgeKind};
use crate::stats::{DetailStats, SessionStats};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ===================================================================
// Session summaries (supplied by the caller, never mutated)
// ===================================================================

/// One row of the session list as discovered by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Working directory the session ran in.
    #[serde(default)]
    pub cwd: String,
    #[serde(default)]
    pub message_count: u64,
    /// ISO-8601.
    #[serde(default)]
    pub created: String,
    /// ISO-8601.
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub first_message: String,
    #[serde(default)]
    pub last_message: String,
}

// ===================================================================
// Cross-session search records
// ===================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    #[serde(default)]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One session's hits as returned by the backend's search call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub session_id: String,
    #[serde(default)]
    pub session_path: String,
    #[serde(default)]
    pub session_name: Option<String>,
    #[serde(default)]
    pub first_message: String,
    #[serde(default)]
    pub matches: Vec<SearchMatch>,
}

impl SearchResult {
    /// Synthesize a list row for display. Search records carry no
    /// directory or timestamps, so `cwd` is empty, both timestamps are
    /// `now`, and the message count is the number of hits.
    pub fn to_summary(&self, now: DateTime<Utc>) -> SessionSummary {
        let stamp = now.to_rfc3339_opts(SecondsFormat::Millis, true);
        SessionSummary {
            id: self.session_id.clone(),
            path: self.session_path.clone(),
            name: self.session_name.clone(),
            cwd: String::new(),
            message_count: self.matches.len() as u64,
            created: stamp.clone(),
            modified: stamp,
            first_message: self.first_message.clone(),
            last_message: String::new(),
        }
    }
}

// ===================================================================
// Requests (received via stdin, tagged by "command")
// ===================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    LoadTranscript(LoadTranscriptRequest),
    SessionStats(SessionStatsRequest),
    SessionDetail(SessionDetailRequest),
    RefreshBadges(RefreshBadgesRequest),
    ClearBadge(ClearBadgeRequest),
    ClearAllBadges,
    SearchResults(SearchResultsRequest),
}

#[derive(Debug, Deserialize)]
pub struct LoadTranscriptRequest {
    /// Raw JSONL text of one transcript.
    pub content: String,
    /// Filter mode name; the configured default when absent.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub search: String,
    /// Leaf whose ancestor chain is highlighted; the last message when absent.
    #[serde(default)]
    pub active_leaf: Option<String>,
    /// Labels assigned outside the transcript, keyed by entry id.
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

/// A session summary plus, optionally, the transcript text behind it.
#[derive(Debug, Deserialize)]
pub struct SessionInput {
    #[serde(flatten)]
    pub summary: SessionSummary,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SessionStatsRequest {
    pub sessions: Vec<SessionInput>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SessionDetailRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshBadgesRequest {
    pub sessions: Vec<SessionSummary>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ClearBadgeRequest {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchResultsRequest {
    pub results: Vec<SearchResult>,
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
}

// ===================================================================
// Responses (written to stdout, one JSON document per request)
// ===================================================================

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Response {
    Transcript(TranscriptView),
    Stats(Box<SessionStats>),
    Detail(DetailStats),
    Badges(BadgeReport),
    Sessions(Vec<SessionSummary>),
    Error { error: String },
}

#[derive(Debug, Serialize)]
pub struct HeaderView {
    pub id: String,
    pub timestamp: Option<String>,
    pub cwd: Option<String>,
    pub version: Option<u32>,
}

/// One visible row of the conversation tree.
#[derive(Debug, Serialize)]
pub struct NodeView {
    pub id: String,
    pub parent_id: Option<String>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    pub depth: usize,
    pub timestamp: Option<String>,
    pub text: String,
    /// On the ancestor chain of the active leaf.
    pub active: bool,
    /// More than one entry continues from here.
    pub branch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Entry to select when this row is clicked.
    pub select: String,
}

#[derive(Debug, Serialize)]
pub struct TranscriptView {
    pub session: Option<HeaderView>,
    pub filter: &'static str,
    /// Entries in the transcript.
    pub total: usize,
    /// Entries passing the filter.
    pub shown: usize,
    pub roots: usize,
    /// Lines that could not be decoded.
    pub skipped_lines: usize,
    pub active_leaf: Option<String>,
    pub active_path: Vec<String>,
    pub nodes: Vec<NodeView>,
}

#[derive(Debug, Serialize)]
pub struct BadgeReport {
    /// Classifications made by this request.
    pub changes: Vec<BadgeChange>,
    /// Every badge still valid afterwards.
    pub badges: BTreeMap<String, BadgeKind>,
}
