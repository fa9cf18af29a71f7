use crate::badges::{BadgeChange, BadgeStore, BadgeTracker, JsonFileBadgeStore, MemoryBadgeStore};
use crate::filter::{display_text, EntryFilter, FilterMode};
use crate::graph::ConversationGraph;
use crate::preferences::Preferences;
use crate::stats::{DetailStats, SessionStats, StatsAggregator};
use crate::transcript::{Role, Transcript};
use crate::types::{
    BadgeReport, HeaderView, LoadTranscriptRequest, NodeView, Request, Response,
    SessionStatsRequest, TranscriptView,
};
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// Parse transcript text, logging and counting the lines that were skipped.
pub fn load_transcript(contents: &str) -> (Transcript, usize) {
    let (transcript, errors) = Transcript::parse(contents);
    for (line, err) in &errors {
        warn!("transcript parse error at line {line}: {err}");
    }
    (transcript, errors.len())
}

/// Long-lived request handler. Holds the preferences and the badge
/// tracker, so badge baselines carry over between requests.
pub struct Service {
    prefs: Preferences,
    tracker: BadgeTracker<Box<dyn BadgeStore>>,
}

impl Service {
    /// With a data directory, preferences come from (and badges persist
    /// to) that directory. Without one, defaults apply and badges are
    /// kept in memory.
    pub fn open(data_dir: Option<&Path>, now: DateTime<Utc>) -> Result<Self> {
        let (prefs, store): (Preferences, Box<dyn BadgeStore>) = match data_dir {
            Some(dir) => {
                let prefs = Preferences::load(dir)?;
                let store = JsonFileBadgeStore::new(prefs.badge_path(dir));
                debug!(path = %store.path().display(), "using badge file");
                (prefs, Box::new(store))
            }
            None => (Preferences::default(), Box::new(MemoryBadgeStore::new())),
        };
        Ok(Self::with_store(prefs, store, now))
    }

    pub fn with_store(prefs: Preferences, store: Box<dyn BadgeStore>, now: DateTime<Utc>) -> Self {
        let tracker = BadgeTracker::load(store, prefs.badge_ttl(), now);
        Self { prefs, tracker }
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    /// Answer one request. `now` is used wherever the request carries no
    /// clock of its own.
    pub fn handle(&mut self, request: Request, now: DateTime<Utc>) -> Result<Response> {
        match request {
            Request::LoadTranscript(req) => self.transcript_view(&req).map(Response::Transcript),
            Request::SessionStats(req) => Ok(Response::Stats(Box::new(self.session_stats(&req, now)))),
            Request::SessionDetail(req) => {
                let (transcript, _) = load_transcript(&req.content);
                Ok(Response::Detail(DetailStats::from_entries(transcript.entries())))
            }
            Request::RefreshBadges(req) => {
                let now = req.now.unwrap_or(now);
                let changes = self.tracker.refresh(&req.sessions, now);
                Ok(self.badge_report(changes, now))
            }
            Request::ClearBadge(req) => {
                self.tracker.clear(&req.session_id);
                Ok(self.badge_report(Vec::new(), now))
            }
            Request::ClearAllBadges => {
                self.tracker.clear_all();
                Ok(self.badge_report(Vec::new(), now))
            }
            Request::SearchResults(req) => {
                let now = req.now.unwrap_or(now);
                let rows = req.results.iter().map(|r| r.to_summary(now)).collect();
                Ok(Response::Sessions(rows))
            }
        }
    }

    fn badge_report(&self, changes: Vec<BadgeChange>, now: DateTime<Utc>) -> Response {
        Response::Badges(BadgeReport {
            changes,
            badges: self.tracker.badges(now),
        })
    }

    fn session_stats(&self, req: &SessionStatsRequest, now: DateTime<Utc>) -> SessionStats {
        let now = req.now.unwrap_or(now);
        let mut aggregator = StatsAggregator::new(now, self.prefs.utc_offset());
        for input in &req.sessions {
            let transcript = match input.content.as_deref() {
                Some(contents) => load_transcript(contents).0,
                None => Transcript::empty(),
            };
            aggregator.add_session(&input.summary, transcript.entries());
        }
        aggregator.finish()
    }

    fn transcript_view(&self, req: &LoadTranscriptRequest) -> Result<TranscriptView> {
        let (transcript, skipped_lines) = load_transcript(&req.content);
        let graph = ConversationGraph::build(&transcript);

        let mode = match req.filter.as_deref() {
            Some(name) => FilterMode::parse(name),
            None => self.prefs.filter_mode(),
        };
        let filter = EntryFilter::new(mode)
            .search(&req.search)
            .labels(req.labels.clone());

        let active_leaf = match req.active_leaf.as_deref() {
            Some(id) if transcript.get(id).is_none() => {
                bail!("active leaf {id} is not an entry of this transcript")
            }
            Some(id) => Some(id),
            None => transcript.last_message_id(),
        };
        let active_path = active_leaf
            .map(|id| graph.active_path(id))
            .unwrap_or_default();
        let on_path: HashSet<&str> = active_path.iter().copied().collect();

        let flat = graph.flatten();
        let nodes: Vec<NodeView> = filter
            .apply(&graph, &flat)
            .into_iter()
            .map(|node| {
                let entry = graph.entry(node.index);
                NodeView {
                    id: entry.id.clone(),
                    parent_id: entry.parent_id.clone(),
                    kind: entry.kind_name().to_string(),
                    role: entry.role().map(Role::as_str),
                    depth: node.depth,
                    timestamp: entry.timestamp.clone(),
                    text: display_text(entry),
                    active: on_path.contains(entry.id.as_str()),
                    branch: graph.is_branch_point(node.index),
                    label: filter.label(&entry.id).map(str::to_string),
                    select: graph.entry(graph.newest_leaf_index(node.index)).id.clone(),
                }
            })
            .collect();

        let session = transcript.header().map(|(entry, header)| HeaderView {
            id: entry.id.clone(),
            timestamp: entry.timestamp.clone(),
            cwd: header.cwd.clone(),
            version: header.version,
        });

        debug!(
            total = transcript.len(),
            shown = nodes.len(),
            filter = mode.as_str(),
            "built transcript view"
        );

        Ok(TranscriptView {
            session,
            filter: mode.as_str(),
            total: transcript.len(),
            shown: nodes.len(),
            roots: graph.roots().len(),
            skipped_lines,
            active_leaf: active_leaf.map(str::to_string),
            active_path: active_path.into_iter().map(str::to_string).collect(),
            nodes,
        })
    }
}
