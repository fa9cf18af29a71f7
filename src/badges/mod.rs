use crate::types::SessionSummary;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

// ===================================================================
// Badge state
// ===================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeKind {
    /// The session appeared since the previous refresh.
    New,
    /// The session's message count grew since the previous refresh.
    Updated,
}

/// A persisted badge. Stored as `{"type": "new", "timestamp": <unix ms>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeState {
    #[serde(rename = "type")]
    pub kind: BadgeKind,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl BadgeState {
    pub fn new(kind: BadgeKind, timestamp: DateTime<Utc>) -> Self {
        Self { kind, timestamp }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.timestamp >= ttl
    }

    fn is_valid(&self, kind: BadgeKind, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.kind == kind && !self.is_expired(now, ttl)
    }
}

/// One badge assigned by a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeChange {
    pub session_id: String,
    #[serde(rename = "type")]
    pub kind: BadgeKind,
}

// ===================================================================
// Persistence
// ===================================================================

/// Key-value persistence for badges, keyed by session id.
pub trait BadgeStore {
    fn list(&self) -> Result<HashMap<String, BadgeState>>;

    fn get(&self, session_id: &str) -> Result<Option<BadgeState>> {
        Ok(self.list()?.remove(session_id))
    }

    fn set(&mut self, session_id: &str, state: &BadgeState) -> Result<()>;
    fn delete(&mut self, session_id: &str) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

impl<S: BadgeStore + ?Sized> BadgeStore for Box<S> {
    fn list(&self) -> Result<HashMap<String, BadgeState>> {
        (**self).list()
    }

    fn get(&self, session_id: &str) -> Result<Option<BadgeState>> {
        (**self).get(session_id)
    }

    fn set(&mut self, session_id: &str, state: &BadgeState) -> Result<()> {
        (**self).set(session_id, state)
    }

    fn delete(&mut self, session_id: &str) -> Result<()> {
        (**self).delete(session_id)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }
}

/// Badges that live only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryBadgeStore {
    states: HashMap<String, BadgeState>,
}

impl MemoryBadgeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BadgeStore for MemoryBadgeStore {
    fn list(&self) -> Result<HashMap<String, BadgeState>> {
        Ok(self.states.clone())
    }

    fn get(&self, session_id: &str) -> Result<Option<BadgeState>> {
        Ok(self.states.get(session_id).cloned())
    }

    fn set(&mut self, session_id: &str, state: &BadgeState) -> Result<()> {
        self.states.insert(session_id.to_string(), state.clone());
        Ok(())
    }

    fn delete(&mut self, session_id: &str) -> Result<()> {
        self.states.remove(session_id);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.states.clear();
        Ok(())
    }
}

/// All badges in one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct JsonFileBadgeStore {
    path: PathBuf,
}

impl JsonFileBadgeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, states: &HashMap<String, BadgeState>) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(states).context("serializing badge states")?;
        fs::write(&self.path, json).with_context(|| format!("writing {}", self.path.display()))
    }

    /// Current states for a read-modify-write. An unparsable file counts as
    /// empty so the next write replaces it.
    fn current(&self) -> Result<HashMap<String, BadgeState>> {
        match read_json_file(&self.path) {
            Ok(states) => Ok(states.unwrap_or_default()),
            Err(err) if err.root_cause().is::<serde_json::Error>() => {
                warn!("discarding unreadable badge file: {err:#}");
                Ok(HashMap::new())
            }
            Err(err) => Err(err),
        }
    }
}

impl BadgeStore for JsonFileBadgeStore {
    fn list(&self) -> Result<HashMap<String, BadgeState>> {
        Ok(read_json_file(&self.path)?.unwrap_or_default())
    }

    fn set(&mut self, session_id: &str, state: &BadgeState) -> Result<()> {
        let mut states = self.current()?;
        states.insert(session_id.to_string(), state.clone());
        self.write(&states)
    }

    fn delete(&mut self, session_id: &str) -> Result<()> {
        let mut states = self.current()?;
        if states.remove(session_id).is_some() {
            self.write(&states)?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

/// Read and deserialize a JSON file, returning `None` if it doesn't exist.
fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(s) => {
            let val =
                serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(val))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}

// ===================================================================
// Classification (pure)
// ===================================================================

/// Compare the current session list against the counts from the previous
/// refresh and decide which sessions earn a badge now.
///
/// A valid `new` badge is never downgraded or re-stamped. An `updated`
/// badge is re-stamped each time the count grows again.
pub fn classify(
    previous: &HashMap<String, u64>,
    sessions: &[SessionSummary],
    existing: &HashMap<String, BadgeState>,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Vec<BadgeChange> {
    let still_new = |id: &str| {
        existing
            .get(id)
            .is_some_and(|s| s.is_valid(BadgeKind::New, now, ttl))
    };

    sessions
        .iter()
        .filter_map(|session| {
            let kind = match previous.get(&session.id) {
                None => BadgeKind::New,
                Some(&count) if session.message_count > count => BadgeKind::Updated,
                Some(_) => return None,
            };
            if still_new(&session.id) {
                return None;
            }
            Some(BadgeChange {
                session_id: session.id.clone(),
                kind,
            })
        })
        .collect()
}

// ===================================================================
// BadgeTracker
// ===================================================================

/// Tracks message counts between refreshes and keeps badges in `store`.
///
/// Store failures are logged and otherwise ignored; the in-memory view
/// stays authoritative for the life of the tracker.
pub struct BadgeTracker<S> {
    store: S,
    ttl: Duration,
    /// `None` until the first refresh establishes a baseline.
    previous: Option<HashMap<String, u64>>,
    badges: HashMap<String, BadgeState>,
}

impl<S: BadgeStore> BadgeTracker<S> {
    /// Load persisted badges, dropping (and deleting) the expired ones.
    pub fn load(store: S, ttl: Duration, now: DateTime<Utc>) -> Self {
        let badges = store.list().unwrap_or_else(|err| {
            warn!("loading badge states: {err:#}");
            HashMap::new()
        });

        let mut tracker = Self {
            store,
            ttl,
            previous: None,
            badges,
        };
        tracker.prune(now);
        debug!(count = tracker.badges.len(), "loaded badge states");
        tracker
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .badges
            .iter()
            .filter(|(_, s)| s.is_expired(now, self.ttl))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.badges.remove(&id);
            if let Err(err) = self.store.delete(&id) {
                warn!("deleting expired badge {id}: {err:#}");
            }
        }
    }

    pub fn is_baselined(&self) -> bool {
        self.previous.is_some()
    }

    /// Record the current counts and return the badges they earn. The
    /// first call only establishes the baseline.
    pub fn refresh(&mut self, sessions: &[SessionSummary], now: DateTime<Utc>) -> Vec<BadgeChange> {
        self.prune(now);
        let current = sessions
            .iter()
            .map(|s| (s.id.clone(), s.message_count))
            .collect();
        let Some(previous) = self.previous.replace(current) else {
            debug!(sessions = sessions.len(), "badge baseline established");
            return Vec::new();
        };

        let changes = classify(&previous, sessions, &self.badges, now, self.ttl);
        for change in &changes {
            let state = BadgeState::new(change.kind, now);
            if let Err(err) = self.store.set(&change.session_id, &state) {
                warn!("saving badge for {}: {err:#}", change.session_id);
            }
            self.badges.insert(change.session_id.clone(), state);
        }
        if !changes.is_empty() {
            info!(count = changes.len(), "sessions badged");
        }
        changes
    }

    /// The session's badge, if one is held and has not expired by `now`.
    pub fn badge(&self, session_id: &str, now: DateTime<Utc>) -> Option<BadgeKind> {
        self.badges
            .get(session_id)
            .filter(|s| !s.is_expired(now, self.ttl))
            .map(|s| s.kind)
    }

    pub fn badges(&self, now: DateTime<Utc>) -> BTreeMap<String, BadgeKind> {
        self.badges
            .iter()
            .filter(|(_, s)| !s.is_expired(now, self.ttl))
            .map(|(id, s)| (id.clone(), s.kind))
            .collect()
    }

    pub fn clear(&mut self, session_id: &str) {
        self.badges.remove(session_id);
        if let Err(err) = self.store.delete(session_id) {
            warn!("deleting badge for {session_id}: {err:#}");
        }
    }

    pub fn clear_all(&mut self) {
        self.badges.clear();
        if let Err(err) = self.store.clear() {
            warn!("clearing badges: {err:#}");
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
