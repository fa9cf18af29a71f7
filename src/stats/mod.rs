use crate::transcript::{Entry, EntryKind, Message, Usage};
use crate::types::SessionSummary;
use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Number of calendar days covered by the activity heatmap (52 weeks).
pub const HEATMAP_DAYS: usize = 364;

/// Minimum daily message counts for heatmap levels 1 through 5.
const HEATMAP_THRESHOLDS: [u64; 5] = [1, 5, 15, 30, 60];

/// Weekday bucket keys, Sunday first.
pub const WEEKDAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Quantize a day's message count into 0 (idle) … 5 (busiest).
pub fn heatmap_level(count: u64) -> u8 {
    HEATMAP_THRESHOLDS.iter().filter(|&&t| count >= t).count() as u8
}

/// Parse an RFC 3339 timestamp, or a zone-less ISO-8601 one taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc())
}

// ===================================================================
// Aggregate shapes
// ===================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelUsage {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
    /// Sum of the pre-priced cost reported with each message. Unrounded.
    pub cost: f64,
    pub messages: u64,
}

impl ModelUsage {
    fn add(&mut self, usage: &Usage) {
        self.input = self.input.saturating_add(usage.input);
        self.output = self.output.saturating_add(usage.output);
        self.cache_read = self.cache_read.saturating_add(usage.cache_read);
        self.cache_write = self.cache_write.saturating_add(usage.cache_write);
        self.cost += usage.cost.as_ref().map_or(0.0, |c| c.amount());
        self.messages += 1;
    }

    pub fn total_tokens(&self) -> u64 {
        [self.input, self.output, self.cache_read, self.cache_write]
            .into_iter()
            .fold(0, u64::saturating_add)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenDetails {
    pub total_input: u64,
    pub total_output: u64,
    pub total_cache_read: u64,
    pub total_cache_write: u64,
    pub total_cost: f64,
    pub tokens_by_model: BTreeMap<String, ModelUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatmapPoint {
    pub date: NaiveDate,
    pub count: u64,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourBucket {
    pub hour: u32,
    pub message_count: u64,
}

/// Analytics over a set of sessions. Recomputed from scratch per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_sessions: u64,
    /// Sum of the summaries' message counts.
    pub total_messages: u64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    pub tool_result_messages: u64,
    pub average_messages_per_session: f64,
    pub total_tokens: u64,
    pub token_details: TokenDetails,
    /// Message volume per activity day (`YYYY-MM-DD`).
    pub messages_by_date: BTreeMap<String, u64>,
    /// `HEATMAP_DAYS` points, oldest first, ending today.
    pub heatmap_data: Vec<HeatmapPoint>,
    /// 24 buckets, hour 0 first.
    pub time_distribution: Vec<HourBucket>,
    /// 7 buckets, Sunday first. Serialized as a map keyed `Sun`..`Sat`.
    #[serde(serialize_with = "serialize_weekdays")]
    pub messages_by_day_of_week: [u64; 7],
    pub sessions_by_project: BTreeMap<String, u64>,
    pub sessions_by_model: BTreeMap<String, u64>,
}

fn serialize_weekdays<S: Serializer>(counts: &[u64; 7], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(WEEKDAY_NAMES.iter().zip(counts))
}

impl SessionStats {
    pub fn active_days(&self) -> usize {
        self.heatmap_data.iter().filter(|p| p.level > 0).count()
    }
}

// ===================================================================
// StatsAggregator
// ===================================================================

/// Folds sessions into a `SessionStats` one at a time.
///
/// Calendar days, hours and weekdays are taken in `offset`; the heatmap
/// window ends on the day containing `now`.
pub struct StatsAggregator {
    now: DateTime<Utc>,
    offset: FixedOffset,
    stats: SessionStats,
    by_date: BTreeMap<NaiveDate, u64>,
    hourly: [u64; 24],
}

impl StatsAggregator {
    pub fn new(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now,
            offset,
            stats: SessionStats::default(),
            by_date: BTreeMap::new(),
            hourly: [0; 24],
        }
    }

    /// Add one session. `entries` may be empty when only the summary is
    /// known; role counts, tokens and time distributions then get nothing
    /// from this session.
    pub fn add_session(&mut self, summary: &SessionSummary, entries: &[Entry]) {
        let stats = &mut self.stats;
        stats.total_sessions += 1;
        stats.total_messages = stats.total_messages.saturating_add(summary.message_count);

        let project = if summary.cwd.is_empty() {
            "unknown"
        } else {
            summary.cwd.as_str()
        };
        *stats.sessions_by_project.entry(project.to_string()).or_default() += 1;

        let activity = parse_timestamp(&summary.modified).or_else(|| parse_timestamp(&summary.created));
        if let Some(at) = activity {
            let day = at.with_timezone(&self.offset).date_naive();
            let volume = self.by_date.entry(day).or_default();
            *volume = volume.saturating_add(summary.message_count);
        }

        let mut last_model: Option<&str> = None;
        for entry in entries {
            match &entry.kind {
                EntryKind::Message(message) => {
                    match message {
                        Message::User(_) => stats.user_messages += 1,
                        Message::ToolResult(_) => stats.tool_result_messages += 1,
                        Message::Assistant(a) => {
                            stats.assistant_messages += 1;
                            if let Some(model) = a.model.as_deref() {
                                last_model = Some(model);
                            }
                            if let Some(usage) = &a.usage {
                                let key = a.model.as_deref().unwrap_or("unknown");
                                stats
                                    .token_details
                                    .tokens_by_model
                                    .entry(key.to_string())
                                    .or_default()
                                    .add(usage);
                            }
                        }
                    }
                    if let Some(at) = entry.timestamp.as_deref().and_then(parse_timestamp) {
                        let local = at.with_timezone(&self.offset);
                        self.hourly[local.hour() as usize] += 1;
                        stats.messages_by_day_of_week
                            [local.weekday().num_days_from_sunday() as usize] += 1;
                    }
                }
                EntryKind::ModelChange(change) => {
                    if let Some(model) = change.model_id.as_deref() {
                        last_model = Some(model);
                    }
                }
                _ => {}
            }
        }

        if let Some(model) = last_model {
            *stats.sessions_by_model.entry(model.to_string()).or_default() += 1;
        }
    }

    pub fn finish(self) -> SessionStats {
        let mut stats = self.stats;

        let details = &mut stats.token_details;
        for usage in details.tokens_by_model.values() {
            details.total_input = details.total_input.saturating_add(usage.input);
            details.total_output = details.total_output.saturating_add(usage.output);
            details.total_cache_read = details.total_cache_read.saturating_add(usage.cache_read);
            details.total_cache_write = details.total_cache_write.saturating_add(usage.cache_write);
            details.total_cost += usage.cost;
        }
        stats.total_tokens = [
            details.total_input,
            details.total_output,
            details.total_cache_read,
            details.total_cache_write,
        ]
        .into_iter()
        .fold(0, u64::saturating_add);

        stats.average_messages_per_session = if stats.total_sessions == 0 {
            0.0
        } else {
            stats.total_messages as f64 / stats.total_sessions as f64
        };

        let today = self.now.with_timezone(&self.offset).date_naive();
        let start = today
            .checked_sub_days(Days::new(HEATMAP_DAYS as u64 - 1))
            .unwrap_or(NaiveDate::MIN);
        stats.heatmap_data = start
            .iter_days()
            .take_while(|d| *d <= today)
            .take(HEATMAP_DAYS)
            .map(|date| {
                let count = self.by_date.get(&date).copied().unwrap_or(0);
                HeatmapPoint {
                    date,
                    count,
                    level: heatmap_level(count),
                }
            })
            .collect();

        stats.messages_by_date = self
            .by_date
            .iter()
            .map(|(d, c)| (d.to_string(), *c))
            .collect();

        stats.time_distribution = self
            .hourly
            .iter()
            .enumerate()
            .map(|(hour, &message_count)| HourBucket {
                hour: hour as u32,
                message_count,
            })
            .collect();

        stats
    }
}

/// Aggregate a whole collection in one pass.
pub fn aggregate<'a, I>(sessions: I, now: DateTime<Utc>, offset: FixedOffset) -> SessionStats
where
    I: IntoIterator<Item = (&'a SessionSummary, &'a [Entry])>,
{
    let mut aggregator = StatsAggregator::new(now, offset);
    for (summary, entries) in sessions {
        aggregator.add_session(summary, entries);
    }
    aggregator.finish()
}

// ===================================================================
// Per-session detail stats
// ===================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TokenBreakdown {
    pub input: u64,
    pub output: u64,
    pub cache_read: u64,
    pub cache_write: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CostBreakdown {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    pub total: f64,
}

/// Counters shown in a single transcript's header.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetailStats {
    pub user_messages: u64,
    pub assistant_messages: u64,
    pub tool_results: u64,
    pub custom_messages: u64,
    pub compactions: u64,
    pub branch_summaries: u64,
    pub tool_calls: u64,
    /// Distinct model ids in order of first use.
    pub models: Vec<String>,
    pub tokens: TokenBreakdown,
    pub cost: CostBreakdown,
}

impl DetailStats {
    pub fn from_entries(entries: &[Entry]) -> Self {
        let mut stats = DetailStats::default();
        let note_model = |models: &mut Vec<String>, model: &str| {
            if !models.iter().any(|m| m == model) {
                models.push(model.to_string());
            }
        };

        for entry in entries {
            match &entry.kind {
                EntryKind::Message(Message::User(_)) => stats.user_messages += 1,
                EntryKind::Message(Message::ToolResult(_)) => stats.tool_results += 1,
                EntryKind::Message(Message::Assistant(a)) => {
                    stats.assistant_messages += 1;
                    stats.tool_calls += a.content.tool_calls().count() as u64;
                    if let Some(model) = a.model.as_deref() {
                        note_model(&mut stats.models, model);
                    }
                    if let Some(usage) = &a.usage {
                        let tokens = &mut stats.tokens;
                        tokens.input = tokens.input.saturating_add(usage.input);
                        tokens.output = tokens.output.saturating_add(usage.output);
                        tokens.cache_read = tokens.cache_read.saturating_add(usage.cache_read);
                        tokens.cache_write = tokens.cache_write.saturating_add(usage.cache_write);
                        if let Some(cost) = &usage.cost {
                            stats.cost.input += cost.input;
                            stats.cost.output += cost.output;
                            stats.cost.cache_read += cost.cache_read;
                            stats.cost.cache_write += cost.cache_write;
                            stats.cost.total += cost.amount();
                        }
                    }
                }
                EntryKind::ModelChange(change) => {
                    if let Some(model) = change.model_id.as_deref() {
                        note_model(&mut stats.models, model);
                    }
                }
                EntryKind::CustomMessage(_) => stats.custom_messages += 1,
                EntryKind::Compaction(_) => stats.compactions += 1,
                EntryKind::BranchSummary(_) => stats.branch_summaries += 1,
                EntryKind::SessionHeader(_) | EntryKind::Unknown { .. } => {}
            }
        }
        stats
    }

    pub fn total_tokens(&self) -> u64 {
        let t = &self.tokens;
        [t.input, t.output, t.cache_read, t.cache_write]
            .into_iter()
            .fold(0, u64::saturating_add)
    }
}

// ===================================================================
// Display helpers (the aggregate itself is never rounded)
// ===================================================================

/// `part / total * 100`, or 0 when `total` is 0.
pub fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Dollar amount with 4, 3 or 2 decimals for < 0.01, < 1 and larger.
pub fn format_cost(cost: f64) -> String {
    if cost == 0.0 {
        "$0.00".to_string()
    } else if cost < 0.01 {
        format!("${cost:.4}")
    } else if cost < 1.0 {
        format!("${cost:.3}")
    } else {
        format!("${cost:.2}")
    }
}

pub fn format_tokens(count: u64) -> String {
    if count < 1_000 {
        count.to_string()
    } else if count < 1_000_000 {
        format!("{:.1}k", count as f64 / 1_000.0)
    } else {
        format!("{:.2}M", count as f64 / 1_000_000.0)
    }
}
