mod common;

use common::{responses, run_in, stream};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::fs;

fn refresh(rows: &[(&str, u64)], now: &str) -> Value {
    let sessions: Vec<Value> = rows
        .iter()
        .map(|(id, count)| json!({ "id": id, "message_count": count }))
        .collect();
    json!({ "command": "refresh_badges", "sessions": sessions, "now": now })
}

#[test]
fn new_then_updated_within_one_process() {
    let dir = tempfile::tempdir().unwrap();
    let input = stream(&[
        refresh(&[("A", 5), ("B", 2)], "2025-04-01T09:00:00Z"),
        refresh(&[("A", 5), ("B", 2), ("C", 1)], "2025-04-01T09:10:00Z"),
        refresh(&[("A", 8), ("B", 2), ("C", 1)], "2025-04-01T11:00:00Z"),
    ]);
    let (code, stdout, stderr) = run_in(dir.path(), &input);
    assert_eq!(code, 0, "stderr: {stderr}");
    let out = responses(&stdout);
    assert_eq!(out.len(), 3);

    assert_eq!(out[0]["changes"], json!([]));
    assert_eq!(out[0]["badges"], json!({}));

    assert_eq!(out[1]["changes"], json!([{ "session_id": "C", "type": "new" }]));
    assert_eq!(out[1]["badges"], json!({ "C": "new" }));

    assert_eq!(out[2]["changes"], json!([{ "session_id": "A", "type": "updated" }]));
    assert_eq!(out[2]["badges"], json!({ "A": "updated", "C": "new" }));

    let stored: Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("badge-states.json")).unwrap())
            .unwrap();
    assert_eq!(stored["C"]["type"], "new");
    assert!(stored["C"]["timestamp"].is_i64());
    assert!(dir.path().join("pi-sessions.toml").exists());
}

#[test]
fn badges_survive_restart_until_they_expire() {
    // Loading prunes against the wall clock, so stamps here track it.
    let base = Utc::now();
    let at = |hours: i64| (base + Duration::hours(hours)).to_rfc3339();

    let dir = tempfile::tempdir().unwrap();
    let first = stream(&[refresh(&[("A", 1)], &at(0)), refresh(&[("A", 1), ("B", 1)], &at(0))]);
    let (code, _, _) = run_in(dir.path(), &first);
    assert_eq!(code, 0);

    // Counts are not persisted: the restarted process re-baselines and
    // reports no changes, but still returns the stored badge.
    let (_, stdout, _) = run_in(dir.path(), &stream(&[refresh(&[("A", 1), ("B", 1)], &at(11))]));
    let out = responses(&stdout);
    assert_eq!(out[0]["changes"], json!([]));
    assert_eq!(out[0]["badges"], json!({ "B": "new" }));

    let (_, stdout, _) = run_in(dir.path(), &stream(&[refresh(&[("A", 1), ("B", 1)], &at(25))]));
    assert_eq!(responses(&stdout)[0]["badges"], json!({}));
}

#[test]
fn expiry_follows_preferences() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("pi-sessions.toml"), "badge_expiry_hours = 1\n").unwrap();
    let input = stream(&[
        refresh(&[], "2025-04-01T09:00:00Z"),
        refresh(&[("A", 1)], "2025-04-01T09:00:00Z"),
        refresh(&[("A", 1)], "2025-04-01T10:30:00Z"),
    ]);
    let (_, stdout, _) = run_in(dir.path(), &input);
    let out = responses(&stdout);
    assert_eq!(out[1]["badges"], json!({ "A": "new" }));
    assert_eq!(out[2]["badges"], json!({}));
}

#[test]
fn clear_commands() {
    let dir = tempfile::tempdir().unwrap();
    let input = stream(&[
        refresh(&[], "2025-04-01T09:00:00Z"),
        refresh(&[("A", 1), ("B", 1), ("C", 1)], "2025-04-01T09:00:00Z"),
        json!({ "command": "clear_badge", "session_id": "B" }),
        json!({ "command": "clear_all_badges" }),
    ]);
    let (code, stdout, _) = run_in(dir.path(), &input);
    assert_eq!(code, 0);
    let out = responses(&stdout);
    // Clear responses are evaluated against the wall clock, long after the
    // stamps above, so only the absence of B is checked before the wipe.
    assert!(out[2]["badges"].get("B").is_none());
    assert_eq!(out[3]["badges"], json!({}));
    assert!(!dir.path().join("badge-states.json").exists());
}
