mod common;

use common::{jsonl, responses, run_cli, stream};
use serde_json::{json, Value};

fn branching_transcript() -> String {
    jsonl(&[
        json!({ "type": "session", "id": "hdr", "timestamp": "2025-02-01T09:00:00Z", "cwd": "/repo", "version": 3 }),
        json!({ "type": "message", "id": "u1", "parentId": "hdr", "timestamp": "2025-02-01T09:00:01Z",
                "message": { "role": "user", "content": "Refactor the Loader" } }),
        json!({ "type": "message", "id": "a1", "parentId": "u1", "timestamp": "2025-02-01T09:00:02Z",
                "message": { "role": "assistant", "content": [
                    { "type": "text", "text": "Reading the loader." },
                    { "type": "toolCall", "id": "c1", "name": "read", "arguments": { "path": "loader.rs" } }
                ] } }),
        json!({ "type": "message", "id": "t1", "parentId": "a1", "timestamp": "2025-02-01T09:00:03Z",
                "message": { "role": "toolResult", "toolCallId": "c1", "toolName": "read",
                             "content": [{ "type": "text", "text": "fn load() {}" }] } }),
        json!({ "type": "message", "id": "s1", "parentId": "t1", "timestamp": "2025-02-01T09:00:04Z",
                "message": { "role": "assistant", "content": [{ "type": "text", "text": "" }] } }),
        json!({ "type": "message", "id": "u2", "parentId": "u1", "timestamp": "2025-02-01T09:05:00Z",
                "message": { "role": "user", "content": [{ "type": "text", "text": "Actually, rename it" }] } }),
        json!({ "type": "bookmark", "id": "bm", "parentId": "u2", "note": "from a newer producer" }),
    ])
}

fn load(extra: Value) -> Value {
    let mut request = json!({ "command": "load_transcript", "content": branching_transcript() });
    if let (Some(req), Some(extra)) = (request.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            req.insert(k.clone(), v.clone());
        }
    }
    let (code, stdout, stderr) = run_cli(&stream(&[request]));
    assert_eq!(code, 0, "stderr: {stderr}");
    responses(&stdout).remove(0)
}

fn node_ids(view: &Value) -> Vec<&str> {
    view["nodes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["id"].as_str().unwrap())
        .collect()
}

#[test]
fn default_view_hides_settings_and_follows_last_message() {
    let view = load(json!({}));
    assert_eq!(view["filter"], "default");
    assert_eq!(view["total"], 7);
    assert_eq!(view["roots"], 1);
    assert_eq!(view["skipped_lines"], 0);
    assert_eq!(view["session"]["cwd"], "/repo");
    assert_eq!(node_ids(&view), vec!["hdr", "u1", "a1", "t1", "u2"]);
    assert_eq!(view["active_leaf"], "u2");
    assert_eq!(view["active_path"], json!(["u2", "u1", "hdr"]));

    let nodes = view["nodes"].as_array().unwrap();
    let u1 = &nodes[1];
    assert_eq!(u1["depth"], 1);
    assert_eq!(u1["branch"], true);
    assert_eq!(u1["active"], true);
    assert_eq!(u1["text"], "Refactor the Loader");
}

#[test]
fn unrecognized_entries_render_only_in_all_mode() {
    let view = load(json!({ "filter": "all" }));
    assert_eq!(view["shown"], 7);
    let nodes = view["nodes"].as_array().unwrap();
    let bm = nodes.iter().find(|n| n["id"] == "bm").unwrap();
    assert_eq!(bm["kind"], "bookmark");
    assert_eq!(bm["text"], "");
    assert!(bm.get("role").is_none());
}

#[test]
fn no_tools_and_user_only_modes() {
    let view = load(json!({ "filter": "no-tools" }));
    assert_eq!(node_ids(&view), vec!["hdr", "u1", "a1", "u2"]);

    let view = load(json!({ "filter": "user-only" }));
    assert_eq!(node_ids(&view), vec!["u1", "u2"]);
    assert_eq!(view["shown"], 2);
}

#[test]
fn unknown_mode_shows_everything() {
    let view = load(json!({ "filter": "whatever" }));
    assert_eq!(view["filter"], "all");
    assert_eq!(view["shown"], view["total"]);
}

#[test]
fn search_matches_display_text_only() {
    let view = load(json!({ "filter": "all", "search": "LOADER" }));
    // The tool result mentions load() but tool output is not display text.
    assert_eq!(node_ids(&view), vec!["u1", "a1"]);
}

#[test]
fn explicit_active_leaf_and_labels() {
    let view = load(json!({
        "active_leaf": "t1",
        "filter": "labeled-only",
        "labels": { "a1": "reading", "t1": "" }
    }));
    assert_eq!(view["active_path"], json!(["t1", "a1", "u1", "hdr"]));
    assert_eq!(node_ids(&view), vec!["a1"]);
    assert_eq!(view["nodes"][0]["label"], "reading");
    assert_eq!(view["nodes"][0]["active"], true);
}

#[test]
fn malformed_lines_are_counted_not_fatal() {
    let content = format!(
        "{}\nnot json at all\n{}\n",
        json!({ "type": "message", "id": "u1", "message": { "role": "user", "content": "hi" } }),
        json!({ "type": "compaction", "id": 42 })
    );
    let (code, stdout, stderr) =
        run_cli(&stream(&[json!({ "command": "load_transcript", "content": content })]));
    assert_eq!(code, 0);
    let view = &responses(&stdout)[0];
    assert_eq!(view["total"], 1);
    assert_eq!(view["skipped_lines"], 2);
    assert!(stderr.contains("line 2"), "parse errors are logged: {stderr}");
}

#[test]
fn empty_transcript_is_an_empty_view() {
    let (code, stdout, _) = run_cli(&stream(&[json!({ "command": "load_transcript", "content": "" })]));
    assert_eq!(code, 0);
    let view = &responses(&stdout)[0];
    assert_eq!(view["total"], 0);
    assert_eq!(view["nodes"], json!([]));
    assert_eq!(view["active_leaf"], Value::Null);
    assert_eq!(view["session"], Value::Null);
}
