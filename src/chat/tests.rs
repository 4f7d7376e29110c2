use super::*;

use std::fs;
use std::path::{Path, PathBuf};

use crate::window::WindowStrategy;
use crate::workspace::MatchType;

const BUSY_MS: u64 = 100;

fn open_rw(path: &Path) -> rusqlite::Connection {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("db parent");
    }
    let conn = rusqlite::Connection::open(path).expect("open db");
    conn.execute_batch("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT)")
        .expect("create kv");
    conn
}

fn put(conn: &rusqlite::Connection, key: &str, value: &str) {
    conn.execute(
        "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
        [key, value],
    )
    .expect("put");
}

fn handle(root: &Path) -> WorkspaceHandle {
    let workspace_dir = root.join("workspaces").join("w");
    WorkspaceHandle {
        index_db: workspace_dir.join("state.db"),
        global_db: root.join("global").join("state.db"),
        workspace_dir,
        folder: PathBuf::from("/tmp/project"),
        confidence: 0.9,
        match_type: MatchType::FolderPath,
    }
}

fn window(start_ms: i64, end_ms: i64) -> TimeWindow {
    TimeWindow {
        start_ms,
        end_ms,
        strategy: WindowStrategy::CommitBased,
        duration_hours: 0.0,
    }
}

fn msg_json(role: &str, text: &str, ts: i64) -> String {
    serde_json::json!({"role": role, "text": text, "createdAt": ts}).to_string()
}

fn seed_session(
    index: &rusqlite::Connection,
    global: &rusqlite::Connection,
    session_id: &str,
    name: &str,
    messages: &[(&str, &str, i64)],
) {
    let existing: Option<String> = {
        use rusqlite::OptionalExtension;
        index
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                [SESSIONS_KEY],
                |row| row.get(0),
            )
            .optional()
            .expect("read sessions")
    };
    let mut sessions: Vec<serde_json::Value> = existing
        .map(|raw| serde_json::from_str(&raw).expect("sessions json"))
        .unwrap_or_default();
    sessions.push(serde_json::json!({"id": session_id, "name": name}));
    put(
        index,
        SESSIONS_KEY,
        &serde_json::to_string(&sessions).expect("encode sessions"),
    );

    let ids: Vec<String> = (0..messages.len()).map(|i| format!("m{i}")).collect();
    put(
        global,
        &format!("sessionMessages:{session_id}"),
        &serde_json::to_string(&ids).expect("encode ids"),
    );
    for (id, (role, text, ts)) in ids.iter().zip(messages) {
        put(
            global,
            &format!("message:{session_id}:{id}"),
            &msg_json(role, text, *ts),
        );
    }
}

#[test]
fn window_filtering_is_inclusive() {
    let tmp = tempfile::tempdir().unwrap();
    let h = handle(tmp.path());
    let index = open_rw(&h.index_db);
    let global = open_rw(&h.global_db);
    seed_session(
        &index,
        &global,
        "s1",
        "morning work",
        &[
            ("user", "too early", 999),
            ("user", "at start", 1_000),
            ("assistant", "in the middle", 1_500),
            ("user", "at end", 2_000),
            ("user", "too late", 2_001),
        ],
    );

    let messages = extract(&h, &window(1_000, 2_000), BUSY_MS);
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, ["at start", "in the middle", "at end"]);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[0].session, "morning work");
}

#[test]
fn sessions_merge_in_timestamp_order() {
    let tmp = tempfile::tempdir().unwrap();
    let h = handle(tmp.path());
    let index = open_rw(&h.index_db);
    let global = open_rw(&h.global_db);
    seed_session(
        &index,
        &global,
        "s1",
        "first",
        &[("user", "a", 100), ("user", "c", 300)],
    );
    seed_session(
        &index,
        &global,
        "s2",
        "second",
        &[("assistant", "b", 200), ("assistant", "d", 300)],
    );

    let messages = extract(&h, &window(0, 1_000), BUSY_MS);
    let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
    // "c" and "d" share a timestamp; the stable sort keeps session order.
    assert_eq!(texts, ["a", "b", "c", "d"]);
    assert_eq!(messages[1].session, "second");
}

#[test]
fn broken_records_are_dropped_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let h = handle(tmp.path());
    let index = open_rw(&h.index_db);
    let global = open_rw(&h.global_db);

    put(&index, SESSIONS_KEY, r#"[{"id": "s1", "name": "work"}]"#);
    put(
        &global,
        "sessionMessages:s1",
        r#"["gone", "junk", "sys", "no-ts", "ok"]"#,
    );
    // "gone" has no body at all.
    put(&global, "message:s1:junk", "{not json");
    put(
        &global,
        "message:s1:sys",
        &msg_json("system", "tool output", 500),
    );
    put(
        &global,
        "message:s1:no-ts",
        r#"{"role": "user", "text": "when?"}"#,
    );
    put(&global, "message:s1:ok", &msg_json("user", "kept", 500));

    let messages = extract(&h, &window(0, 1_000), BUSY_MS);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text, "kept");
}

#[test]
fn missing_databases_yield_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let h = handle(tmp.path());

    // Neither database exists.
    assert!(extract(&h, &window(0, 1_000), BUSY_MS).is_empty());

    // Index exists, global does not.
    let index = open_rw(&h.index_db);
    put(&index, SESSIONS_KEY, r#"[{"id": "s1", "name": "work"}]"#);
    assert!(extract(&h, &window(0, 1_000), BUSY_MS).is_empty());
}

#[test]
fn missing_or_malformed_registry_yields_empty() {
    let tmp = tempfile::tempdir().unwrap();
    let h = handle(tmp.path());
    let index = open_rw(&h.index_db);
    let _global = open_rw(&h.global_db);

    // No sessions key at all.
    assert!(extract(&h, &window(0, 1_000), BUSY_MS).is_empty());

    // Unparseable registry.
    put(&index, SESSIONS_KEY, "nope");
    assert!(extract(&h, &window(0, 1_000), BUSY_MS).is_empty());

    // Session listed but with no message list in the global store.
    put(&index, SESSIONS_KEY, r#"[{"id": "s1", "name": "work"}]"#);
    assert!(extract(&h, &window(0, 1_000), BUSY_MS).is_empty());
}
