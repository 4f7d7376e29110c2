#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

/// Run the daybook binary with `args` from `dir`. Environment knobs
/// that would change behavior (API key, skip switch) are cleared so
/// tests behave the same on every machine.
pub fn run_daybook(dir: &Path, args: &[&str]) -> (i32, String, String) {
    run_daybook_env(dir, args, &[])
}

pub fn run_daybook_env(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> (i32, String, String) {
    let mut command = Command::new(env!("CARGO_BIN_EXE_daybook"));
    command
        .args(args)
        .current_dir(dir)
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("DAYBOOK_SKIP")
        .env("RUST_LOG", "info")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command.output().expect("failed to run binary");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Temp dir containing an initialized git repo with a test identity.
/// The `TempDir` must be kept alive for the duration of the test.
pub fn temp_git_repo() -> (tempfile::TempDir, git2::Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();
    (dir, repo)
}

/// Stage `name` with `content` and commit it at `secs` (unix time).
pub fn commit_file_at(
    repo: &git2::Repository,
    name: &str,
    content: &str,
    secs: i64,
    msg: &str,
) -> git2::Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    fs::write(workdir.join(name), content).unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let sig = git2::Signature::new("Test", "test@test.com", &git2::Time::new(secs, 0)).unwrap();
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, msg, &tree, &parents)
        .unwrap()
}

/// Seed `.daybook/config.toml` before the first run. AI stays off so
/// tests never touch the network.
pub fn write_test_config(workdir: &Path, storage_root: Option<&Path>) {
    let data_dir = workdir.join(".daybook");
    fs::create_dir_all(&data_dir).unwrap();
    let mut config = String::from("[ai]\nenabled = false\n");
    if let Some(root) = storage_root {
        config.push_str(&format!(
            "\n[chat]\nstorage_root = \"{}\"\n",
            root.display()
        ));
    }
    fs::write(data_dir.join("config.toml"), config).unwrap();
}

/// Build a two-tier chat store under `root` for one workspace folder:
/// a manifest plus index database naming the session, and the global
/// database holding the session's message ids and bodies.
pub fn seed_chat_store(root: &Path, folder: &Path, session_id: &str, messages: &[(&str, &str, i64)]) {
    let workspace_dir = root.join("workspaces").join("ws1");
    fs::create_dir_all(&workspace_dir).unwrap();
    fs::write(
        workspace_dir.join("workspace.json"),
        format!(r#"{{"folder": "file://{}"}}"#, folder.display()),
    )
    .unwrap();

    let index = rusqlite::Connection::open(workspace_dir.join("state.db")).unwrap();
    index
        .execute_batch("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT)")
        .unwrap();
    index
        .execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES ('chat.sessions', ?1)",
            [format!(
                r#"[{{"id": "{session_id}", "name": "test session"}}]"#
            )],
        )
        .unwrap();

    let global_dir = root.join("global");
    fs::create_dir_all(&global_dir).unwrap();
    let global = rusqlite::Connection::open(global_dir.join("state.db")).unwrap();
    global
        .execute_batch("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT)")
        .unwrap();

    let ids: Vec<String> = (0..messages.len()).map(|i| format!("m{i}")).collect();
    global
        .execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            [
                format!("sessionMessages:{session_id}"),
                serde_json::to_string(&ids).unwrap(),
            ],
        )
        .unwrap();
    for (id, (role, text, ts)) in ids.iter().zip(messages) {
        let body = serde_json::json!({"role": role, "text": text, "createdAt": ts}).to_string();
        global
            .execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                [format!("message:{session_id}:{id}"), body],
            )
            .unwrap();
    }
}
