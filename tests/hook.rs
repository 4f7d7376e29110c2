mod common;

use common::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// First markdown entry under `<journal>/entries/<month>/`, if any.
fn find_entry(journal: &Path) -> Option<PathBuf> {
    for month in fs::read_dir(journal.join("entries")).ok()?.flatten() {
        for day in fs::read_dir(month.path()).ok()?.flatten() {
            if day.path().extension().is_some_and(|ext| ext == "md") {
                return Some(day.path());
            }
        }
    }
    None
}

#[test]
fn hook_exits_zero_outside_a_repository() {
    let tmp = tempfile::tempdir().unwrap();
    let (code, _stdout, _stderr) = run_daybook(tmp.path(), &["hook", "post-commit"]);
    assert_eq!(code, 0);
}

#[test]
fn hook_exits_zero_on_unborn_head() {
    let (tmp, _repo) = temp_git_repo();
    let (code, _stdout, stderr) = run_daybook(tmp.path(), &["hook", "post-commit"]);
    assert_eq!(code, 0);
    assert!(stderr.contains("daybook: warning:"), "stderr: {stderr}");
}

#[test]
fn skip_variable_suppresses_journaling() {
    let (tmp, repo) = temp_git_repo();
    write_test_config(tmp.path(), None);
    commit_file_at(&repo, "a.txt", "one\n", 1_700_000_000, "A change");

    let (code, _stdout, stderr) = run_daybook_env(
        tmp.path(),
        &["hook", "post-commit"],
        &[("DAYBOOK_SKIP", "1")],
    );
    assert_eq!(code, 0);
    assert!(!stderr.contains("journaling commit"), "stderr: {stderr}");
    // A suppressed hook spawns nothing, so no entry ever appears.
    std::thread::sleep(Duration::from_millis(300));
    assert!(!tmp.path().join("journal").exists());
}

#[test]
fn skip_set_to_zero_still_journals() {
    let (tmp, repo) = temp_git_repo();
    write_test_config(tmp.path(), None);
    commit_file_at(&repo, "a.txt", "one\n", 1_700_000_000, "A change");

    let (code, _stdout, stderr) = run_daybook_env(
        tmp.path(),
        &["hook", "post-commit"],
        &[("DAYBOOK_SKIP", "0")],
    );
    assert_eq!(code, 0);
    assert!(stderr.contains("journaling commit"), "stderr: {stderr}");
}

#[test]
fn hook_returns_quickly_and_journals_in_the_background() {
    let (tmp, repo) = temp_git_repo();
    write_test_config(tmp.path(), None);
    let oid = commit_file_at(&repo, "a.txt", "one\n", 1_700_000_000, "Background change");

    let started = Instant::now();
    let (code, _stdout, stderr) = run_daybook(tmp.path(), &["hook", "post-commit"]);
    let elapsed = started.elapsed();
    assert_eq!(code, 0);
    assert!(
        stderr.contains(&format!("journaling commit {}", &oid.to_string()[..8])),
        "stderr: {stderr}"
    );
    // The handler only spawns the worker; generation happens after it
    // has already returned.
    assert!(elapsed < Duration::from_secs(5), "hook took {elapsed:?}");

    let journal = tmp.path().join("journal");
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut entry = None;
    while Instant::now() < deadline {
        if let Some(path) = find_entry(&journal) {
            let contents = fs::read_to_string(&path).unwrap();
            if contents.contains("<!-- daybook:end -->") {
                entry = Some(contents);
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    let contents = entry.expect("background worker never wrote an entry");
    assert!(contents.contains(&format!("## Commit {}", &oid.to_string()[..8])));
    assert!(contents.contains("> Background change"));
    // Spawned via the hook, so the entry is tagged accordingly.
    assert!(contents.contains("post-commit"));
}
