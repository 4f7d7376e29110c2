mod common;

use common::*;

use std::fs;

#[test]
fn install_writes_shim_and_reports_config() {
    let (tmp, repo) = temp_git_repo();
    commit_file_at(&repo, "a.txt", "one\n", 1_700_000_000, "initial");

    let (code, stdout, stderr) = run_daybook(tmp.path(), &["install"]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("post-commit hook installed"));
    assert!(stdout.contains("configuration at"));

    let hook = tmp.path().join(".git").join("hooks").join("post-commit");
    let script = fs::read_to_string(&hook).unwrap();
    assert!(script.starts_with("#!/bin/sh"));
    assert!(script.contains("hook post-commit"));
    assert!(tmp.path().join(".daybook").join("config.toml").exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&hook).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "hook is not executable");
    }
}

#[test]
fn install_backs_up_foreign_hooks() {
    let (tmp, _repo) = temp_git_repo();
    let hooks = tmp.path().join(".git").join("hooks");
    fs::create_dir_all(&hooks).unwrap();
    fs::write(hooks.join("post-commit"), "#!/bin/sh\necho mine\n").unwrap();

    let (code, _stdout, stderr) = run_daybook(tmp.path(), &["install"]);
    assert_eq!(code, 0, "stderr: {stderr}");
    let backup = fs::read_to_string(hooks.join("post-commit.pre-daybook")).unwrap();
    assert!(backup.contains("echo mine"));
    let script = fs::read_to_string(hooks.join("post-commit")).unwrap();
    assert!(script.contains("hook post-commit"));
}

#[test]
fn install_is_idempotent() {
    let (tmp, _repo) = temp_git_repo();
    run_daybook(tmp.path(), &["install"]);
    let (code, _stdout, _stderr) = run_daybook(tmp.path(), &["install"]);
    assert_eq!(code, 0);
    // Reinstalling over our own shim must not produce a backup of it.
    let hooks = tmp.path().join(".git").join("hooks");
    assert!(!hooks.join("post-commit.pre-daybook").exists());
}

#[test]
fn status_reports_outside_a_repository() {
    let tmp = tempfile::tempdir().unwrap();
    let (code, stdout, _stderr) = run_daybook(tmp.path(), &["status"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("not inside a git repository"));
}

#[test]
fn status_summarizes_repository_health() {
    let (tmp, repo) = temp_git_repo();
    commit_file_at(&repo, "a.txt", "one\n", 1_700_000_000, "initial");
    let missing_store = tmp.path().join("no-such-store");
    write_test_config(tmp.path(), Some(&missing_store));

    let (code, stdout, stderr) = run_daybook(tmp.path(), &["status"]);
    assert_eq!(code, 0, "stderr: {stderr}");
    assert!(stdout.contains("repository: "));
    assert!(stdout.contains("not installed"));
    assert!(stdout.contains("journal: "));
    assert!(stdout.contains("ai: disabled"));
    assert!(stdout.contains("chat: no chat stores found"));

    run_daybook(tmp.path(), &["install"]);
    let (_code, stdout, _stderr) = run_daybook(tmp.path(), &["status"]);
    assert!(stdout.contains("hook: installed"));
}

#[test]
fn generate_rejects_unknown_revisions() {
    let (tmp, repo) = temp_git_repo();
    write_test_config(tmp.path(), None);
    commit_file_at(&repo, "a.txt", "one\n", 1_700_000_000, "initial");

    let (code, _stdout, stderr) = run_daybook(tmp.path(), &["generate", "--commit", "no-such-rev"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("daybook: error:"), "stderr: {stderr}");
}

#[test]
fn generate_outside_a_repository_fails_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let (code, _stdout, stderr) = run_daybook(tmp.path(), &["generate"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("daybook: error:"), "stderr: {stderr}");
}
