//! The git post-commit hook: a shim in `.git/hooks` plus the handler
//! it executes.
//!
//! The handler must never slow down or break a commit. It resolves
//! HEAD, hands the hash to a detached `generate --background` child,
//! and returns. Every failure mode ends in a stderr warning and a
//! clean exit, panics included.

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Setting this to anything but "0" disables journaling for a commit.
pub const SKIP_ENV: &str = "DAYBOOK_SKIP";

pub const HOOK_NAME: &str = "post-commit";

/// A foreign hook found during install is preserved under this suffix.
const BACKUP_SUFFIX: &str = ".pre-daybook";

pub fn skip_requested() -> bool {
    match env::var(SKIP_ENV) {
        Ok(value) => is_skip_value(&value),
        Err(_) => false,
    }
}

fn is_skip_value(value: &str) -> bool {
    !value.is_empty() && value != "0"
}

// ============================================================================
// Hook handler
// ============================================================================

/// Entry point for `daybook hook post-commit`. Failures are reported
/// on stderr and swallowed; the caller always exits zero.
pub fn run_post_commit(cwd: &Path) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| post_commit_inner(cwd)));
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => eprintln!("daybook: warning: {err:#}"),
        Err(_) => eprintln!("daybook: warning: journaling hook panicked"),
    }
}

fn post_commit_inner(cwd: &Path) -> Result<()> {
    if skip_requested() {
        return Ok(());
    }
    let repo = git2::Repository::discover(cwd).context("not inside a git repository")?;
    let workdir = repo
        .workdir()
        .context("bare repositories are not journaled")?
        .to_path_buf();
    let head = repo
        .head()
        .context("resolving HEAD")?
        .peel_to_commit()
        .context("HEAD is not a commit")?;
    let hash = head.id().to_string();

    spawn_generate(&workdir, &hash)?;
    eprintln!("daybook: journaling commit {}", &hash[..8.min(hash.len())]);
    Ok(())
}

/// Detaches a `generate` child so the commit returns immediately.
/// Unit tests have no real binary to hand off to, so this is a no-op
/// under test.
fn spawn_generate(workdir: &Path, hash: &str) -> Result<()> {
    if cfg!(test) {
        return Ok(());
    }
    let exe = env::current_exe().context("resolving current executable")?;
    Command::new(exe)
        .args(["generate", "--commit", hash, "--background"])
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("spawning background generate")?;
    Ok(())
}

// ============================================================================
// Installation
// ============================================================================

/// Writes the post-commit shim into `.git/hooks`. An existing hook
/// that is not ours is copied aside first.
pub fn install(cwd: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(cwd)
        .with_context(|| format!("no git repository at or above {}", cwd.display()))?;
    let hooks_dir = repo.path().join("hooks");
    fs::create_dir_all(&hooks_dir)
        .with_context(|| format!("creating {}", hooks_dir.display()))?;
    let hook_path = hooks_dir.join(HOOK_NAME);

    match fs::read(&hook_path) {
        // Ours already; rewrite in place so a moved binary is picked up.
        Ok(existing) if String::from_utf8_lossy(&existing).contains("daybook") => {}
        Ok(_) => {
            let backup = hooks_dir.join(format!("{HOOK_NAME}{BACKUP_SUFFIX}"));
            fs::copy(&hook_path, &backup)
                .with_context(|| format!("backing up existing hook to {}", backup.display()))?;
            tracing::info!(backup = %backup.display(), "existing post-commit hook saved");
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", hook_path.display()));
        }
    }

    let exe = env::current_exe().context("resolving current executable")?;
    let script = format!("#!/bin/sh\nexec \"{}\" hook post-commit\n", exe.display());
    fs::write(&hook_path, script).with_context(|| format!("writing {}", hook_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&hook_path, fs::Permissions::from_mode(0o755))
            .with_context(|| format!("marking {} executable", hook_path.display()))?;
    }

    Ok(hook_path)
}

/// True when our shim is the active post-commit hook.
pub fn installed(repo: &git2::Repository) -> bool {
    match fs::read(repo.path().join("hooks").join(HOOK_NAME)) {
        Ok(contents) => String::from_utf8_lossy(&contents).contains("daybook"),
        Err(_) => false,
    }
}
