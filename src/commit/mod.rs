use anyhow::{Context, Result};
use serde::Serialize;

use crate::config::DiffConfig;

const FILE_TRUNCATION_MARK: &str = "\n[... diff truncated: per-file cap reached ...]\n";

// ===================================================================
// Commit snapshot: metadata plus capped diff capture
// ===================================================================

/// What happened to a file in the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl ChangeKind {
    pub fn symbol(self) -> char {
        match self {
            ChangeKind::Added => 'A',
            ChangeKind::Modified => 'M',
            ChangeKind::Deleted => 'D',
            ChangeKind::Renamed => 'R',
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
    pub insertions: usize,
    pub deletions: usize,
    /// True when no patch text was captured for this file (binary,
    /// excluded as generated, or the capture budget ran out).
    pub diff_omitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub patch: String,
    pub truncated: bool,
}

/// Everything the pipeline reads from a commit. Collected once, immutable
/// afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp_ms: i64,
    pub parent_count: usize,
    pub files: Vec<FileChange>,
    pub diffs: Vec<FileDiff>,
    pub insertions: usize,
    pub deletions: usize,
    /// Set when the commit-wide capture budget cut one or more files short.
    pub diffs_truncated: bool,
}

// ===================================================================
// Commit resolution
// ===================================================================

/// Resolve `rev` (HEAD when `None`) to a commit. This is the one lookup
/// the pipeline treats as fatal.
pub fn resolve<'r>(repo: &'r git2::Repository, rev: Option<&str>) -> Result<git2::Commit<'r>> {
    match rev {
        Some(rev) => {
            let object = repo
                .revparse_single(rev)
                .with_context(|| format!("resolving revision {rev}"))?;
            let object = object
                .peel(git2::ObjectType::Commit)
                .with_context(|| format!("peeling {rev} to a commit"))?;
            object
                .into_commit()
                .map_err(|_| anyhow::anyhow!("revision {rev} is not a commit"))
        }
        None => repo
            .head()
            .context("reading HEAD")?
            .peel_to_commit()
            .context("resolving HEAD commit"),
    }
}

// ===================================================================
// Collection
// ===================================================================

/// Read commit metadata and capture its first-parent diff under the
/// configured caps. Diff failures degrade to a metadata-only snapshot;
/// collection itself never fails once the commit is resolved.
pub fn collect(repo: &git2::Repository, commit: &git2::Commit, diff_cfg: &DiffConfig) -> CommitInfo {
    let hash = commit.id().to_string();
    let author = commit.author();
    let mut info = CommitInfo {
        short_hash: hash[..8.min(hash.len())].to_string(),
        hash,
        message: commit.message().unwrap_or("").to_string(),
        author_name: author.name().unwrap_or("").to_string(),
        author_email: author.email().unwrap_or("").to_string(),
        timestamp_ms: commit.time().seconds() * 1000,
        parent_count: commit.parent_count(),
        files: Vec::new(),
        diffs: Vec::new(),
        insertions: 0,
        deletions: 0,
        diffs_truncated: false,
    };
    if let Err(e) = capture_diff(repo, commit, diff_cfg, &mut info) {
        tracing::warn!(error = %e, "diff unavailable, entry will carry commit metadata only");
        info.files.clear();
        info.diffs.clear();
    }
    info
}

fn capture_diff(
    repo: &git2::Repository,
    commit: &git2::Commit,
    cfg: &DiffConfig,
    info: &mut CommitInfo,
) -> Result<()> {
    let tree = commit.tree().context("reading commit tree")?;
    // A root commit diffs against the empty tree.
    let parent_tree = match commit.parent(0) {
        Ok(parent) => Some(parent.tree().context("reading parent tree")?),
        Err(_) => None,
    };
    let mut opts = git2::DiffOptions::new();
    opts.context_lines(3);
    let mut diff = repo
        .diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut opts))
        .context("computing commit diff")?;
    if let Err(e) = diff.find_similar(None) {
        tracing::debug!(error = %e, "rename detection unavailable");
    }

    let mut total = 0usize;
    let delta_count = diff.deltas().count();
    for idx in 0..delta_count {
        let delta = match diff.get_delta(idx) {
            Some(d) => d,
            None => continue,
        };
        let path = delta
            .new_file()
            .path()
            .or_else(|| delta.old_file().path())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        if path.is_empty() {
            continue;
        }
        let kind = change_kind(delta.status());
        let binary = delta.new_file().is_binary() || delta.old_file().is_binary();

        let mut patch = match git2::Patch::from_diff(&diff, idx).context("reading patch")? {
            Some(p) => p,
            None => {
                info.files.push(FileChange {
                    path,
                    kind,
                    insertions: 0,
                    deletions: 0,
                    diff_omitted: true,
                });
                continue;
            }
        };
        let (insertions, deletions) = match patch.line_stats() {
            Ok((_, adds, dels)) => (adds, dels),
            Err(_) => (0, 0),
        };
        info.insertions += insertions;
        info.deletions += deletions;

        if binary || is_excluded(&path, &cfg.exclude) {
            info.files.push(FileChange {
                path,
                kind,
                insertions,
                deletions,
                diff_omitted: true,
            });
            continue;
        }
        if total >= cfg.max_total_bytes {
            info.diffs_truncated = true;
            info.files.push(FileChange {
                path,
                kind,
                insertions,
                deletions,
                diff_omitted: true,
            });
            continue;
        }

        let text = match patch.to_buf() {
            Ok(buf) => buf.as_str().unwrap_or("").to_string(),
            Err(e) => {
                tracing::debug!(path = %path, error = %e, "patch text unavailable");
                info.files.push(FileChange {
                    path,
                    kind,
                    insertions,
                    deletions,
                    diff_omitted: true,
                });
                continue;
            }
        };
        let cap = cfg.max_file_bytes.min(cfg.max_total_bytes - total);
        let (mut captured, truncated) = clip_at_boundary(&text, cap);
        total += captured.len();
        if truncated && cap < cfg.max_file_bytes {
            info.diffs_truncated = true;
        }
        if truncated {
            captured.push_str(FILE_TRUNCATION_MARK);
        }
        info.files.push(FileChange {
            path: path.clone(),
            kind,
            insertions,
            deletions,
            diff_omitted: false,
        });
        info.diffs.push(FileDiff {
            path,
            patch: captured,
            truncated,
        });
    }
    Ok(())
}

fn change_kind(status: git2::Delta) -> ChangeKind {
    match status {
        git2::Delta::Added | git2::Delta::Copied => ChangeKind::Added,
        git2::Delta::Deleted => ChangeKind::Deleted,
        git2::Delta::Renamed => ChangeKind::Renamed,
        _ => ChangeKind::Modified,
    }
}

/// Match a repo-relative path against the exclusion patterns: `dir/`
/// matches a path segment, `*.ext` matches a file name suffix, anything
/// else matches the file name exactly.
fn is_excluded(path: &str, patterns: &[String]) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    for pattern in patterns {
        if let Some(dir) = pattern.strip_suffix('/') {
            if path.split('/').any(|segment| segment == dir) {
                return true;
            }
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            if file_name.ends_with(suffix) {
                return true;
            }
        } else if file_name == pattern {
            return true;
        }
    }
    false
}

/// Cut `text` to at most `cap` bytes on a char boundary.
fn clip_at_boundary(text: &str, cap: usize) -> (String, bool) {
    if text.len() <= cap {
        return (text.to_string(), false);
    }
    let mut end = cap;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    (text[..end].to_string(), true)
}
