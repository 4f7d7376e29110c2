//! Locates the assistant chat workspace that corresponds to a git
//! repository.
//!
//! Chat history lives outside the repo under a storage root, one
//! directory per workspace, each described by a `workspace.json`
//! manifest pointing at the workspace folder as a `file://` URI.
//! Matching a repo to a workspace is heuristic: remote-URL agreement
//! is strongest, then folder identity, then folder names.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Deserialize;

#[cfg(test)]
mod tests;

/// Minimum confidence required to trust a scored match outright.
/// Anything below this falls back to the most recently used workspace.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

// ============================================================================
// Types
// ============================================================================

/// How a workspace was matched to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Both sides name the same `origin` remote.
    RemoteUrl,
    /// Workspace folder and repo workdir are the same path.
    FolderPath,
    /// Final path components match exactly.
    FolderNameExact,
    /// Final path components match after case and separator folding.
    FolderNameNormalized,
    /// No candidate scored above the threshold; picked by recency.
    MostRecentFallback,
}

impl MatchType {
    pub fn label(&self) -> &'static str {
        match self {
            MatchType::RemoteUrl => "remote-url",
            MatchType::FolderPath => "folder-path",
            MatchType::FolderNameExact => "folder-name",
            MatchType::FolderNameNormalized => "folder-name-normalized",
            MatchType::MostRecentFallback => "most-recent",
        }
    }
}

/// A matched workspace plus the store paths the chat reader needs.
/// The databases are not guaranteed to exist; readers degrade to an
/// empty transcript when they are missing.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    pub workspace_dir: PathBuf,
    /// The project folder the workspace tracks.
    pub folder: PathBuf,
    /// Per-workspace index database (session registry).
    pub index_db: PathBuf,
    /// Shared database holding message bodies for every workspace.
    pub global_db: PathBuf,
    pub confidence: f64,
    pub match_type: MatchType,
}

#[derive(Debug, PartialEq, Eq)]
pub enum WorkspaceError {
    /// No storage root configured, or no readable workspace manifests
    /// under it.
    NoStores,
}

impl fmt::Display for WorkspaceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkspaceError::NoStores => write!(f, "no chat stores found"),
        }
    }
}

impl std::error::Error for WorkspaceError {}

/// One workspace directory with a readable manifest.
struct Candidate {
    dir: PathBuf,
    folder: PathBuf,
    modified: SystemTime,
}

#[derive(Deserialize)]
struct WorkspaceManifest {
    folder: Option<String>,
}

// ============================================================================
// Matching
// ============================================================================

/// Finds the workspace most likely to hold chat history for `repo`.
pub fn locate(
    storage_root: Option<&Path>,
    repo: &git2::Repository,
) -> Result<WorkspaceHandle, WorkspaceError> {
    let root = storage_root.ok_or(WorkspaceError::NoStores)?;
    let candidates = scan(root);
    if candidates.is_empty() {
        return Err(WorkspaceError::NoStores);
    }

    let repo_dir = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
    let repo_remote = origin_url(repo).map(|url| normalize_remote(&url));

    let mut best: Option<(f64, MatchType, &Candidate)> = None;
    for candidate in &candidates {
        let (confidence, match_type) = score(candidate, &repo_dir, repo_remote.as_deref());
        let better = match best {
            None => true,
            Some((top, _, prev)) => {
                confidence > top || (confidence == top && candidate.modified > prev.modified)
            }
        };
        if better {
            best = Some((confidence, match_type, candidate));
        }
    }
    let Some((confidence, match_type, chosen)) = best else {
        return Err(WorkspaceError::NoStores);
    };

    let (confidence, match_type, chosen) = if confidence >= CONFIDENCE_THRESHOLD {
        (confidence, match_type, chosen)
    } else {
        // Nothing trustworthy; take whichever workspace saw activity last.
        let Some(recent) = candidates.iter().max_by_key(|c| c.modified) else {
            return Err(WorkspaceError::NoStores);
        };
        let (raw, _) = score(recent, &repo_dir, repo_remote.as_deref());
        (raw, MatchType::MostRecentFallback, recent)
    };

    tracing::debug!(
        workspace = %chosen.dir.display(),
        folder = %chosen.folder.display(),
        confidence,
        match_type = match_type.label(),
        "matched chat workspace"
    );

    Ok(WorkspaceHandle {
        index_db: chosen.dir.join("state.db"),
        global_db: root.join("global").join("state.db"),
        workspace_dir: chosen.dir.clone(),
        folder: chosen.folder.clone(),
        confidence,
        match_type,
    })
}

fn scan(root: &Path) -> Vec<Candidate> {
    let workspaces = root.join("workspaces");
    let entries = match fs::read_dir(&workspaces) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let raw = match fs::read_to_string(dir.join("workspace.json")) {
            Ok(raw) => raw,
            Err(_) => continue,
        };
        let manifest: WorkspaceManifest = match serde_json::from_str(&raw) {
            Ok(manifest) => manifest,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "unreadable workspace manifest");
                continue;
            }
        };
        let Some(folder) = manifest.folder.as_deref().and_then(decode_file_uri) else {
            continue;
        };
        let modified = modified_at(&dir);
        out.push(Candidate { dir, folder, modified });
    }
    out
}

fn score(candidate: &Candidate, repo_dir: &Path, repo_remote: Option<&str>) -> (f64, MatchType) {
    if let Some(ours) = repo_remote {
        if let Some(theirs) = folder_origin_url(&candidate.folder) {
            if normalize_remote(&theirs) == ours {
                return (1.0, MatchType::RemoteUrl);
            }
        }
    }
    if paths_equal(&candidate.folder, repo_dir) {
        return (0.9, MatchType::FolderPath);
    }
    if let (Some(theirs), Some(ours)) = (leaf_name(&candidate.folder), leaf_name(repo_dir)) {
        if theirs == ours {
            return (0.8, MatchType::FolderNameExact);
        }
        if normalize_name(theirs) == normalize_name(ours) {
            return (0.6, MatchType::FolderNameNormalized);
        }
    }
    (0.0, MatchType::MostRecentFallback)
}

/// Recency proxy for a workspace: its index database if present,
/// otherwise the manifest.
fn modified_at(dir: &Path) -> SystemTime {
    fs::metadata(dir.join("state.db"))
        .or_else(|_| fs::metadata(dir.join("workspace.json")))
        .and_then(|meta| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn origin_url(repo: &git2::Repository) -> Option<String> {
    let remote = repo.find_remote("origin").ok()?;
    remote.url().map(str::to_owned)
}

fn folder_origin_url(folder: &Path) -> Option<String> {
    let repo = git2::Repository::open(folder).ok()?;
    origin_url(&repo)
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn leaf_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace(['-', '_'], "")
}

// ============================================================================
// URL and URI handling
// ============================================================================

/// Reduces a git remote URL to `host/path` so that https, ssh, and
/// scp-style spellings of the same remote compare equal. Credentials
/// and a trailing `.git` are dropped; the host is lowercased.
pub fn normalize_remote(url: &str) -> String {
    let mut rest = url.trim();
    if let Some(idx) = rest.find("://") {
        rest = &rest[idx + 3..];
    } else if let Some(colon) = rest.find(':') {
        // scp syntax: user@host:path, no slash before the colon
        if !rest[..colon].contains('/') {
            let host = strip_credentials(&rest[..colon]);
            let path = rest[colon + 1..].trim_start_matches('/');
            return joined(host, path);
        }
    }
    let (host, path) = match rest.find('/') {
        Some(slash) => (&rest[..slash], rest[slash + 1..].trim_start_matches('/')),
        None => (rest, ""),
    };
    joined(strip_credentials(host), path)
}

fn strip_credentials(host: &str) -> &str {
    match host.rsplit('@').next() {
        Some(bare) => bare,
        None => host,
    }
}

fn joined(host: &str, path: &str) -> String {
    let path = path.trim_end_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);
    let host = host.to_ascii_lowercase();
    if path.is_empty() {
        host
    } else {
        format!("{host}/{path}")
    }
}

/// Decodes a `file://` URI into a filesystem path, reversing percent
/// escapes. Other schemes yield `None`.
fn decode_file_uri(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    Some(PathBuf::from(percent_decode(rest)))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Some(byte) = hex_pair(bytes[i + 1], bytes[i + 2]) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_pair(hi: u8, lo: u8) -> Option<u8> {
    let hi = (hi as char).to_digit(16)?;
    let lo = (lo as char).to_digit(16)?;
    Some((hi * 16 + lo) as u8)
}
