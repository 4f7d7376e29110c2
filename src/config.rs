use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Per-repository data directory, resolved against the workdir root.
pub const DATA_DIR: &str = ".daybook";

pub const FILENAME: &str = "config.toml";

/// Paths whose diffs are noise: lockfiles, minified bundles, build output.
/// They still show up in the changed-file list, just without patch text.
const DEFAULT_DIFF_EXCLUDES: &[&str] = &[
    "Cargo.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "go.sum",
    "*.min.js",
    "*.min.css",
    "*.map",
    "node_modules/",
    "dist/",
    "build/",
    "target/",
    "vendor/",
];

/// User-facing configuration stored in `.daybook/config.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub journal: JournalConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub diff: DiffConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Journal root. Relative paths resolve against the repository root.
    #[serde(default = "default_journal_dir")]
    pub dir: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Root of the editor's workspace storage tree (the directory holding
    /// `workspaces/` and `global/`). When unset, entries are written from
    /// commit data alone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,

    /// How long SQLite reads wait on a busy chat store before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AiConfig {
    /// Master switch for the AI-backed sections. Pure sections are always
    /// generated regardless.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Hard cap on each completion request, connection included.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Overrides the ANTHROPIC_API_KEY environment variable when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Per-file cap on captured patch text, in bytes.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Cap on captured patch text across the whole commit, in bytes.
    #[serde(default = "default_max_total_bytes")]
    pub max_total_bytes: usize,

    /// Patterns excluded from diff capture: exact file names, `*.ext`
    /// suffixes, or `dir/` prefixes.
    #[serde(default = "default_excludes")]
    pub exclude: Vec<String>,
}

fn default_journal_dir() -> String {
    "journal".into()
}

fn default_busy_timeout_ms() -> u32 {
    2000
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.anthropic.com".into()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".into()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_file_bytes() -> usize {
    10 * 1024
}

fn default_max_total_bytes() -> usize {
    50 * 1024
}

fn default_excludes() -> Vec<String> {
    DEFAULT_DIFF_EXCLUDES.iter().map(|s| s.to_string()).collect()
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            dir: default_journal_dir(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            storage_root: None,
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            base_url: default_base_url(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            api_key: None,
        }
    }
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            max_total_bytes: default_max_total_bytes(),
            exclude: default_excludes(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            journal: JournalConfig::default(),
            chat: ChatConfig::default(),
            ai: AiConfig::default(),
            diff: DiffConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `.daybook/config.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let config: Config = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let config = Config::default();
                let toml_str = toml::to_string_pretty(&config)
                    .context("serializing default configuration")?;
                fs::write(&path, &toml_str)
                    .with_context(|| format!("writing default {}", path.display()))?;
                Ok(config)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// The journal root resolved against the repository working directory.
    pub fn journal_root(&self, workdir: &Path) -> PathBuf {
        let dir = Path::new(&self.journal.dir);
        if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            workdir.join(dir)
        }
    }
}

impl ChatConfig {
    /// Storage root with a leading `~` expanded to the home directory.
    pub fn storage_root_path(&self) -> Option<PathBuf> {
        self.storage_root.as_deref().map(expand_home)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
