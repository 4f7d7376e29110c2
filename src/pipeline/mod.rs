//! Orchestrates one journal run as an explicit phase sequence.
//!
//! Only two things abort a run: failing to resolve the commit and
//! failing to persist the finished entry. Every other trouble spot
//! (missing chat stores, unreadable notes, AI failures) degrades and
//! the entry is written from whatever survived.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use crate::ai::{CompletionClient, DisabledClient, HttpCompletionClient};
use crate::chat::{self, ChatMessage};
use crate::commit;
use crate::config::{self, Config};
use crate::context::{HookTrigger, JournalContext};
use crate::journal::{self, reader};
use crate::sections::{self, SectionOutcome, SectionResult, SectionStatus};
use crate::window::{self, TimeWindow, WindowOutcome};
use crate::workspace;


/// Pipeline phases in execution order. `Done` and `Failed` are
/// terminal; which non-terminal phase was live when an error surfaced
/// is what the failure log reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Collecting,
    ExtractingChat,
    BuildingContext,
    GeneratingSections,
    Assembling,
    Persisting,
    Done,
    Failed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Collecting => "collecting",
            Phase::ExtractingChat => "extracting-chat",
            Phase::BuildingContext => "building-context",
            Phase::GeneratingSections => "generating-sections",
            Phase::Assembling => "assembling",
            Phase::Persisting => "persisting",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Entry appended to the journal.
    Written {
        path: PathBuf,
        generated: usize,
        fallbacks: usize,
    },
    /// Merge commits get no entry.
    SkippedMerge,
}

/// One configured journal run bound to a repository.
pub struct Runner {
    repo: git2::Repository,
    workdir: PathBuf,
    data_dir: PathBuf,
    config: Config,
    ai: Box<dyn CompletionClient>,
    trigger: HookTrigger,
}

impl Runner {
    /// Opens the repository containing `cwd`, creates the data
    /// directory if needed, and loads (or seeds) its configuration.
    pub fn open(cwd: &Path, trigger: HookTrigger) -> Result<Self> {
        let repo = git2::Repository::discover(cwd)
            .with_context(|| format!("no git repository at or above {}", cwd.display()))?;
        let workdir = repo
            .workdir()
            .context("bare repositories have no working directory to journal")?
            .to_path_buf();
        let data_dir = workdir.join(config::DATA_DIR);
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating {}", data_dir.display()))?;
        let config = Config::load(&data_dir)?;

        let ai: Box<dyn CompletionClient> = match HttpCompletionClient::from_config(&config.ai) {
            Ok(client) => Box::new(client),
            Err(err) => {
                tracing::warn!(error = %err, "ai client unavailable, ai sections will fall back");
                Box::new(DisabledClient)
            }
        };

        Ok(Runner {
            repo,
            workdir,
            data_dir,
            config,
            ai,
            trigger,
        })
    }

    #[cfg(test)]
    pub fn with_client(mut self, ai: Box<dyn CompletionClient>) -> Self {
        self.ai = ai;
        self
    }

    pub fn repo(&self) -> &git2::Repository {
        &self.repo
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn journal_root(&self) -> PathBuf {
        self.config.journal_root(&self.workdir)
    }

    /// Runs the whole pipeline for `rev` (HEAD when `None`).
    pub fn run(&self, rev: Option<&str>) -> Result<RunOutcome> {
        let mut phase = Phase::Collecting;
        let result = self.run_phases(rev, &mut phase);
        let terminal = match &result {
            Ok(_) => Phase::Done,
            Err(_) => Phase::Failed,
        };
        match &result {
            Ok(RunOutcome::Written {
                path,
                generated,
                fallbacks,
            }) => {
                tracing::info!(
                    path = %path.display(),
                    generated = *generated,
                    fallbacks = *fallbacks,
                    "journal entry written"
                );
            }
            Ok(RunOutcome::SkippedMerge) => {
                tracing::info!("merge commit, no entry");
            }
            Err(err) => {
                tracing::error!(phase = phase.name(), error = %err, "journal run failed");
            }
        }
        tracing::debug!(terminal = terminal.name(), "run finished");
        result
    }

    fn run_phases(&self, rev: Option<&str>, phase: &mut Phase) -> Result<RunOutcome> {
        *phase = Phase::Collecting;
        let (info, time_window) = {
            let _span = tracing::info_span!("collect").entered();
            let commit = commit::resolve(&self.repo, rev)?;
            let time_window = match window::for_commit(&commit) {
                WindowOutcome::Window(w) => w,
                WindowOutcome::MergeCommit => return Ok(RunOutcome::SkippedMerge),
            };
            (
                commit::collect(&self.repo, &commit, &self.config.diff),
                time_window,
            )
        };

        *phase = Phase::ExtractingChat;
        let messages = {
            let _span = tracing::info_span!("extract_chat").entered();
            self.extract_chat(&time_window)
        };

        *phase = Phase::BuildingContext;
        let ctx = {
            let _span = tracing::info_span!("build_context").entered();
            let entry_date = journal::local_date(info.timestamp_ms);
            let recent = match reader::recent_notes(&self.journal_root(), entry_date) {
                Ok(notes) => notes,
                Err(err) => {
                    tracing::warn!(error = %err, "could not read recent notes");
                    reader::RecentNotes::default()
                }
            };
            JournalContext {
                commit: info,
                window: time_window,
                messages,
                recent,
                trigger: self.trigger,
            }
        };

        *phase = Phase::GeneratingSections;
        let outcomes = {
            let _span = tracing::info_span!("generate_sections").entered();
            sections::generate(&ctx, self.ai.as_ref())
        };

        *phase = Phase::Assembling;
        let entry = render_entry(&ctx, &outcomes);

        *phase = Phase::Persisting;
        let path = {
            let _span = tracing::info_span!("persist").entered();
            let entry_date = journal::local_date(ctx.commit.timestamp_ms);
            journal::append_entry(&self.journal_root(), entry_date, &entry)
                .context("appending journal entry")?
        };

        *phase = Phase::Done;
        let generated = outcomes
            .iter()
            .filter(|o| o.status == SectionStatus::Generated)
            .count();
        Ok(RunOutcome::Written {
            path,
            generated,
            fallbacks: outcomes.len() - generated,
        })
    }

    fn extract_chat(&self, time_window: &TimeWindow) -> Vec<ChatMessage> {
        let Some(storage_root) = self.config.chat.storage_root_path() else {
            tracing::debug!("no chat storage root configured");
            return Vec::new();
        };
        match workspace::locate(Some(&storage_root), &self.repo) {
            Ok(handle) => chat::extract(
                &handle,
                time_window,
                u64::from(self.config.chat.busy_timeout_ms),
            ),
            Err(err) => {
                tracing::warn!(error = %err, "chat stores unavailable, journaling commit data only");
                Vec::new()
            }
        }
    }
}

// ============================================================================
// Entry rendering
// ============================================================================

fn render_entry(ctx: &JournalContext, outcomes: &[SectionOutcome]) -> String {
    let commit = &ctx.commit;
    let mut out = format!(
        "## Commit {} ({})\n\n",
        commit.short_hash,
        journal::format_local_ms(commit.timestamp_ms)
    );
    let subject = commit.message.lines().next().unwrap_or("").trim();
    if !subject.is_empty() {
        out.push_str(&format!("> {subject}\n\n"));
    }
    out.push_str(&status_line(ctx, outcomes));
    out.push_str("\n\n");
    for outcome in outcomes {
        render_section(&mut out, outcome);
    }
    out.trim_end().to_owned()
}

fn status_line(ctx: &JournalContext, outcomes: &[SectionOutcome]) -> String {
    let fallbacks: Vec<&str> = outcomes
        .iter()
        .filter(|o| o.status == SectionStatus::Fallback)
        .map(|o| o.kind.title())
        .collect();
    let mut parts = vec![
        ctx.trigger.label().to_owned(),
        format!(
            "window {:.1}h ({})",
            ctx.window.duration_hours,
            ctx.window.strategy.label()
        ),
        format!("chat: {} messages", ctx.messages.len()),
    ];
    if !fallbacks.is_empty() {
        parts.push(format!("not generated: {}", fallbacks.join(", ")));
    }
    format!("_{}_", parts.join(" | "))
}

fn render_section(out: &mut String, outcome: &SectionOutcome) {
    out.push_str("### ");
    out.push_str(outcome.kind.title());
    out.push_str("\n\n");
    if outcome.status == SectionStatus::Fallback {
        out.push_str("*(not generated)*\n\n");
        return;
    }
    match &outcome.result {
        SectionResult::Content { text } => {
            if text.trim().is_empty() {
                out.push_str("*(none)*\n\n");
            } else {
                out.push_str(text.trim());
                out.push_str("\n\n");
            }
        }
        SectionResult::Items { items } => {
            if items.is_empty() {
                out.push_str("*(none)*\n\n");
            } else {
                for item in items {
                    out.push_str("- ");
                    out.push_str(item);
                    out.push('\n');
                }
                out.push('\n');
            }
        }
        SectionResult::Fields { fields } => {
            if fields.is_empty() {
                out.push_str("*(none)*\n\n");
            } else {
                for (key, value) in fields {
                    out.push_str(&format!("- **{key}**: {value}\n"));
                }
                out.push('\n');
            }
        }
    }
}
