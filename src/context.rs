//! The assembled input for one journal entry.

use serde::Serialize;

use crate::chat::ChatMessage;
use crate::commit::CommitInfo;
use crate::journal::reader::RecentNotes;
use crate::window::TimeWindow;

/// What caused this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookTrigger {
    PostCommit,
    Manual,
}

impl HookTrigger {
    pub fn label(&self) -> &'static str {
        match self {
            HookTrigger::PostCommit => "post-commit",
            HookTrigger::Manual => "manual",
        }
    }
}

/// Everything the section generators may draw on, gathered once per
/// run. Sections only read from this; nothing mutates it after the
/// context-building phase.
#[derive(Debug, Clone, Serialize)]
pub struct JournalContext {
    pub commit: CommitInfo,
    pub window: TimeWindow,
    pub messages: Vec<ChatMessage>,
    pub recent: RecentNotes,
    pub trigger: HookTrigger,
}
