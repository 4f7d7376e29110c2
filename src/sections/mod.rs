//! The seven journal sections and their generators.
//!
//! Three sections are computed directly from commit data and cannot
//! fail. Four are AI-backed; each of those folds any failure into a
//! typed empty fallback so one bad completion never blocks the entry.
//! Generators return structured results; rendering to Markdown happens
//! in the pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::json;

use crate::ai::{AiError, CompletionClient};
use crate::commit::FileChange;
use crate::context::JournalContext;
use crate::journal;


/// Render order within an entry.
pub const ALL_SECTIONS: [SectionKind; 7] = [
    SectionKind::CommitDetails,
    SectionKind::FilesChanged,
    SectionKind::TechnicalSynopsis,
    SectionKind::Summary,
    SectionKind::Accomplishments,
    SectionKind::Frustrations,
    SectionKind::DiscussionHighlights,
];

/// Most chat messages forwarded to a completion, counted from the end
/// of the window.
const CHAT_SLICE_MAX_MESSAGES: usize = 200;

/// Longest single chat message forwarded to a completion, in bytes.
const CHAT_MESSAGE_CLIP: usize = 2000;

/// Cap on patch text forwarded to a completion, in bytes.
const DIFF_SLICE_MAX: usize = 24 * 1024;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    CommitDetails,
    FilesChanged,
    TechnicalSynopsis,
    Summary,
    Accomplishments,
    Frustrations,
    DiscussionHighlights,
}

impl SectionKind {
    pub fn title(&self) -> &'static str {
        match self {
            SectionKind::CommitDetails => "Commit Details",
            SectionKind::FilesChanged => "Files Changed",
            SectionKind::TechnicalSynopsis => "Technical Synopsis",
            SectionKind::Summary => "Summary",
            SectionKind::Accomplishments => "Accomplishments",
            SectionKind::Frustrations => "Frustrations",
            SectionKind::DiscussionHighlights => "Discussion Highlights",
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            SectionKind::CommitDetails => Shape::Fields,
            SectionKind::FilesChanged => Shape::Items,
            SectionKind::TechnicalSynopsis => Shape::Content,
            SectionKind::Summary => Shape::Content,
            SectionKind::Accomplishments => Shape::Items,
            SectionKind::Frustrations => Shape::Items,
            SectionKind::DiscussionHighlights => Shape::Items,
        }
    }

    pub fn is_ai(&self) -> bool {
        matches!(
            self,
            SectionKind::Summary
                | SectionKind::Accomplishments
                | SectionKind::Frustrations
                | SectionKind::DiscussionHighlights
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Content,
    Items,
    Fields,
}

/// A generated section body. The variant must agree with the section
/// kind's declared shape; `validate` enforces that.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionResult {
    Content { text: String },
    Items { items: Vec<String> },
    Fields { fields: BTreeMap<String, String> },
}

impl SectionResult {
    pub fn shape(&self) -> Shape {
        match self {
            SectionResult::Content { .. } => Shape::Content,
            SectionResult::Items { .. } => Shape::Items,
            SectionResult::Fields { .. } => Shape::Fields,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SectionResult::Content { text } => text.trim().is_empty(),
            SectionResult::Items { items } => items.is_empty(),
            SectionResult::Fields { fields } => fields.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionStatus {
    Generated,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct SectionOutcome {
    pub kind: SectionKind,
    pub result: SectionResult,
    pub status: SectionStatus,
}

#[derive(Debug)]
pub enum SectionError {
    /// No chat messages in the window; not worth an API call.
    NoChat,
    Ai(AiError),
    Template(minijinja::Error),
    /// Result failed shape validation.
    Invalid(&'static str),
}

impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectionError::NoChat => write!(f, "no chat messages in the window"),
            SectionError::Ai(err) => write!(f, "{err}"),
            SectionError::Template(err) => write!(f, "template error: {err}"),
            SectionError::Invalid(what) => write!(f, "invalid section result: {what}"),
        }
    }
}

impl std::error::Error for SectionError {}

impl From<AiError> for SectionError {
    fn from(err: AiError) -> Self {
        SectionError::Ai(err)
    }
}

impl From<minijinja::Error> for SectionError {
    fn from(err: minijinja::Error) -> Self {
        SectionError::Template(err)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Generates every section in render order. Pure sections cannot fail;
/// AI failures downgrade the affected section to its fallback.
pub fn generate(ctx: &JournalContext, ai: &dyn CompletionClient) -> Vec<SectionOutcome> {
    ALL_SECTIONS
        .iter()
        .map(|kind| outcome_from(*kind, generate_one(*kind, ctx, ai)))
        .collect()
}

fn generate_one(
    kind: SectionKind,
    ctx: &JournalContext,
    ai: &dyn CompletionClient,
) -> Result<SectionResult, SectionError> {
    let result = match kind {
        SectionKind::CommitDetails => commit_details(ctx),
        SectionKind::FilesChanged => files_changed(ctx),
        SectionKind::TechnicalSynopsis => technical_synopsis(ctx),
        SectionKind::Summary => summary(ctx, ai)?,
        SectionKind::Accomplishments => accomplishments(ctx, ai)?,
        SectionKind::Frustrations => frustrations(ctx, ai)?,
        SectionKind::DiscussionHighlights => discussion_highlights(ctx, ai)?,
    };
    validate(kind, &result)?;
    Ok(result)
}

fn outcome_from(kind: SectionKind, attempt: Result<SectionResult, SectionError>) -> SectionOutcome {
    match attempt {
        Ok(result) => SectionOutcome {
            kind,
            result,
            status: SectionStatus::Generated,
        },
        Err(err) => {
            match &err {
                SectionError::NoChat | SectionError::Ai(AiError::Disabled) => {
                    tracing::debug!(section = kind.title(), reason = %err, "using fallback");
                }
                _ => {
                    tracing::warn!(section = kind.title(), error = %err, "section generation failed, using fallback");
                }
            }
            SectionOutcome {
                kind,
                result: fallback(kind),
                status: SectionStatus::Fallback,
            }
        }
    }
}

/// Shape check for a generated result against its section kind.
pub fn validate(kind: SectionKind, result: &SectionResult) -> Result<(), SectionError> {
    if result.shape() == kind.shape() {
        Ok(())
    } else {
        Err(SectionError::Invalid("shape does not match section kind"))
    }
}

/// The typed empty value a section renders as when generation fails.
pub fn fallback(kind: SectionKind) -> SectionResult {
    match kind.shape() {
        Shape::Content => SectionResult::Content {
            text: String::new(),
        },
        Shape::Items => SectionResult::Items { items: Vec::new() },
        Shape::Fields => SectionResult::Fields {
            fields: BTreeMap::new(),
        },
    }
}

// ============================================================================
// Pure sections
// ============================================================================

fn commit_details(ctx: &JournalContext) -> SectionResult {
    let commit = &ctx.commit;
    let mut fields = BTreeMap::new();
    fields.insert("Commit".to_owned(), commit.hash.clone());
    fields.insert(
        "Author".to_owned(),
        format!("{} <{}>", commit.author_name, commit.author_email),
    );
    fields.insert(
        "Time".to_owned(),
        journal::format_local_ms(commit.timestamp_ms),
    );
    fields.insert("Files".to_owned(), commit.files.len().to_string());
    fields.insert(
        "Lines".to_owned(),
        format!("+{} -{}", commit.insertions, commit.deletions),
    );
    fields.insert(
        "Window".to_owned(),
        format!(
            "{:.1}h ({})",
            ctx.window.duration_hours,
            ctx.window.strategy.label()
        ),
    );
    SectionResult::Fields { fields }
}

fn files_changed(ctx: &JournalContext) -> SectionResult {
    let items = ctx
        .commit
        .files
        .iter()
        .map(|file| {
            let mut line = format!(
                "{} {} (+{} -{})",
                file.kind.symbol(),
                file.path,
                file.insertions,
                file.deletions
            );
            if file.diff_omitted {
                line.push_str(" [diff not captured]");
            }
            line
        })
        .collect();
    SectionResult::Items { items }
}

fn technical_synopsis(ctx: &JournalContext) -> SectionResult {
    let commit = &ctx.commit;
    if commit.files.is_empty() {
        return SectionResult::Content {
            text: "No file changes recorded for this commit.".to_owned(),
        };
    }

    let files_word = if commit.files.len() == 1 { "file" } else { "files" };
    let mut lines = vec![format!(
        "{} {} changed (+{} -{}).",
        commit.files.len(),
        files_word,
        commit.insertions,
        commit.deletions
    )];

    let histogram = extension_histogram(&commit.files);
    if !histogram.is_empty() {
        let listed = histogram
            .iter()
            .take(5)
            .map(|(ext, count)| format!("{ext} ({count})"))
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("Touched: {listed}."));
    }

    if let Some(top) = commit
        .files
        .iter()
        .max_by_key(|file| file.insertions + file.deletions)
    {
        if top.insertions + top.deletions > 0 {
            lines.push(format!(
                "Largest change: {} (+{} -{}).",
                top.path, top.insertions, top.deletions
            ));
        }
    }

    if commit.diffs_truncated {
        lines.push("Diff capture hit the size cap; some changes are summarized from stats only.".to_owned());
    }

    SectionResult::Content {
        text: lines.join("\n"),
    }
}

/// Change counts per file extension, most-touched first, name as the
/// tiebreak so output is deterministic.
fn extension_histogram(files: &[FileChange]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for file in files {
        let ext = Path::new(&file.path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{ext}"))
            .unwrap_or_else(|| "(no extension)".to_owned());
        *counts.entry(ext).or_default() += 1;
    }
    let mut out: Vec<(String, usize)> = counts.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

// ============================================================================
// AI sections
// ============================================================================

const SUMMARY_INSTRUCTION: &str = "\
You are writing a developer journal entry about commit {{ short_hash }} ('{{ subject }}').
Using the JSON context document that follows, write 2-4 first-person sentences describing what was worked on and why it mattered.
{% if message_count > 0 %}Draw on the {{ message_count }} chat messages from the {{ window_hours }}h working window for intent and decisions.
{% endif %}Write plain prose. No headings, no bullets, no code fences.";

const ACCOMPLISHMENTS_INSTRUCTION: &str = "\
List what was accomplished in commit {{ short_hash }} ('{{ subject }}'), based on the JSON context document that follows.
Reply with markdown bullets, one per line, each starting with '- '.
Keep each bullet concrete and in the first person.
If nothing clearly qualifies, reply with exactly NONE.";

const FRUSTRATIONS_INSTRUCTION: &str = "\
List friction, dead ends, or annoyances the developer ran into while producing commit {{ short_hash }} ('{{ subject }}'), based on the JSON context document that follows.
Reply with markdown bullets, one per line, each starting with '- '.
Only include difficulties actually visible in the context. If it shows none, reply with exactly NONE.";

const HIGHLIGHTS_INSTRUCTION: &str = "\
From the chat transcript in the JSON context document that follows, pick up to 5 exchanges worth remembering: decisions, tradeoffs, or surprises from the {{ window_hours }}h window behind commit {{ short_hash }}.
Reply with markdown bullets, one per line, each starting with '- ', briefly quoting or paraphrasing and naming the speaker role.
If nothing is worth keeping, reply with exactly NONE.";

fn summary(
    ctx: &JournalContext,
    ai: &dyn CompletionClient,
) -> Result<SectionResult, SectionError> {
    let instruction = render_instruction(SUMMARY_INSTRUCTION, ctx)?;
    let document = json!({
        "commit": commit_slice(ctx),
        "diff": diff_slice(ctx),
        "chat": chat_slice(ctx),
        "notes": notes_slice(ctx),
    });
    let reply = ai.complete(&instruction, &document)?;
    Ok(SectionResult::Content {
        text: reply.trim().to_owned(),
    })
}

fn accomplishments(
    ctx: &JournalContext,
    ai: &dyn CompletionClient,
) -> Result<SectionResult, SectionError> {
    let instruction = render_instruction(ACCOMPLISHMENTS_INSTRUCTION, ctx)?;
    let document = json!({
        "commit": commit_slice(ctx),
        "diff": diff_slice(ctx),
        "chat": chat_slice(ctx),
        "notes": notes_slice(ctx),
    });
    let reply = ai.complete(&instruction, &document)?;
    Ok(SectionResult::Items {
        items: parse_bullets(&reply),
    })
}

fn frustrations(
    ctx: &JournalContext,
    ai: &dyn CompletionClient,
) -> Result<SectionResult, SectionError> {
    let instruction = render_instruction(FRUSTRATIONS_INSTRUCTION, ctx)?;
    let document = json!({
        "commit": commit_slice(ctx),
        "chat": chat_slice(ctx),
        "notes": notes_slice(ctx),
    });
    let reply = ai.complete(&instruction, &document)?;
    Ok(SectionResult::Items {
        items: parse_bullets(&reply),
    })
}

fn discussion_highlights(
    ctx: &JournalContext,
    ai: &dyn CompletionClient,
) -> Result<SectionResult, SectionError> {
    if ctx.messages.is_empty() {
        return Err(SectionError::NoChat);
    }
    let instruction = render_instruction(HIGHLIGHTS_INSTRUCTION, ctx)?;
    let document = json!({ "chat": chat_slice(ctx) });
    let reply = ai.complete(&instruction, &document)?;
    Ok(SectionResult::Items {
        items: parse_bullets(&reply),
    })
}

// ============================================================================
// Prompt assembly
// ============================================================================

fn render_instruction(source: &str, ctx: &JournalContext) -> Result<String, SectionError> {
    let env = Environment::new();
    let template = env.template_from_str(source)?;
    let rendered = template.render(context! {
        short_hash => ctx.commit.short_hash,
        subject => subject(&ctx.commit.message),
        message_count => ctx.messages.len(),
        window_hours => format!("{:.1}", ctx.window.duration_hours),
    })?;
    Ok(rendered)
}

fn subject(message: &str) -> &str {
    message.lines().next().unwrap_or("").trim()
}

fn commit_slice(ctx: &JournalContext) -> serde_json::Value {
    let commit = &ctx.commit;
    json!({
        "hash": commit.short_hash,
        "message": commit.message,
        "author": commit.author_name,
        "insertions": commit.insertions,
        "deletions": commit.deletions,
        "files": commit.files.iter().map(|file| json!({
            "path": file.path,
            "change": file.kind,
            "insertions": file.insertions,
            "deletions": file.deletions,
        })).collect::<Vec<_>>(),
    })
}

fn diff_slice(ctx: &JournalContext) -> String {
    let mut out = String::new();
    for diff in &ctx.commit.diffs {
        if out.len() >= DIFF_SLICE_MAX {
            break;
        }
        out.push_str("--- ");
        out.push_str(&diff.path);
        out.push('\n');
        let remaining = DIFF_SLICE_MAX.saturating_sub(out.len());
        out.push_str(&clip_text(&diff.patch, remaining));
        out.push('\n');
    }
    out
}

/// The tail of the transcript, newest messages preferred, each body
/// clipped so one pasted log cannot crowd out everything else.
fn chat_slice(ctx: &JournalContext) -> Vec<serde_json::Value> {
    let skip = ctx.messages.len().saturating_sub(CHAT_SLICE_MAX_MESSAGES);
    ctx.messages
        .iter()
        .skip(skip)
        .map(|message| {
            json!({
                "role": message.role.label(),
                "session": message.session,
                "text": clip_text(&message.text, CHAT_MESSAGE_CLIP),
            })
        })
        .collect()
}

fn notes_slice(ctx: &JournalContext) -> serde_json::Value {
    json!({
        "reflections": ctx.recent.reflections,
        "earlier_notes": ctx.recent.context,
    })
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Parses a bulleted reply. `NONE` is the model saying the section has
/// nothing, which is a valid empty list, not a failure. Lines that
/// ignore the bullet format are kept whole rather than dropped.
fn parse_bullets(reply: &str) -> Vec<String> {
    let trimmed = reply.trim();
    if trimmed.trim_end_matches('.').eq_ignore_ascii_case("none") {
        return Vec::new();
    }
    trimmed.lines().filter_map(strip_bullet).collect()
}

fn strip_bullet(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if let Some(rest) = line.strip_prefix("- ").or_else(|| line.strip_prefix("* ")) {
        return Some(rest.trim().to_owned());
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return Some(rest.trim().to_owned());
        }
    }
    Some(line.to_owned())
}

fn clip_text(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_owned();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{} [...]", &text[..end])
}
