//! Pulls the developer's own notes back out of today's journal file.
//!
//! Everything after the last end-of-entry marker was typed by hand.
//! Those notes feed the next entry's AI sections so they can build on
//! what the developer already wrote instead of repeating generated
//! text back at them.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

use super::{ENTRY_END_MARKER, daily_path};

#[derive(Debug, Clone, Default, Serialize)]
pub struct RecentNotes {
    /// Bodies of `### Reflection` blocks.
    pub reflections: Vec<String>,
    /// Every other hand-written block in the tail.
    pub context: Vec<String>,
}

impl RecentNotes {
    pub fn is_empty(&self) -> bool {
        self.reflections.is_empty() && self.context.is_empty()
    }
}

/// Reads the notes trailing the last generated entry in `date`'s file.
/// A missing file is an empty result, not an error.
pub fn recent_notes(root: &Path, date: NaiveDate) -> Result<RecentNotes> {
    let path = daily_path(root, date);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(RecentNotes::default()),
        Err(err) => return Err(err).with_context(|| format!("reading {}", path.display())),
    };
    Ok(parse_tail(tail_after_last_marker(&contents)))
}

fn tail_after_last_marker(contents: &str) -> &str {
    match contents.rfind(ENTRY_END_MARKER) {
        Some(idx) => &contents[idx + ENTRY_END_MARKER.len()..],
        None => contents,
    }
}

/// Splits the tail into `### `-headed blocks. Reflection headings
/// collect separately; loose text before any heading counts as context.
fn parse_tail(tail: &str) -> RecentNotes {
    fn flush(notes: &mut RecentNotes, heading: Option<&str>, block: &[&str]) {
        let body = block.join("\n").trim().to_string();
        if body.is_empty() {
            return;
        }
        match heading {
            Some(h) if h.starts_with("Reflection") => notes.reflections.push(body),
            _ => notes.context.push(body),
        }
    }

    let mut notes = RecentNotes::default();
    let mut heading: Option<&str> = None;
    let mut block: Vec<&str> = Vec::new();
    for line in tail.lines() {
        if let Some(rest) = line.strip_prefix("### ") {
            flush(&mut notes, heading, &block);
            block.clear();
            heading = Some(rest.trim());
        } else {
            block.push(line);
        }
    }
    flush(&mut notes, heading, &block);
    notes
}
