//! Journal file layout and entry persistence.
//!
//! Entries append to one Markdown file per local calendar day, grouped
//! by month: `<root>/entries/YYYY-MM/YYYY-MM-DD.md`. Every generated
//! entry ends with a marker comment so later runs can tell generated
//! text from notes the developer typed below it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use fs2::FileExt;

pub mod reader;


/// Appended after every generated entry. The reader treats anything
/// after the last marker as hand-written.
pub const ENTRY_END_MARKER: &str = "<!-- daybook:end -->";

/// `<root>/entries/YYYY-MM/YYYY-MM-DD.md`
pub fn daily_path(root: &Path, date: NaiveDate) -> PathBuf {
    root.join("entries")
        .join(date.format("%Y-%m").to_string())
        .join(format!("{}.md", date.format("%Y-%m-%d")))
}

/// Local calendar date of an epoch-milliseconds timestamp. Entries file
/// under the commit's date, not the wall clock at generation time.
pub fn local_date(timestamp_ms: i64) -> NaiveDate {
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(utc) => utc.with_timezone(&Local).date_naive(),
        None => Local::now().date_naive(),
    }
}

/// Local wall-clock rendering used in entry headings.
pub fn format_local_ms(timestamp_ms: i64) -> String {
    match DateTime::from_timestamp_millis(timestamp_ms) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => format!("epoch+{timestamp_ms}ms"),
    }
}

/// Appends one finished entry to the daily file, creating directories
/// as needed. An exclusive lock is held for the write so concurrent
/// hook runs cannot interleave; the lock releases when the file drops.
pub fn append_entry(root: &Path, date: NaiveDate, entry: &str) -> Result<PathBuf> {
    let path = daily_path(root, date);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    file.lock_exclusive()
        .with_context(|| format!("locking {}", path.display()))?;

    let mut doc = String::with_capacity(entry.len() + ENTRY_END_MARKER.len() + 4);
    doc.push_str(entry);
    if !entry.ends_with('\n') {
        doc.push('\n');
    }
    doc.push('\n');
    doc.push_str(ENTRY_END_MARKER);
    doc.push_str("\n\n");

    file.write_all(doc.as_bytes())
        .and_then(|()| file.flush())
        .with_context(|| format!("appending to {}", path.display()))?;
    Ok(path)
}
