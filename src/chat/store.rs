use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension};

/// Read-only view of one key/value state database.
///
/// The assistant may hold these databases open for writing while we
/// read, so connections are opened read-only with a busy timeout
/// instead of failing on the first locked page.
pub struct KvStore {
    conn: Connection,
}

impl KvStore {
    pub fn open_read_only(path: &Path, busy_timeout_ms: u64) -> rusqlite::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        Ok(KvStore { conn })
    }

    /// Value stored under `key`, or `None` when the key is absent.
    pub fn get(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()
    }
}
