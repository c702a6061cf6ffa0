//! Read access to one per-log store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use crate::error::StoreError;
use crate::fight::{FightDetail, FightSeriesPoint, FightSummary};
use crate::session::SessionDetail;

use super::{SessionSummary, BUSY_TIMEOUT_SECS, META_SOURCE_FILE};

/// One opened store file. Opens are cheap; the index opens stores on
/// demand rather than holding handles, so files stay renameable.
pub struct LogStore {
    conn: Connection,
    path: PathBuf,
}

impl LogStore {
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
        let store = Self {
            conn,
            path: path.to_path_buf(),
        };
        // Probe the schema up front so a corrupt store fails at open,
        // where the caller can isolate it.
        store
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |_| Ok(()))?;
        Ok(store)
    }

    /// Read-write open, used only for display-name updates.
    pub fn open_read_write(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta(&self) -> Result<HashMap<String, String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT key, value FROM log_meta")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut meta = HashMap::new();
        for row in rows {
            let (key, value): (String, String) = row?;
            meta.insert(key, value);
        }
        Ok(meta)
    }

    pub fn source_file(&self) -> Result<Option<String>, StoreError> {
        Ok(self.meta()?.remove(META_SOURCE_FILE))
    }

    pub fn session_summaries(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, display_name, unix_start_ms, server, fight_count \
             FROM sessions ORDER BY unix_start_ms DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(SessionSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                display_name: row.get(2)?,
                unix_start_ms: row.get(3)?,
                server: row.get(4)?,
                fight_count: row.get(5)?,
                store_path: PathBuf::new(),
            })
        })?;
        let mut summaries = Vec::new();
        for row in rows {
            let mut summary = row?;
            summary.store_path = self.path.clone();
            summaries.push(summary);
        }
        Ok(summaries)
    }

    /// Full session record; the `display_name` column overrides whatever
    /// the blob carried at import time.
    pub fn session_detail(&self, session_id: &str) -> Result<Option<SessionDetail>, StoreError> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT detail_blob, display_name FROM sessions WHERE id = ?1",
                params![session_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((blob, display_name)) => {
                let mut detail: SessionDetail = serde_json::from_str(&blob)?;
                detail.display_name = display_name;
                Ok(Some(detail))
            }
            None => Ok(None),
        }
    }

    pub fn fight_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM fights ORDER BY start_rel_ms")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    pub fn fights_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<FightSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT summary_blob FROM fights WHERE session_id = ?1 ORDER BY start_rel_ms",
        )?;
        let rows = stmt.query_map(params![session_id], |row| row.get::<_, String>(0))?;
        let mut fights = Vec::new();
        for row in rows {
            fights.push(serde_json::from_str(&row?)?);
        }
        Ok(fights)
    }

    pub fn fight_summary(&self, fight_id: &str) -> Result<Option<FightSummary>, StoreError> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT summary_blob FROM fights WHERE id = ?1",
                params![fight_id],
                |row| row.get(0),
            )
            .optional()?;
        decode_optional(blob)
    }

    pub fn fight_detail(&self, fight_id: &str) -> Result<Option<FightDetail>, StoreError> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT detail_blob FROM fight_details WHERE fight_id = ?1",
                params![fight_id],
                |row| row.get(0),
            )
            .optional()?;
        decode_optional(blob)
    }

    pub fn fight_series(
        &self,
        fight_id: &str,
    ) -> Result<Option<Vec<FightSeriesPoint>>, StoreError> {
        let blob: Option<String> = self
            .conn
            .query_row(
                "SELECT series_blob FROM fight_series WHERE fight_id = ?1",
                params![fight_id],
                |row| row.get(0),
            )
            .optional()?;
        decode_optional(blob)
    }

    /// Set or clear the user-facing session name. Returns whether the
    /// session existed.
    pub fn set_display_name(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET display_name = ?2 WHERE id = ?1",
            params![session_id, name],
        )?;
        Ok(changed > 0)
    }
}

fn decode_optional<T: serde::de::DeserializeOwned>(
    blob: Option<String>,
) -> Result<Option<T>, StoreError> {
    match blob {
        Some(blob) => Ok(Some(serde_json::from_str(&blob)?)),
        None => Ok(None),
    }
}
