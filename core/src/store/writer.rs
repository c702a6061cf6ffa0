//! Bulk store writer: temp file, pragmas, one transaction, rename.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::error::{ImportError, StoreError};
use crate::session::CompletedSession;

use super::{BUSY_TIMEOUT_SECS, META_IMPORTED_AT, META_SOURCE_FILE, SCHEMA_SQL};

/// Writes one import into a temporary store file. `finalize` renames it
/// into place; anything else leaves no visible store behind.
pub struct StoreWriter {
    conn: Connection,
    temp_path: PathBuf,
}

impl StoreWriter {
    /// Create a fresh temp store under `dir` with schema applied.
    /// Pragmas are set here, before any transaction opens; SQLite rejects
    /// journal pragmas issued inside one.
    pub fn create(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let temp_path = dir.join(format!(".import-{}.tmp", Uuid::new_v4()));
        let conn = Connection::open(&temp_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn, temp_path })
    }

    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Write the whole import in a single transaction. Cancellation is
    /// checked between row groups (per session and per fight); a cancelled
    /// write rolls back.
    pub fn write_import(
        &mut self,
        source_file: &str,
        sessions: &[CompletedSession],
        cancel: &CancelToken,
    ) -> Result<(), ImportError> {
        let tx = self.conn.transaction().map_err(StoreError::from)?;

        tx.execute(
            "INSERT OR REPLACE INTO log_meta (key, value) VALUES (?1, ?2)",
            params![META_IMPORTED_AT, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(StoreError::from)?;
        tx.execute(
            "INSERT OR REPLACE INTO log_meta (key, value) VALUES (?1, ?2)",
            params![META_SOURCE_FILE, source_file],
        )
        .map_err(StoreError::from)?;

        for session in sessions {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }
            let detail_blob =
                serde_json::to_string(&session.detail).map_err(StoreError::from)?;
            tx.execute(
                "INSERT INTO sessions \
                 (id, unix_start_ms, title, display_name, server, language, patch, \
                  fight_count, trial_init_key, detail_blob) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    session.detail.id,
                    session.detail.unix_start_ms,
                    session.detail.title,
                    session.detail.display_name,
                    session.detail.server,
                    session.detail.language,
                    session.detail.patch,
                    session.fights.len() as i64,
                    session.detail.trial_init_key,
                    detail_blob,
                ],
            )
            .map_err(StoreError::from)?;

            for fight in &session.fights {
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                let summary = &fight.summary;
                let summary_blob = serde_json::to_string(summary).map_err(StoreError::from)?;
                tx.execute(
                    "INSERT INTO fights \
                     (id, session_id, zone_segment_id, start_rel_ms, end_rel_ms, title, \
                      zone_name, difficulty, map_name, map_key, is_hard_mode, summary_blob) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        summary.id,
                        summary.session_id,
                        summary.zone_segment_id,
                        summary.start_rel_ms,
                        summary.end_rel_ms,
                        summary.title,
                        summary.zone_name,
                        summary.difficulty,
                        summary.map_name,
                        summary.map_key,
                        summary.is_hard_mode,
                        summary_blob,
                    ],
                )
                .map_err(StoreError::from)?;

                let detail_blob =
                    serde_json::to_string(&fight.detail).map_err(StoreError::from)?;
                tx.execute(
                    "INSERT INTO fight_details (fight_id, detail_blob) VALUES (?1, ?2)",
                    params![summary.id, detail_blob],
                )
                .map_err(StoreError::from)?;

                let series_blob =
                    serde_json::to_string(&fight.series).map_err(StoreError::from)?;
                tx.execute(
                    "INSERT INTO fight_series (fight_id, series_blob) VALUES (?1, ?2)",
                    params![summary.id, series_blob],
                )
                .map_err(StoreError::from)?;
            }
        }

        tx.commit().map_err(StoreError::from)?;
        Ok(())
    }

    /// Close the connection and move the temp file to its final name.
    /// The handle must be gone before the rename; this store never pools
    /// connections for exactly this reason.
    pub fn finalize(self, final_path: &Path) -> Result<PathBuf, StoreError> {
        let Self { conn, temp_path } = self;
        drop(conn);
        std::fs::rename(&temp_path, final_path)?;
        Ok(final_path.to_path_buf())
    }

    /// Drop the temp store, best effort.
    pub fn discard(self) {
        let Self { conn, temp_path } = self;
        drop(conn);
        if let Err(err) = std::fs::remove_file(&temp_path) {
            tracing::warn!(
                "[STORE] could not remove temp store {}: {err}",
                temp_path.display()
            );
        }
    }
}
