//! Operational surface: one façade over ingestion, stores and the index.

use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::cancel::CancelToken;
use crate::error::{ImportError, StoreError};
use crate::fight::{FightDetail, FightSeriesPoint, FightSummary};
use crate::import::ingest_file;
use crate::index::{LogIndex, StoreEntry};
use crate::query::{self, AbilityAggregate, AggFilter, RangeStats};
use crate::session::{IngestOptions, SessionDetail};
use crate::store::{store_file_name, unique_store_path, SessionSummary, StoreWriter};

/// Owns the store root and the multi-log index. Independent logs may be
/// imported concurrently through one shared service; each import owns its
/// own store file.
pub struct LogService {
    index: LogIndex,
}

impl LogService {
    /// Open the service over the `logdbs` root, scanning existing stores.
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        Ok(Self {
            index: LogIndex::open(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    pub fn index(&self) -> &LogIndex {
        &self.index
    }

    /// Ticks after every index refresh.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.index.subscribe()
    }

    /// Import one log file end to end: parse, write a temp store, rename
    /// it into place, refresh the index. On failure or cancellation the
    /// temp store is removed and no partial store appears in the index.
    pub fn import_log(
        &self,
        path: &Path,
        options: IngestOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<SessionSummary>, ImportError> {
        let sessions = ingest_file(path, options, cancel)?;
        if sessions.is_empty() {
            tracing::info!("[IMPORT] {}: no sessions, skipping store", path.display());
            return Ok(Vec::new());
        }

        let source_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ImportError::InvalidPath(path.to_path_buf()))?;
        let base = path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or("log");

        let mut writer = StoreWriter::create(self.root()).map_err(ImportError::Store)?;
        if let Err(err) = writer.write_import(source_file, &sessions, cancel) {
            writer.discard();
            return Err(err);
        }

        let earliest = sessions
            .iter()
            .map(|s| s.detail.unix_start_ms)
            .min()
            .unwrap_or(0);
        let final_path =
            unique_store_path(self.root(), &store_file_name(base, earliest));
        let stored_path = writer
            .finalize(&final_path)
            .map_err(ImportError::Store)?;
        self.index.refresh().map_err(ImportError::Store)?;

        Ok(sessions
            .iter()
            .map(|s| SessionSummary {
                id: s.detail.id.clone(),
                title: s.detail.title.clone(),
                display_name: s.detail.display_name.clone(),
                unix_start_ms: s.detail.unix_start_ms,
                server: s.detail.server.clone(),
                fight_count: s.fights.len() as i64,
                store_path: stored_path.clone(),
            })
            .collect())
    }

    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.index.get_sessions()
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>, StoreError> {
        self.index.get_session(session_id)
    }

    pub fn get_session_fights(
        &self,
        session_id: &str,
    ) -> Result<Vec<FightSummary>, StoreError> {
        self.index.get_session_fights(session_id)
    }

    pub fn get_fight(&self, fight_id: &str) -> Result<Option<FightSummary>, StoreError> {
        self.index.get_fight(fight_id)
    }

    pub fn get_fight_detail(
        &self,
        fight_id: &str,
    ) -> Result<Option<FightDetail>, StoreError> {
        self.index.get_fight_detail(fight_id)
    }

    pub fn get_series(
        &self,
        fight_id: &str,
    ) -> Result<Option<Vec<FightSeriesPoint>>, StoreError> {
        self.index.get_series(fight_id)
    }

    /// Per-ability aggregates for one fight under a filter.
    pub fn get_aggregates(
        &self,
        fight_id: &str,
        filter: &AggFilter,
    ) -> Result<Option<Vec<AbilityAggregate>>, StoreError> {
        let Some(detail) = self.index.get_fight_detail(fight_id)? else {
            return Ok(None);
        };
        Ok(Some(query::project_aggregates(&detail, filter)))
    }

    /// Filtered per-second series for one fight.
    pub fn get_filtered_series(
        &self,
        fight_id: &str,
        filter: &AggFilter,
    ) -> Result<Option<Vec<FightSeriesPoint>>, StoreError> {
        let Some(summary) = self.index.get_fight(fight_id)? else {
            return Ok(None);
        };
        let Some(detail) = self.index.get_fight_detail(fight_id)? else {
            return Ok(None);
        };
        let series = self.index.get_series(fight_id)?.unwrap_or_default();
        Ok(Some(query::project_series(
            &detail,
            &series,
            filter,
            summary.start_rel_ms,
        )))
    }

    pub fn get_range(
        &self,
        fight_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Option<RangeStats>, StoreError> {
        self.index.get_range(fight_id, from_ms, to_ms)
    }

    pub fn set_session_display_name(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<(), StoreError> {
        self.index.set_session_display_name(session_id, name)
    }

    pub fn list_log_stores(&self) -> Result<Vec<StoreEntry>, StoreError> {
        self.index.list_stores()
    }

    pub fn delete_log_store(&self, path: &Path) -> Result<(), StoreError> {
        self.index.delete_store(path)
    }

    pub fn rename_legacy_stores(&self) -> Result<Vec<(PathBuf, PathBuf)>, StoreError> {
        self.index.rename_legacy_stores()
    }
}
