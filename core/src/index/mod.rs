//! Multi-log index: discovers per-log stores under one root directory and
//! routes session/fight ids to the store that owns them.
//!
//! The routing maps are rebuilt by `refresh()` and swapped atomically
//! under a single mutex; readers always see a complete generation.
//! Subscribers learn about swaps through a watch channel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tokio::sync::watch;
use uuid::Uuid;

use crate::error::StoreError;
use crate::fight::{FightDetail, FightSeriesPoint, FightSummary};
use crate::query::{self, RangeStats};
use crate::session::SessionDetail;
use crate::store::{
    store_file_name, unique_store_path, LogStore, SessionSummary, STORE_SUFFIX,
};

#[derive(Debug, Default)]
struct RoutingMaps {
    session_to_store: HashMap<String, PathBuf>,
    fight_to_store: HashMap<String, PathBuf>,
    /// All sessions across stores, sorted by `unix_start_ms` descending.
    sessions: Vec<SessionSummary>,
}

/// Entry describing one discovered store file.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub path: PathBuf,
    pub source_file: Option<String>,
    pub session_count: usize,
}

pub struct LogIndex {
    root: PathBuf,
    maps: Mutex<RoutingMaps>,
    changed_tx: watch::Sender<u64>,
}

impl LogIndex {
    /// Create an index over `root` (created if missing) and run the first
    /// scan.
    pub fn open(root: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root)?;
        let (changed_tx, _) = watch::channel(0);
        let index = Self {
            root,
            maps: Mutex::new(RoutingMaps::default()),
            changed_tx,
        };
        index.refresh()?;
        Ok(index)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Receiver that ticks after every successful refresh.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed_tx.subscribe()
    }

    /// Rescan the root directory. Corrupt stores are skipped, not fatal.
    pub fn refresh(&self) -> Result<(), StoreError> {
        let mut next = RoutingMaps::default();

        for path in self.store_paths()? {
            let store = match LogStore::open_read_only(&path) {
                Ok(store) => store,
                Err(err) => {
                    tracing::warn!("[INDEX] skipping {}: {err}", path.display());
                    continue;
                }
            };
            match index_one(&store, &path, &mut next) {
                Ok(()) => {}
                Err(err) => {
                    tracing::warn!("[INDEX] skipping {}: {err}", path.display());
                }
            }
        }

        next.sessions
            .sort_by(|a, b| b.unix_start_ms.cmp(&a.unix_start_ms));

        {
            let mut maps = self.maps.lock().expect("index mutex poisoned");
            *maps = next;
        }
        self.changed_tx.send_modify(|generation| *generation += 1);
        Ok(())
    }

    fn store_paths(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_file() && is_store_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// All sessions across all stores, newest first.
    pub fn get_sessions(&self) -> Vec<SessionSummary> {
        self.maps
            .lock()
            .expect("index mutex poisoned")
            .sessions
            .clone()
    }

    fn store_for_session(&self, session_id: &str) -> Option<PathBuf> {
        self.maps
            .lock()
            .expect("index mutex poisoned")
            .session_to_store
            .get(session_id)
            .cloned()
    }

    fn store_for_fight(&self, fight_id: &str) -> Option<PathBuf> {
        self.maps
            .lock()
            .expect("index mutex poisoned")
            .fight_to_store
            .get(fight_id)
            .cloned()
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<SessionDetail>, StoreError> {
        let Some(path) = self.store_for_session(session_id) else {
            return Ok(None);
        };
        LogStore::open_read_only(&path)?.session_detail(session_id)
    }

    pub fn get_session_fights(
        &self,
        session_id: &str,
    ) -> Result<Vec<FightSummary>, StoreError> {
        let Some(path) = self.store_for_session(session_id) else {
            return Ok(Vec::new());
        };
        LogStore::open_read_only(&path)?.fights_for_session(session_id)
    }

    pub fn get_fight(&self, fight_id: &str) -> Result<Option<FightSummary>, StoreError> {
        let Some(path) = self.store_for_fight(fight_id) else {
            return Ok(None);
        };
        LogStore::open_read_only(&path)?.fight_summary(fight_id)
    }

    pub fn get_fight_detail(&self, fight_id: &str) -> Result<Option<FightDetail>, StoreError> {
        let Some(path) = self.store_for_fight(fight_id) else {
            return Ok(None);
        };
        LogStore::open_read_only(&path)?.fight_detail(fight_id)
    }

    pub fn get_series(
        &self,
        fight_id: &str,
    ) -> Result<Option<Vec<FightSeriesPoint>>, StoreError> {
        let Some(path) = self.store_for_fight(fight_id) else {
            return Ok(None);
        };
        LogStore::open_read_only(&path)?.fight_series(fight_id)
    }

    /// Range stats over a fight's stored series.
    pub fn get_range(
        &self,
        fight_id: &str,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Option<RangeStats>, StoreError> {
        let Some(series) = self.get_series(fight_id)? else {
            return Ok(None);
        };
        Ok(query::range_stats(&series, from_ms, to_ms))
    }

    /// Set or clear a session's display name in its owning store.
    pub fn set_session_display_name(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<(), StoreError> {
        let path = self
            .store_for_session(session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {session_id}")))?;
        let updated = LogStore::open_read_write(&path)?.set_display_name(session_id, name)?;
        if !updated {
            return Err(StoreError::NotFound(format!("session {session_id}")));
        }
        self.refresh()
    }

    /// Every store file under the root, with provenance.
    pub fn list_stores(&self) -> Result<Vec<StoreEntry>, StoreError> {
        let mut entries = Vec::new();
        for path in self.store_paths()? {
            match LogStore::open_read_only(&path) {
                Ok(store) => {
                    let source_file = store.source_file().unwrap_or(None);
                    let session_count =
                        store.session_summaries().map(|s| s.len()).unwrap_or(0);
                    entries.push(StoreEntry {
                        path,
                        source_file,
                        session_count,
                    });
                }
                Err(err) => {
                    tracing::warn!("[INDEX] unreadable store {}: {err}", path.display());
                }
            }
        }
        Ok(entries)
    }

    /// Delete one store file. The path must live under the index root.
    pub fn delete_store(&self, path: &Path) -> Result<(), StoreError> {
        let canonical_root = self.root.canonicalize()?;
        let canonical = path.canonicalize()?;
        if !canonical.starts_with(&canonical_root) {
            return Err(StoreError::NotFound(format!(
                "{} is outside the store root",
                path.display()
            )));
        }
        std::fs::remove_file(&canonical)?;
        tracing::info!("[INDEX] deleted store {}", canonical.display());
        self.refresh()
    }

    /// Rename stores still carrying import-era GUID names to the friendly
    /// `<base>_YYYY-MM-DD_HH-MM-SS.log.db` form. Collisions get a numeric
    /// suffix. Returns the performed renames.
    pub fn rename_legacy_stores(&self) -> Result<Vec<(PathBuf, PathBuf)>, StoreError> {
        let mut renamed = Vec::new();
        for path in self.store_paths()? {
            if !has_guid_name(&path) {
                continue;
            }
            let (base, unix_start_ms) = {
                let store = match LogStore::open_read_only(&path) {
                    Ok(store) => store,
                    Err(err) => {
                        tracing::warn!("[INDEX] skipping {}: {err}", path.display());
                        continue;
                    }
                };
                let base = store
                    .source_file()
                    .unwrap_or(None)
                    .unwrap_or_else(|| "log".to_string());
                let earliest = store
                    .session_summaries()?
                    .iter()
                    .map(|s| s.unix_start_ms)
                    .min()
                    .unwrap_or(0);
                (base, earliest)
            };
            let target = unique_store_path(&self.root, &store_file_name(&base, unix_start_ms));
            std::fs::rename(&path, &target)?;
            tracing::info!(
                "[INDEX] renamed {} -> {}",
                path.display(),
                target.display()
            );
            renamed.push((path, target));
        }
        if !renamed.is_empty() {
            self.refresh()?;
        }
        Ok(renamed)
    }
}

fn index_one(
    store: &LogStore,
    path: &Path,
    maps: &mut RoutingMaps,
) -> Result<(), StoreError> {
    for summary in store.session_summaries()? {
        maps.session_to_store
            .insert(summary.id.clone(), path.to_path_buf());
        maps.sessions.push(summary);
    }
    for fight_id in store.fight_ids()? {
        maps.fight_to_store.insert(fight_id, path.to_path_buf());
    }
    Ok(())
}

fn is_store_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(STORE_SUFFIX))
        .unwrap_or(false)
}

/// Legacy stores were named `<uuid>.log.db`.
fn has_guid_name(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.strip_suffix(STORE_SUFFIX))
        .map(|stem| Uuid::parse_str(stem).is_ok())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelToken;
    use crate::query::AggFilter;
    use crate::service::LogService;
    use crate::session::IngestOptions;
    use crate::store::StoreWriter;

    struct TempRoot(PathBuf);

    impl TempRoot {
        fn new() -> Self {
            let dir =
                std::env::temp_dir().join(format!("emberlog-index-test-{}", Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for TempRoot {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    const LOG_TEXT: &str = "\
0,BEGIN_LOG,1700000000000,15,NA,EN,10.0
10,ZONE_CHANGED,7,Crypts,VETERAN
100,BEGIN_COMBAT
1000,COMBAT_EVENT,DAMAGE,PHYSICAL,0,100,0,1,7,1,1/1,1/1,1/1,0/500,0.1,0.2,0.3,2,1/1,1/1,1/1,0/500,0.1,0.2,0.3
2000,END_COMBAT
2100,END_LOG
";

    fn write_log(root: &TempRoot, name: &str) -> PathBuf {
        let path = root.0.join(name);
        std::fs::write(&path, LOG_TEXT).unwrap();
        path
    }

    #[test]
    fn import_then_route_everything_by_id() {
        let root = TempRoot::new();
        let service = LogService::open(root.0.join("logdbs")).unwrap();
        let log = write_log(&root, "combat.log");

        let summaries = service
            .import_log(&log, IngestOptions::default(), &CancelToken::new())
            .unwrap();
        assert_eq!(summaries.len(), 1);
        let session_id = &summaries[0].id;

        let listed = service.list_sessions();
        assert_eq!(listed.len(), 1);
        assert_eq!(&listed[0].id, session_id);
        assert_eq!(listed[0].fight_count, 1);

        let detail = service.get_session(session_id).unwrap().unwrap();
        assert_eq!(detail.zones[0].zone_name, "Crypts");

        let fights = service.get_session_fights(session_id).unwrap();
        let fight_id = &fights[0].id;

        let fight = service.get_fight(fight_id).unwrap().unwrap();
        assert_eq!(fight.session_id, *session_id);

        let aggs = service
            .get_aggregates(fight_id, &AggFilter::default())
            .unwrap()
            .unwrap();
        assert_eq!(aggs[0].total, 100);

        let range = service.get_range(fight_id, 0, 2000).unwrap().unwrap();
        assert_eq!(range.damage, 100);

        assert!(service.get_fight("nope").unwrap().is_none());
    }

    #[test]
    fn sessions_sort_newest_first_across_stores() {
        let root = TempRoot::new();
        let service = LogService::open(root.0.join("logdbs")).unwrap();

        let older = write_log(&root, "older.log");
        let newer_text = LOG_TEXT.replace("1700000000000", "1700000100000");
        let newer = root.0.join("newer.log");
        std::fs::write(&newer, newer_text).unwrap();

        service
            .import_log(&older, IngestOptions::default(), &CancelToken::new())
            .unwrap();
        service
            .import_log(&newer, IngestOptions::default(), &CancelToken::new())
            .unwrap();

        let sessions = service.list_sessions();
        assert_eq!(sessions.len(), 2);
        assert!(sessions[0].unix_start_ms > sessions[1].unix_start_ms);

        // Same base name and timestamp would collide; different names
        // produce two distinct store files.
        let stores = service.list_log_stores().unwrap();
        assert_eq!(stores.len(), 2);
    }

    #[test]
    fn refresh_bumps_the_change_generation() {
        let root = TempRoot::new();
        let service = LogService::open(root.0.join("logdbs")).unwrap();
        let changes = service.subscribe_changes();
        let before = *changes.borrow();
        service.index().refresh().unwrap();
        assert!(*changes.borrow() > before);
    }

    #[test]
    fn delete_store_refuses_paths_outside_the_root() {
        let root = TempRoot::new();
        let service = LogService::open(root.0.join("logdbs")).unwrap();
        let log = write_log(&root, "combat.log");
        let summaries = service
            .import_log(&log, IngestOptions::default(), &CancelToken::new())
            .unwrap();

        let outside = write_log(&root, "outside.log");
        assert!(service.delete_log_store(&outside).is_err());

        service
            .delete_log_store(&summaries[0].store_path)
            .unwrap();
        assert!(service.list_sessions().is_empty());
    }

    #[test]
    fn corrupt_stores_are_skipped_not_fatal() {
        let root = TempRoot::new();
        let logdbs = root.0.join("logdbs");
        std::fs::create_dir_all(&logdbs).unwrap();
        std::fs::write(logdbs.join(format!("broken{STORE_SUFFIX}")), b"not sqlite").unwrap();

        let service = LogService::open(logdbs).unwrap();
        assert!(service.list_sessions().is_empty());

        let log = write_log(&root, "combat.log");
        let summaries = service
            .import_log(&log, IngestOptions::default(), &CancelToken::new())
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(service.list_sessions().len(), 1);
    }

    #[test]
    fn legacy_guid_stores_are_renamed() {
        let root = TempRoot::new();
        let logdbs = root.0.join("logdbs");
        let service = LogService::open(logdbs.clone()).unwrap();

        // Build a store the legacy way: GUID file name.
        let sessions = {
            let mut builder = crate::session::SessionBuilder::new(IngestOptions::default());
            for line in LOG_TEXT.lines() {
                builder.process_line(line);
            }
            builder.finish()
        };
        let mut writer = StoreWriter::create(&logdbs).unwrap();
        writer
            .write_import("combat.log", &sessions, &CancelToken::new())
            .unwrap();
        let guid_path = logdbs.join(format!("{}{STORE_SUFFIX}", Uuid::new_v4()));
        writer.finalize(&guid_path).unwrap();

        let renamed = service.rename_legacy_stores().unwrap();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].0, guid_path);
        let new_name = renamed[0].1.file_name().unwrap().to_string_lossy().to_string();
        assert!(new_name.starts_with("combat_"));
        assert!(new_name.ends_with(STORE_SUFFIX));

        // Routing survives the rename.
        assert_eq!(service.list_sessions().len(), 1);
        assert!(service.rename_legacy_stores().unwrap().is_empty());
    }

    #[test]
    fn empty_log_creates_no_store() {
        let root = TempRoot::new();
        let service = LogService::open(root.0.join("logdbs")).unwrap();
        let log = root.0.join("empty.log");
        std::fs::write(&log, "garbage line\n").unwrap();

        let summaries = service
            .import_log(&log, IngestOptions::default(), &CancelToken::new())
            .unwrap();
        assert!(summaries.is_empty());
        assert!(service.list_log_stores().unwrap().is_empty());
    }
}
