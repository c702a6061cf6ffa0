//! Per-log relational store: one SQLite file per imported log.
//!
//! Five tables: `log_meta`, `sessions`, `fights`, `fight_details`,
//! `fight_series`. The row columns carry what list views need; the full
//! records travel as self-describing JSON blobs so older stores keep
//! loading after fields are added (`#[serde(default)]` on the structs).

pub mod reader;
pub mod writer;


use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

pub use reader::LogStore;
pub use writer::StoreWriter;

/// File suffix every per-log store carries.
pub const STORE_SUFFIX: &str = ".log.db";

/// Engine-level statement timeout.
pub const BUSY_TIMEOUT_SECS: u64 = 30;

pub(crate) const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS log_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    unix_start_ms INTEGER NOT NULL,
    title TEXT NOT NULL,
    display_name TEXT,
    server TEXT NOT NULL,
    language TEXT NOT NULL,
    patch TEXT NOT NULL,
    fight_count INTEGER NOT NULL,
    trial_init_key INTEGER,
    detail_blob TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fights (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL REFERENCES sessions(id),
    zone_segment_id INTEGER NOT NULL,
    start_rel_ms INTEGER NOT NULL,
    end_rel_ms INTEGER NOT NULL,
    title TEXT NOT NULL,
    zone_name TEXT NOT NULL,
    difficulty TEXT NOT NULL,
    map_name TEXT,
    map_key TEXT,
    is_hard_mode INTEGER NOT NULL DEFAULT 0,
    summary_blob TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fight_details (
    fight_id TEXT PRIMARY KEY REFERENCES fights(id),
    detail_blob TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS fight_series (
    fight_id TEXT PRIMARY KEY REFERENCES fights(id),
    series_blob TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_fights_session ON fights(session_id);
CREATE INDEX IF NOT EXISTS idx_fights_zone ON fights(zone_segment_id);
"#;

/// Meta keys written on import.
pub const META_IMPORTED_AT: &str = "imported_at";
pub const META_SOURCE_FILE: &str = "source_file";

/// List-view row for one stored session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub unix_start_ms: i64,
    #[serde(default)]
    pub server: String,
    pub fight_count: i64,
    pub store_path: PathBuf,
}

impl SessionSummary {
    /// Name shown to users: the display name when set, else the title.
    pub fn effective_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.title)
    }
}

/// Replace anything the host filesystem might reject.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Final store name: `<base>_YYYY-MM-DD_HH-MM-SS.log.db`, derived from the
/// earliest session's local timestamp and the original log's base name.
pub fn store_file_name(log_base_name: &str, unix_start_ms: i64) -> String {
    let stamp = Local
        .timestamp_millis_opt(unix_start_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d_%H-%M-%S").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}_{stamp}{STORE_SUFFIX}", sanitize_file_name(log_base_name))
}

/// Resolve a collision-free path inside `dir` by appending a numeric
/// suffix before the store extension.
pub fn unique_store_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = file_name.strip_suffix(STORE_SUFFIX).unwrap_or(file_name);
    for n in 2.. {
        let candidate = dir.join(format!("{stem}_{n}{STORE_SUFFIX}"));
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}
