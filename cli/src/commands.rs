//! Shell command implementations over the core service.

use std::fmt;
use std::path::Path;

use emberlog_core::session::IngestOptions;
use emberlog_core::{AggFilter, CancelToken, LogService};
use rayon::prelude::*;

#[derive(Debug)]
pub struct CommandError(String);

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {}", self.0)
    }
}

impl<E: std::error::Error> From<E> for CommandError {
    fn from(err: E) -> Self {
        CommandError(err.to_string())
    }
}

type CmdResult = Result<(), CommandError>;

pub fn import(service: &LogService, paths: &[String], no_samples: bool) -> CmdResult {
    if paths.is_empty() {
        return Err(CommandError("import needs at least one path".into()));
    }
    let options = IngestOptions {
        keep_samples: !no_samples,
    };
    let cancel = CancelToken::new();

    // Independent logs have no shared state; fan them out.
    let results: Vec<_> = paths
        .par_iter()
        .map(|path| {
            let outcome =
                service.import_log(Path::new(path), options.clone(), &cancel);
            (path, outcome)
        })
        .collect();

    for (path, outcome) in results {
        match outcome {
            Ok(summaries) if summaries.is_empty() => {
                println!("{path}: no sessions found");
            }
            Ok(summaries) => {
                for s in &summaries {
                    println!(
                        "{path}: session {} \"{}\" ({} fights) -> {}",
                        s.id,
                        s.effective_name(),
                        s.fight_count,
                        s.store_path.display()
                    );
                }
            }
            Err(err) => println!("{path}: import failed: {err}"),
        }
    }
    Ok(())
}

pub fn sessions(service: &LogService) -> CmdResult {
    let sessions = service.list_sessions();
    if sessions.is_empty() {
        println!("no sessions");
        return Ok(());
    }
    for s in sessions {
        println!(
            "{}  {}  server={}  fights={}",
            s.id,
            s.effective_name(),
            s.server,
            s.fight_count
        );
    }
    Ok(())
}

pub fn fights(service: &LogService, session_id: &str) -> CmdResult {
    let fights = service.get_session_fights(session_id)?;
    if fights.is_empty() {
        println!("no fights for session {session_id}");
        return Ok(());
    }
    for f in fights {
        let hm = if f.is_hard_mode { " [HM]" } else { "" };
        println!(
            "{}  {}{}  {}..{}ms  zone=\"{}\"",
            f.id, f.title, hm, f.start_rel_ms, f.end_rel_ms, f.zone_name
        );
    }
    Ok(())
}

fn filter_from(source: Option<i64>, target: Option<i64>, heals: bool) -> AggFilter {
    AggFilter {
        source_unit_id: source,
        target_unit_id: target,
        heals,
    }
}

pub fn aggregates(
    service: &LogService,
    fight_id: &str,
    source: Option<i64>,
    target: Option<i64>,
    heals: bool,
) -> CmdResult {
    let filter = filter_from(source, target, heals);
    let Some(rows) = service.get_aggregates(fight_id, &filter)? else {
        println!("unknown fight {fight_id}");
        return Ok(());
    };
    println!(
        "{:>12} {:>10} {:>6} {:>6} {:>8} {:>10} {:>7}",
        "ability", "total", "hits", "crit%", "avg", "dps", "share%"
    );
    for row in rows {
        println!(
            "{:>12} {:>10} {:>6} {:>6.1} {:>8.1} {:>10.1} {:>7.1}",
            row.ability_id,
            row.total,
            row.hits,
            row.crit_pct * 100.0,
            row.average,
            row.dps,
            row.percent * 100.0
        );
    }
    Ok(())
}

pub fn series(
    service: &LogService,
    fight_id: &str,
    source: Option<i64>,
    target: Option<i64>,
    heals: bool,
) -> CmdResult {
    let filter = filter_from(source, target, heals);
    let Some(points) = service.get_filtered_series(fight_id, &filter)? else {
        println!("unknown fight {fight_id}");
        return Ok(());
    };
    for p in points {
        println!("{:>6}s  damage={:<10} heal={}", p.second, p.damage, p.heal);
    }
    Ok(())
}

pub fn range(service: &LogService, fight_id: &str, from_ms: i64, to_ms: i64) -> CmdResult {
    match service.get_range(fight_id, from_ms, to_ms)? {
        Some(stats) => println!(
            "damage={} heal={} dps={:.1} hps={:.1} over {:.3}s",
            stats.damage, stats.heal, stats.dps, stats.hps, stats.duration_sec
        ),
        None => println!("empty range"),
    }
    Ok(())
}

pub fn stores(service: &LogService) -> CmdResult {
    let entries = service.list_log_stores()?;
    if entries.is_empty() {
        println!("no stores under {}", service.root().display());
        return Ok(());
    }
    for e in entries {
        println!(
            "{}  sessions={}  source={}",
            e.path.display(),
            e.session_count,
            e.source_file.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}

pub fn rename_legacy(service: &LogService) -> CmdResult {
    let renamed = service.rename_legacy_stores()?;
    if renamed.is_empty() {
        println!("no legacy stores");
    }
    for (old, new) in renamed {
        println!("{} -> {}", old.display(), new.display());
    }
    Ok(())
}

pub fn delete_store(service: &LogService, path: &str) -> CmdResult {
    service.delete_log_store(Path::new(path))?;
    println!("deleted {path}");
    Ok(())
}

pub fn set_name(service: &LogService, session_id: &str, name: Option<&str>) -> CmdResult {
    service.set_session_display_name(session_id, name)?;
    match name {
        Some(name) => println!("session {session_id} named \"{name}\""),
        None => println!("session {session_id} name cleared"),
    }
    Ok(())
}
