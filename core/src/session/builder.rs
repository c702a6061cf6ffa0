//! Log-level state machine: BEGIN_LOG/END_LOG lifecycle, session-scoped
//! dictionaries, zones, unit lifetimes, trials, and dispatch into the
//! active fight builder.

use chrono::{Local, TimeZone};
use hashbrown::HashSet;
use uuid::Uuid;

use crate::combat_log::{frame_line, parse_event, Event, PlayerLoadout, UnitAdded, UnitChanged};
use crate::fight::{CompletedFight, FightBuilder, FinishContext};
use crate::game_data::{self, UnitType};
use crate::session::info::{
    AbilityDef, EffectDef, MapChange, PlayerInfoSnapshot, SessionDetail, TrialRun, UnitInfo,
    ZoneSegment,
};

/// Knobs for one ingest run.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Keep the per-event damage/heal sample list on each fight. Costs
    /// memory and blob size; enables filtered series projections.
    pub keep_samples: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { keep_samples: true }
    }
}

/// A finalised session and its fights, ready for the store writer.
#[derive(Debug, Clone)]
pub struct CompletedSession {
    pub detail: SessionDetail,
    pub fights: Vec<CompletedFight>,
}

struct ActiveSession {
    detail: SessionDetail,
    hard_mode_markers: HashSet<i64>,
    fight: Option<FightBuilder>,
    fights: Vec<CompletedFight>,
    open_trial: Option<TrialRun>,
}

/// Streaming builder over one log's records, in file order.
#[derive(Default)]
pub struct SessionBuilder {
    options: IngestOptions,
    completed: Vec<CompletedSession>,
    current: Option<ActiveSession>,
}

impl SessionBuilder {
    pub fn new(options: IngestOptions) -> Self {
        Self {
            options,
            completed: Vec::new(),
            current: None,
        }
    }

    /// Feed one raw line. Unframeable or malformed lines are skipped.
    pub fn process_line(&mut self, line: &str) {
        let Some(frame) = frame_line(line) else {
            return;
        };
        let Some(event) = parse_event(frame.kind, frame.rest) else {
            return;
        };
        self.apply(frame.rel_ms, event);
    }

    fn apply(&mut self, rel_ms: i64, event: Event) {
        match event {
            Event::BeginLog {
                unix_start_ms,
                server,
                language,
                patch,
            } => {
                if self.current.is_some() {
                    // Defensive recovery: a second BEGIN_LOG closes the
                    // session in flight before opening the next one.
                    tracing::warn!("[SESSION] BEGIN_LOG while a session is open, finalising");
                    self.finalize_current();
                }
                self.current = Some(ActiveSession {
                    detail: SessionDetail {
                        id: Uuid::new_v4().to_string(),
                        title: session_title(unix_start_ms),
                        unix_start_ms,
                        server,
                        language,
                        patch,
                        ..SessionDetail::default()
                    },
                    hard_mode_markers: HashSet::new(),
                    fight: None,
                    fights: Vec::new(),
                    open_trial: None,
                });
            }
            Event::EndLog => {
                if let Some(session) = self.current.as_mut() {
                    if rel_ms > session.detail.end_rel_ms {
                        session.detail.end_rel_ms = rel_ms;
                    }
                }
                self.finalize_current();
            }
            other => self.apply_in_session(rel_ms, other),
        }
    }

    fn apply_in_session(&mut self, rel_ms: i64, event: Event) {
        // Records outside a session have nothing to attach to.
        let Some(session) = self.current.as_mut() else {
            return;
        };
        if rel_ms > session.detail.end_rel_ms {
            session.detail.end_rel_ms = rel_ms;
        }

        match event {
            Event::BeginLog { .. } | Event::EndLog => unreachable!("handled by the caller"),
            Event::ZoneChanged {
                zone_id,
                name,
                difficulty,
            } => {
                if let Some(prev) = session.detail.zones.last_mut() {
                    if prev.end_rel_ms.is_none() {
                        prev.end_rel_ms = Some(rel_ms);
                    }
                }
                let id = session.detail.zones.len() as i64;
                session.detail.zones.push(ZoneSegment {
                    id,
                    start_rel_ms: rel_ms,
                    end_rel_ms: None,
                    zone_id,
                    zone_name: name,
                    difficulty,
                    maps: Vec::new(),
                });
            }
            Event::MapChanged { map_id, name, key } => {
                if session.detail.zones.is_empty() {
                    // Map before any zone: synthesise a zero zone that
                    // borrows the map's name.
                    session.detail.zones.push(ZoneSegment {
                        id: 0,
                        start_rel_ms: rel_ms,
                        end_rel_ms: None,
                        zone_id: 0,
                        zone_name: name.clone(),
                        difficulty: String::new(),
                        maps: Vec::new(),
                    });
                }
                if let Some(zone) = session.detail.zones.last_mut() {
                    zone.maps.push(MapChange {
                        rel_ms,
                        map_id,
                        name,
                        key,
                    });
                }
            }
            Event::UnitAdded(added) => handle_unit_added(&mut session.detail, rel_ms, added),
            Event::UnitChanged(changed) => {
                handle_unit_changed(&mut session.detail, rel_ms, changed)
            }
            Event::UnitRemoved { unit_id } => {
                if let Some(unit) = active_unit_mut(&mut session.detail, unit_id) {
                    unit.is_active = false;
                    unit.last_seen_rel_ms = rel_ms;
                }
            }
            Event::AbilityInfo {
                ability_id,
                name,
                icon,
                is_passive,
                is_player,
            } => {
                if game_data::is_hard_mode_ability_name(&name) {
                    session.hard_mode_markers.insert(ability_id);
                }
                session.detail.abilities.insert(
                    ability_id,
                    AbilityDef {
                        ability_id,
                        name,
                        icon,
                        is_passive,
                        is_player,
                    },
                );
            }
            Event::EffectInfo {
                ability_id,
                kind,
                damage_type,
                duration_type,
                linked_ability_id,
            } => {
                session.detail.effects.insert(
                    ability_id,
                    EffectDef {
                        ability_id,
                        kind,
                        damage_type,
                        duration_type,
                        linked_ability_id,
                    },
                );
            }
            Event::PlayerInfo(loadout) => {
                session
                    .detail
                    .player_infos
                    .push(snapshot_from(rel_ms, loadout));
            }
            Event::BeginCombat => {
                if session.fight.is_some() {
                    // Nested BEGIN_COMBAT is ignored, the open fight wins.
                    tracing::debug!("[FIGHT] BEGIN_COMBAT while in combat, ignoring");
                } else {
                    session.fight = Some(FightBuilder::new(rel_ms, self.options.keep_samples));
                }
            }
            Event::EndCombat => {
                if let Some(builder) = session.fight.take() {
                    let fight = builder.finish(FinishContext {
                        session: &session.detail,
                        zone: session.detail.zones.last(),
                        fight_id: Uuid::new_v4().to_string(),
                        ordinal: session.fights.len(),
                        end_rel_ms: rel_ms,
                    });
                    session.fights.push(fight);
                }
            }
            Event::Combat(rec) => {
                if let Some(fight) = session.fight.as_mut() {
                    fight.handle_combat(rel_ms, &rec);
                }
            }
            Event::EffectChanged(change) => {
                if let Some(fight) = session.fight.as_mut() {
                    fight.handle_effect_changed(rel_ms, &change, &session.hard_mode_markers);
                }
            }
            Event::BeginCast(cast) => {
                if let Some(fight) = session.fight.as_mut() {
                    fight.handle_begin_cast(rel_ms, &cast);
                }
            }
            Event::EndCast(cast) => {
                if let Some(fight) = session.fight.as_mut() {
                    fight.handle_end_cast(rel_ms, &cast);
                }
            }
            Event::HealthRegen(regen) => {
                if let Some(fight) = session.fight.as_mut() {
                    fight.handle_health_regen(rel_ms, &regen);
                }
            }
            Event::TrialInit { key, .. } => {
                session.detail.trial_init_key = Some(key);
            }
            Event::BeginTrial {
                key,
                unix_start_ms,
                fields,
            } => {
                let start_unix_ms = if unix_start_ms > 0 {
                    unix_start_ms
                } else {
                    session.detail.unix_start_ms + rel_ms
                };
                session.open_trial = Some(TrialRun {
                    trial_key: key,
                    start_rel_ms: rel_ms,
                    start_unix_ms,
                    begin_fields: fields,
                    ..TrialRun::default()
                });
            }
            Event::EndTrial {
                key,
                duration_ms,
                success,
                final_score,
                vitality,
                fields,
            } => {
                // Missing BEGIN_TRIAL: fabricate a draft anchored at the
                // END record itself.
                let mut run = session.open_trial.take().unwrap_or_else(|| TrialRun {
                    trial_key: key,
                    start_rel_ms: rel_ms,
                    start_unix_ms: session.detail.unix_start_ms + rel_ms,
                    ..TrialRun::default()
                });
                run.end_rel_ms = Some(rel_ms);
                run.end_unix_ms = Some(session.detail.unix_start_ms + rel_ms);
                run.duration_ms = if duration_ms > 0 {
                    duration_ms
                } else {
                    (rel_ms - run.start_rel_ms).max(0)
                };
                run.success = success;
                run.final_score = final_score;
                run.vitality = vitality;
                run.end_fields = fields;
                session.detail.trials.push(run);
            }
            Event::Unhandled { kind } => {
                *session
                    .detail
                    .unhandled_counts
                    .entry(kind.clone())
                    .or_insert(0) += 1;
                if let Some(fight) = session.fight.as_mut() {
                    fight.count_unhandled(&kind);
                }
            }
        }
    }

    /// Finalise whatever is open and return every completed session.
    /// Premature end-of-file closes the session (and fight) at the last
    /// seen relative time.
    pub fn finish(mut self) -> Vec<CompletedSession> {
        self.finalize_current();
        self.completed
    }

    fn finalize_current(&mut self) {
        let Some(mut session) = self.current.take() else {
            return;
        };

        if let Some(builder) = session.fight.take() {
            let end_rel_ms = builder.last_rel_ms();
            let fight = builder.finish(FinishContext {
                session: &session.detail,
                zone: session.detail.zones.last(),
                fight_id: Uuid::new_v4().to_string(),
                ordinal: session.fights.len(),
                end_rel_ms,
            });
            session.fights.push(fight);
        }

        let end_rel_ms = session.detail.end_rel_ms;
        if let Some(zone) = session.detail.zones.last_mut() {
            if zone.end_rel_ms.is_none() {
                zone.end_rel_ms = Some(end_rel_ms);
            }
        }
        for unit in session.detail.units.iter_mut().filter(|u| u.is_active) {
            unit.last_seen_rel_ms = end_rel_ms.max(unit.first_seen_rel_ms);
        }
        if let Some(run) = session.open_trial.take() {
            session.detail.trials.push(run);
        }

        tracing::info!(
            "[SESSION] finalised {}: {} fights, {} units, {} zones",
            session.detail.id,
            session.fights.len(),
            session.detail.units.len(),
            session.detail.zones.len()
        );

        self.completed.push(CompletedSession {
            detail: session.detail,
            fights: session.fights,
        });
    }
}

fn session_title(unix_start_ms: i64) -> String {
    Local
        .timestamp_millis_opt(unix_start_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Session".to_string())
}

fn active_unit_mut(detail: &mut SessionDetail, unit_id: i64) -> Option<&mut UnitInfo> {
    detail
        .units
        .iter_mut()
        .rev()
        .find(|u| u.unit_id == unit_id && u.is_active)
}

fn handle_unit_added(detail: &mut SessionDetail, rel_ms: i64, added: UnitAdded) {
    // Id reuse: close the previous lifetime before appending a new one.
    if let Some(prev) = active_unit_mut(detail, added.unit_id) {
        prev.is_active = false;
        prev.last_seen_rel_ms = rel_ms;
    }
    detail.units.push(UnitInfo {
        unit_id: added.unit_id,
        unit_type: UnitType::parse(&added.unit_type),
        is_local: added.is_local,
        group_index: added.group_index,
        monster_id: added.monster_id,
        is_boss: added.is_boss,
        class_id: added.class_id,
        race_id: added.race_id,
        name: added.name,
        account: added.account,
        character_id: added.character_id,
        level: added.level,
        champion_points: added.champion_points,
        disposition: added.disposition,
        is_grouped: added.is_grouped,
        is_active: true,
        first_seen_rel_ms: rel_ms,
        last_seen_rel_ms: rel_ms,
    });
}

fn handle_unit_changed(detail: &mut SessionDetail, rel_ms: i64, changed: UnitChanged) {
    match active_unit_mut(detail, changed.unit_id) {
        Some(unit) => {
            // Mutate in place; first_seen_rel_ms is preserved.
            unit.class_id = changed.class_id.or(unit.class_id);
            unit.race_id = changed.race_id.or(unit.race_id);
            if !changed.name.is_empty() {
                unit.name = changed.name;
            }
            if !changed.account.is_empty() {
                unit.account = changed.account;
            }
            if changed.character_id != 0 {
                unit.character_id = changed.character_id;
            }
            unit.level = changed.level;
            unit.champion_points = changed.champion_points;
            unit.disposition = changed.disposition;
            unit.is_grouped = changed.is_grouped;
            unit.last_seen_rel_ms = rel_ms;
        }
        // CHANGED for an id we never saw added: open a lifetime for it.
        None => detail.units.push(UnitInfo {
            unit_id: changed.unit_id,
            unit_type: UnitType::Unknown,
            class_id: changed.class_id,
            race_id: changed.race_id,
            name: changed.name,
            account: changed.account,
            character_id: changed.character_id,
            level: changed.level,
            champion_points: changed.champion_points,
            disposition: changed.disposition,
            is_grouped: changed.is_grouped,
            is_active: true,
            first_seen_rel_ms: rel_ms,
            last_seen_rel_ms: rel_ms,
            ..UnitInfo::default()
        }),
    }
}

fn snapshot_from(rel_ms: i64, loadout: PlayerLoadout) -> PlayerInfoSnapshot {
    PlayerInfoSnapshot {
        rel_ms,
        unit_id: loadout.unit_id,
        passives: loadout.passives,
        passive_ranks: loadout.passive_ranks,
        gear: loadout.gear,
        front_bar: loadout.front_bar,
        back_bar: loadout.back_bar,
    }
}
