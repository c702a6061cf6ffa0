//! Combat-level state machine: bounded in-memory aggregation for one
//! BEGIN_COMBAT..END_COMBAT interval.
//!
//! The builder consumes forwarded records while the fight is open and
//! materialises a [`FightSummary`], dense series and [`FightDetail`] at
//! END_COMBAT. Nothing is written to the store mid-fight; a parse failure
//! inside a fight therefore rolls back for free.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};

use crate::combat_log::{
    CastBegin, CastEnd, CombatRecord, EffectChange, EffectChangeKind, HealthRegen, UnitFrame,
};
use crate::game_data::{self, ResourceKind};
use crate::session::info::{SessionDetail, ZoneSegment};

use super::detail::{
    CastEntry, CombatAgg, CombatSample, DeathEvent, EffectChangedEvent, EffectUptime, FightDetail,
    FightSeriesPoint, FightSummary, HealthRegenEvent, ResourceEvent, ResourceSnapshot, UnitTotals,
    CAST_RESULT_OPEN,
};

/// A finished fight: summary row, dense series, full detail.
#[derive(Debug, Clone)]
pub struct CompletedFight {
    pub summary: FightSummary,
    pub series: Vec<FightSeriesPoint>,
    pub detail: FightDetail,
}

/// Context the session builder supplies when a fight closes.
pub struct FinishContext<'a> {
    pub session: &'a SessionDetail,
    pub zone: Option<&'a ZoneSegment>,
    pub fight_id: String,
    /// Zero-based fight ordinal within the session.
    pub ordinal: usize,
    pub end_rel_ms: i64,
}

#[derive(Debug, Default)]
struct AggAcc {
    total: i64,
    hits: u32,
    crits: u32,
    overheal: i64,
    active_seconds: u32,
    last_second: i64,
}

impl AggAcc {
    fn add(&mut self, amount: i64, is_crit: bool, overheal: i64, second: i64) {
        self.total += amount;
        self.hits += 1;
        if is_crit {
            self.crits += 1;
        }
        self.overheal += overheal;
        if self.hits == 1 || second != self.last_second {
            self.active_seconds += 1;
            self.last_second = second;
        }
    }
}

#[derive(Debug, Default)]
struct OpenEffect {
    open_since: Option<i64>,
    total_ms: i64,
    applications: u32,
}

#[derive(Debug)]
struct OpenCast {
    caster_unit_id: i64,
    start_rel_ms: i64,
}

#[derive(Debug)]
pub struct FightBuilder {
    start_rel_ms: i64,
    last_rel_ms: i64,
    is_hard_mode: bool,
    keep_samples: bool,

    units_seen: HashSet<i64>,
    damage_per_second: BTreeMap<i64, i64>,
    heal_per_second: BTreeMap<i64, i64>,
    damage_aggs: HashMap<(i64, i64, i64), AggAcc>,
    heal_aggs: HashMap<(i64, i64, i64), AggAcc>,
    totals: HashMap<i64, UnitTotals>,
    damage_done_by_ability: HashMap<i64, HashMap<i64, i64>>,
    damage_taken_by_ability: HashMap<i64, HashMap<i64, i64>>,
    healing_done_by_ability: HashMap<i64, HashMap<i64, i64>>,
    healing_taken_by_ability: HashMap<i64, HashMap<i64, i64>>,
    resource_gained_by_ability: HashMap<i64, HashMap<i64, i64>>,
    resource_samples: HashMap<i64, BTreeMap<i64, ResourceSnapshot>>,
    resource_events: Vec<ResourceEvent>,
    open_effects: HashMap<(i64, i64), OpenEffect>,
    open_casts: HashMap<(i64, i64), OpenCast>,
    casts: Vec<CastEntry>,
    deaths: Vec<DeathEvent>,
    effect_changes: Vec<EffectChangedEvent>,
    health_regens: Vec<HealthRegenEvent>,
    samples: Vec<CombatSample>,
    unhandled_counts: std::collections::HashMap<String, u64>,
}

impl FightBuilder {
    pub fn new(start_rel_ms: i64, keep_samples: bool) -> Self {
        Self {
            start_rel_ms,
            last_rel_ms: start_rel_ms,
            is_hard_mode: false,
            keep_samples,
            units_seen: HashSet::new(),
            damage_per_second: BTreeMap::new(),
            heal_per_second: BTreeMap::new(),
            damage_aggs: HashMap::new(),
            heal_aggs: HashMap::new(),
            totals: HashMap::new(),
            damage_done_by_ability: HashMap::new(),
            damage_taken_by_ability: HashMap::new(),
            healing_done_by_ability: HashMap::new(),
            healing_taken_by_ability: HashMap::new(),
            resource_gained_by_ability: HashMap::new(),
            resource_samples: HashMap::new(),
            resource_events: Vec::new(),
            open_effects: HashMap::new(),
            open_casts: HashMap::new(),
            casts: Vec::new(),
            deaths: Vec::new(),
            effect_changes: Vec::new(),
            health_regens: Vec::new(),
            samples: Vec::new(),
            unhandled_counts: std::collections::HashMap::new(),
        }
    }

    pub fn start_rel_ms(&self) -> i64 {
        self.start_rel_ms
    }

    pub fn last_rel_ms(&self) -> i64 {
        self.last_rel_ms
    }

    fn second_of(&self, rel_ms: i64) -> i64 {
        (rel_ms - self.start_rel_ms).max(0) / 1000
    }

    fn touch(&mut self, rel_ms: i64) {
        if rel_ms > self.last_rel_ms {
            self.last_rel_ms = rel_ms;
        }
    }

    fn see_unit(&mut self, unit_id: i64) {
        if unit_id > 0 {
            self.units_seen.insert(unit_id);
        }
    }

    fn record_sample(&mut self, unit_id: i64, second: i64, frame: &UnitFrame) {
        if unit_id <= 0 {
            return;
        }
        self.resource_samples.entry(unit_id).or_default().insert(
            second,
            ResourceSnapshot {
                second,
                health: frame.health,
                magicka: frame.magicka,
                stamina: frame.stamina,
                ultimate: frame.ultimate,
            },
        );
    }

    pub fn count_unhandled(&mut self, kind: &str) {
        *self.unhandled_counts.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn handle_combat(&mut self, rel_ms: i64, rec: &CombatRecord) {
        self.touch(rel_ms);
        let second = self.second_of(rel_ms);
        let src = rec.source_unit_id;
        let tgt = rec.target_unit_id.unwrap_or(0);
        self.see_unit(src);
        self.see_unit(tgt);

        if let Some(frame) = &rec.source {
            self.record_sample(src, second, frame);
        }
        if let Some(frame) = &rec.target {
            self.record_sample(tgt, second, frame);
        }

        let result_upper = rec.result.to_ascii_uppercase();
        let is_crit = result_upper.contains("CRITICAL");

        // ENERGIZE/DRAIN reuse the damage column for the amount; they are
        // resource changes, not damage.
        let is_energize = result_upper.contains("ENERGIZE");
        let is_drain = result_upper.contains("DRAIN");
        let is_resource = (is_energize || is_drain) && rec.damage != 0;

        if rec.damage > 0 && !is_resource {
            *self.damage_per_second.entry(second).or_insert(0) += rec.damage;
            *self
                .damage_done_by_ability
                .entry(src)
                .or_default()
                .entry(rec.ability_id)
                .or_insert(0) += rec.damage;
            self.totals.entry(src).or_default().damage_done += rec.damage;
            if rec.target_unit_id.is_some() {
                *self
                    .damage_taken_by_ability
                    .entry(tgt)
                    .or_default()
                    .entry(rec.ability_id)
                    .or_insert(0) += rec.damage;
                self.totals.entry(tgt).or_default().damage_taken += rec.damage;
            }
            self.damage_aggs
                .entry((src, tgt, rec.ability_id))
                .or_default()
                .add(rec.damage, is_crit, 0, second);
        }

        let mut overheal = 0;
        if rec.heal > 0 {
            overheal = rec
                .target
                .as_ref()
                .map(|frame| {
                    let missing = (frame.health.max - frame.health.cur).max(0);
                    (rec.heal - missing).max(0)
                })
                .unwrap_or(0);
            *self.heal_per_second.entry(second).or_insert(0) += rec.heal;
            *self
                .healing_done_by_ability
                .entry(src)
                .or_default()
                .entry(rec.ability_id)
                .or_insert(0) += rec.heal;
            self.totals.entry(src).or_default().healing_done += rec.heal;
            if rec.target_unit_id.is_some() {
                *self
                    .healing_taken_by_ability
                    .entry(tgt)
                    .or_default()
                    .entry(rec.ability_id)
                    .or_insert(0) += rec.heal;
                self.totals.entry(tgt).or_default().healing_taken += rec.heal;
            }
            self.heal_aggs
                .entry((src, tgt, rec.ability_id))
                .or_default()
                .add(rec.heal, is_crit, overheal, second);
        }

        if is_resource {
            let amount = if is_drain {
                -rec.damage.abs()
            } else {
                rec.damage.abs()
            };
            let receiver = rec.target_unit_id.unwrap_or(src);
            self.resource_events.push(ResourceEvent {
                rel_ms,
                unit_id: receiver,
                ability_id: rec.ability_id,
                kind: ResourceKind::from_power_type(rec.power_type),
                amount,
            });
            if amount > 0 {
                *self
                    .resource_gained_by_ability
                    .entry(receiver)
                    .or_default()
                    .entry(rec.ability_id)
                    .or_insert(0) += amount;
                self.totals.entry(receiver).or_default().resource_gained += amount;
            }
        }

        if result_upper == "KILLING_BLOW" {
            if let Some(victim) = rec.target_unit_id {
                self.deaths.push(DeathEvent {
                    rel_ms,
                    victim_unit_id: victim,
                    killer_unit_id: (src > 0).then_some(src),
                    ability_id: rec.ability_id,
                });
                self.totals.entry(victim).or_default().deaths += 1;
            }
        } else if (result_upper == "DIED" || result_upper == "UNIT_DIED") && src > 0 {
            self.deaths.push(DeathEvent {
                rel_ms,
                victim_unit_id: src,
                killer_unit_id: None,
                ability_id: rec.ability_id,
            });
            self.totals.entry(src).or_default().deaths += 1;
        }

        if self.keep_samples && !is_resource && (rec.damage > 0 || rec.heal > 0) {
            self.samples.push(CombatSample {
                rel_ms,
                source_unit_id: src,
                target_unit_id: tgt,
                ability_id: rec.ability_id,
                damage: rec.damage.max(0),
                heal: rec.heal.max(0),
                overheal,
                is_crit,
                result: rec.result.clone(),
            });
        }
    }

    /// Apply an EFFECT_CHANGED record. `hard_mode_markers` is the session's
    /// set of ability ids whose names read like hard-mode markers.
    pub fn handle_effect_changed(
        &mut self,
        rel_ms: i64,
        change: &EffectChange,
        hard_mode_markers: &HashSet<i64>,
    ) {
        self.touch(rel_ms);
        self.see_unit(change.target_unit_id);

        let key = (change.target_unit_id, change.ability_id);
        match change.change {
            EffectChangeKind::Gained | EffectChangeKind::Updated => {
                let entry = self.open_effects.entry(key).or_default();
                if entry.open_since.is_none() {
                    entry.open_since = Some(rel_ms);
                }
                entry.applications += 1;
                if hard_mode_markers.contains(&change.ability_id) {
                    self.is_hard_mode = true;
                }
            }
            EffectChangeKind::Faded => {
                if let Some(entry) = self.open_effects.get_mut(&key) {
                    if let Some(since) = entry.open_since.take() {
                        entry.total_ms += (rel_ms - since).max(0);
                    }
                }
            }
        }

        self.effect_changes.push(EffectChangedEvent {
            rel_ms,
            change: change.change,
            effect_slot: change.effect_slot,
            effect_instance_id: change.effect_instance_id,
            ability_id: change.ability_id,
            target_unit_id: change.target_unit_id,
        });
    }

    pub fn handle_begin_cast(&mut self, rel_ms: i64, cast: &CastBegin) {
        self.touch(rel_ms);
        self.see_unit(cast.caster_unit_id);
        if let Some(frame) = &cast.frame {
            let second = self.second_of(rel_ms);
            self.record_sample(cast.caster_unit_id, second, frame);
        }
        self.open_casts.insert(
            (cast.cast_instance_id, cast.ability_id),
            OpenCast {
                caster_unit_id: cast.caster_unit_id,
                start_rel_ms: rel_ms,
            },
        );
    }

    pub fn handle_end_cast(&mut self, rel_ms: i64, cast: &CastEnd) {
        self.touch(rel_ms);
        match self
            .open_casts
            .remove(&(cast.cast_instance_id, cast.ability_id))
        {
            Some(open) => {
                self.casts.push(CastEntry {
                    cast_instance_id: cast.cast_instance_id,
                    ability_id: cast.ability_id,
                    caster_unit_id: open.caster_unit_id,
                    start_rel_ms: open.start_rel_ms,
                    end_rel_ms: Some(rel_ms),
                    result: cast.result.clone(),
                });
                if open.caster_unit_id > 0 {
                    self.totals.entry(open.caster_unit_id).or_default().casts += 1;
                }
            }
            // Orphan END: the BEGIN predates the fight (or was lost).
            // Record it against the sentinel caster, count nothing.
            None => self.casts.push(CastEntry {
                cast_instance_id: cast.cast_instance_id,
                ability_id: cast.ability_id,
                caster_unit_id: 0,
                start_rel_ms: rel_ms,
                end_rel_ms: Some(rel_ms),
                result: cast.result.clone(),
            }),
        }
    }

    pub fn handle_health_regen(&mut self, rel_ms: i64, regen: &HealthRegen) {
        self.touch(rel_ms);
        self.see_unit(regen.unit_id);
        if let Some(frame) = &regen.frame {
            let second = self.second_of(rel_ms);
            self.record_sample(regen.unit_id, second, frame);
        }
        self.health_regens.push(HealthRegenEvent {
            rel_ms,
            unit_id: regen.unit_id,
            regen: regen.regen,
            raw: regen.raw.clone(),
        });
    }

    /// Close the fight and materialise its records.
    pub fn finish(mut self, ctx: FinishContext<'_>) -> CompletedFight {
        let end_rel_ms = ctx.end_rel_ms.max(self.start_rel_ms);

        // Close still-open effect intervals at fight end.
        for entry in self.open_effects.values_mut() {
            if let Some(since) = entry.open_since.take() {
                entry.total_ms += (end_rel_ms - since).max(0);
            }
        }

        // Close still-open casts; they keep no end time.
        let mut open_casts: Vec<_> = self.open_casts.drain().collect();
        open_casts.sort_by_key(|((instance, ability), _)| (*instance, *ability));
        for ((cast_instance_id, ability_id), open) in open_casts {
            self.casts.push(CastEntry {
                cast_instance_id,
                ability_id,
                caster_unit_id: open.caster_unit_id,
                start_rel_ms: open.start_rel_ms,
                end_rel_ms: None,
                result: CAST_RESULT_OPEN.to_string(),
            });
        }

        let mut unit_ids: Vec<i64> = self.units_seen.iter().copied().collect();
        unit_ids.sort_unstable();

        let mut friendly_unit_ids = Vec::new();
        let mut enemy_unit_ids = Vec::new();
        let mut boss_unit_ids = Vec::new();
        let mut boss_names: Vec<String> = Vec::new();
        for &unit_id in &unit_ids {
            let Some(unit) = ctx.session.unit_at(unit_id, end_rel_ms) else {
                continue;
            };
            let hostile = game_data::is_hostile_disposition(&unit.disposition);
            if unit.unit_type == game_data::UnitType::Player
                || game_data::is_friendly_disposition(&unit.disposition)
            {
                friendly_unit_ids.push(unit_id);
            }
            if hostile {
                enemy_unit_ids.push(unit_id);
                if unit.is_boss {
                    boss_unit_ids.push(unit_id);
                    if !boss_names.contains(&unit.name) {
                        boss_names.push(unit.name.clone());
                    }
                }
            }
        }

        let title = if boss_names.is_empty() {
            format!("Fight {}", ctx.ordinal + 1)
        } else {
            boss_names.join(" + ")
        };

        let max_second = self
            .damage_per_second
            .keys()
            .chain(self.heal_per_second.keys())
            .copied()
            .max()
            .unwrap_or(0)
            .max((end_rel_ms - self.start_rel_ms).max(0) / 1000);
        let series: Vec<FightSeriesPoint> = (0..=max_second)
            .map(|second| FightSeriesPoint {
                second,
                damage: self.damage_per_second.get(&second).copied().unwrap_or(0),
                heal: self.heal_per_second.get(&second).copied().unwrap_or(0),
            })
            .collect();

        let (map_name, map_key) = ctx
            .zone
            .and_then(|z| z.maps.last())
            .map(|m| (Some(m.name.clone()), Some(m.key.clone())))
            .unwrap_or((None, None));

        let summary = FightSummary {
            id: ctx.fight_id.clone(),
            session_id: ctx.session.id.clone(),
            zone_segment_id: ctx.zone.map(|z| z.id).unwrap_or(0),
            start_rel_ms: self.start_rel_ms,
            end_rel_ms,
            title,
            zone_name: ctx.zone.map(|z| z.zone_name.clone()).unwrap_or_default(),
            difficulty: ctx.zone.map(|z| z.difficulty.clone()).unwrap_or_default(),
            map_name,
            map_key,
            is_hard_mode: self.is_hard_mode,
            boss_unit_ids,
            boss_names,
        };

        let mut effect_uptimes: Vec<EffectUptime> = self
            .open_effects
            .into_iter()
            .map(|((target_unit_id, ability_id), e)| EffectUptime {
                target_unit_id,
                ability_id,
                total_ms: e.total_ms,
                applications: e.applications,
            })
            .collect();
        effect_uptimes.sort_by_key(|u| (u.target_unit_id, u.ability_id));

        let detail = FightDetail {
            fight_id: ctx.fight_id,
            friendly_unit_ids,
            enemy_unit_ids,
            totals: self.totals.into_iter().collect(),
            damage_done_by_ability: into_nested(self.damage_done_by_ability),
            damage_taken_by_ability: into_nested(self.damage_taken_by_ability),
            healing_done_by_ability: into_nested(self.healing_done_by_ability),
            healing_taken_by_ability: into_nested(self.healing_taken_by_ability),
            resource_gained_by_ability: into_nested(self.resource_gained_by_ability),
            resource_samples: self
                .resource_samples
                .into_iter()
                .map(|(unit_id, by_second)| (unit_id, by_second.into_values().collect()))
                .collect(),
            resource_events: self.resource_events,
            effect_uptimes,
            casts: self.casts,
            deaths: self.deaths,
            unhandled_counts: self.unhandled_counts,
            effect_changes: self.effect_changes,
            health_regens: self.health_regens,
            damage_aggs: into_aggs(self.damage_aggs),
            heal_aggs: into_aggs(self.heal_aggs),
            samples: self.samples,
        };

        CompletedFight {
            summary,
            series,
            detail,
        }
    }
}

fn into_nested(
    map: HashMap<i64, HashMap<i64, i64>>,
) -> std::collections::HashMap<i64, std::collections::HashMap<i64, i64>> {
    map.into_iter()
        .map(|(unit, by_ability)| (unit, by_ability.into_iter().collect()))
        .collect()
}

fn into_aggs(map: HashMap<(i64, i64, i64), AggAcc>) -> Vec<CombatAgg> {
    let mut aggs: Vec<CombatAgg> = map
        .into_iter()
        .map(|((source_unit_id, target_unit_id, ability_id), acc)| CombatAgg {
            source_unit_id,
            target_unit_id,
            ability_id,
            total: acc.total,
            hits: acc.hits,
            crits: acc.crits,
            active_seconds: acc.active_seconds,
            overheal: acc.overheal,
        })
        .collect();
    aggs.sort_by_key(|a| (a.source_unit_id, a.target_unit_id, a.ability_id));
    aggs
}
