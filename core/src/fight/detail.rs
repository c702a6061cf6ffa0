//! Per-fight records materialised at END_COMBAT.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::combat_log::{EffectChangeKind, Pool};
use crate::game_data::ResourceKind;

/// Summary row for one BEGIN_COMBAT..END_COMBAT interval.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FightSummary {
    pub id: String,
    pub session_id: String,
    pub zone_segment_id: i64,
    pub start_rel_ms: i64,
    pub end_rel_ms: i64,
    pub title: String,
    #[serde(default)]
    pub zone_name: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub map_name: Option<String>,
    #[serde(default)]
    pub map_key: Option<String>,
    #[serde(default)]
    pub is_hard_mode: bool,
    #[serde(default)]
    pub boss_unit_ids: Vec<i64>,
    #[serde(default)]
    pub boss_names: Vec<String>,
}

/// One second of the dense fight timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightSeriesPoint {
    pub second: i64,
    pub damage: i64,
    pub heal: i64,
}

/// Accumulator keyed by `(source, target, ability)`.
///
/// `active_seconds` counts distinct integer seconds with at least one
/// contributing event for the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatAgg {
    pub source_unit_id: i64,
    pub target_unit_id: i64,
    pub ability_id: i64,
    pub total: i64,
    pub hits: u32,
    pub crits: u32,
    pub active_seconds: u32,
    #[serde(default)]
    pub overheal: i64,
}

/// Per-unit lifetime totals within one fight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitTotals {
    pub damage_done: i64,
    pub damage_taken: i64,
    pub healing_done: i64,
    pub healing_taken: i64,
    pub resource_gained: i64,
    pub deaths: u32,
    pub casts: u32,
}

/// Per-second pool snapshot for one unit. At most one per second; a later
/// event in the same second replaces the earlier snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub second: i64,
    pub health: Pool,
    pub magicka: Pool,
    pub stamina: Pool,
    pub ultimate: Pool,
}

/// A signed resource change (positive ENERGIZE, negative DRAIN).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub rel_ms: i64,
    pub unit_id: i64,
    pub ability_id: i64,
    pub kind: ResourceKind,
    pub amount: i64,
}

/// Effect uptime for one `(target, ability)` pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectUptime {
    pub target_unit_id: i64,
    pub ability_id: i64,
    pub total_ms: i64,
    pub applications: u32,
}

/// A closed (or force-closed) cast.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CastEntry {
    pub cast_instance_id: i64,
    pub ability_id: i64,
    /// 0 when the END arrived with no matching BEGIN.
    pub caster_unit_id: i64,
    pub start_rel_ms: i64,
    #[serde(default)]
    pub end_rel_ms: Option<i64>,
    pub result: String,
}

/// Result recorded on casts still open when the fight ends.
pub const CAST_RESULT_OPEN: &str = "OPEN";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathEvent {
    pub rel_ms: i64,
    pub victim_unit_id: i64,
    #[serde(default)]
    pub killer_unit_id: Option<i64>,
    pub ability_id: i64,
}

/// One raw EFFECT_CHANGED occurrence kept for replay/inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectChangedEvent {
    pub rel_ms: i64,
    pub change: EffectChangeKind,
    pub effect_slot: i64,
    pub effect_instance_id: i64,
    pub ability_id: i64,
    pub target_unit_id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthRegenEvent {
    pub rel_ms: i64,
    pub unit_id: i64,
    pub regen: i64,
    #[serde(default)]
    pub raw: Vec<String>,
}

/// One contributing damage/heal event, kept when sample retention is on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatSample {
    pub rel_ms: i64,
    pub source_unit_id: i64,
    /// 0 when the event had no target.
    pub target_unit_id: i64,
    pub ability_id: i64,
    pub damage: i64,
    pub heal: i64,
    #[serde(default)]
    pub overheal: i64,
    pub is_crit: bool,
    pub result: String,
}

/// Everything aggregated for one fight, built fully in memory and
/// serialised as a single blob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FightDetail {
    pub fight_id: String,
    #[serde(default)]
    pub friendly_unit_ids: Vec<i64>,
    #[serde(default)]
    pub enemy_unit_ids: Vec<i64>,
    #[serde(default)]
    pub totals: HashMap<i64, UnitTotals>,
    #[serde(default)]
    pub damage_done_by_ability: HashMap<i64, HashMap<i64, i64>>,
    #[serde(default)]
    pub damage_taken_by_ability: HashMap<i64, HashMap<i64, i64>>,
    #[serde(default)]
    pub healing_done_by_ability: HashMap<i64, HashMap<i64, i64>>,
    #[serde(default)]
    pub healing_taken_by_ability: HashMap<i64, HashMap<i64, i64>>,
    #[serde(default)]
    pub resource_gained_by_ability: HashMap<i64, HashMap<i64, i64>>,
    #[serde(default)]
    pub resource_samples: HashMap<i64, Vec<ResourceSnapshot>>,
    #[serde(default)]
    pub resource_events: Vec<ResourceEvent>,
    #[serde(default)]
    pub effect_uptimes: Vec<EffectUptime>,
    #[serde(default)]
    pub casts: Vec<CastEntry>,
    #[serde(default)]
    pub deaths: Vec<DeathEvent>,
    #[serde(default)]
    pub unhandled_counts: HashMap<String, u64>,
    #[serde(default)]
    pub effect_changes: Vec<EffectChangedEvent>,
    #[serde(default)]
    pub health_regens: Vec<HealthRegenEvent>,
    #[serde(default)]
    pub damage_aggs: Vec<CombatAgg>,
    #[serde(default)]
    pub heal_aggs: Vec<CombatAgg>,
    #[serde(default)]
    pub samples: Vec<CombatSample>,
}

impl FightDetail {
    pub fn uptime_for(&self, target_unit_id: i64, ability_id: i64) -> Option<&EffectUptime> {
        self.effect_uptimes
            .iter()
            .find(|u| u.target_unit_id == target_unit_id && u.ability_id == ability_id)
    }
}
