//! Session-scoped records: dictionaries, unit lifetimes, zones and trials.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::combat_log::EquipmentPiece;
use crate::game_data::UnitType;

/// An ability definition from ABILITY_INFO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AbilityDef {
    pub ability_id: i64,
    pub name: String,
    pub icon: String,
    #[serde(default)]
    pub is_passive: bool,
    #[serde(default)]
    pub is_player: bool,
}

/// An effect definition from EFFECT_INFO.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectDef {
    pub ability_id: i64,
    pub kind: String,
    pub damage_type: String,
    #[serde(default)]
    pub duration_type: String,
    #[serde(default)]
    pub linked_ability_id: Option<i64>,
}

/// One lifetime of a unit id. Ids are reused by the client; each reuse
/// closes the previous entry and appends a fresh one, so the entries for
/// one id form ordered, non-overlapping intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitInfo {
    pub unit_id: i64,
    pub unit_type: UnitType,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub group_index: Option<i64>,
    #[serde(default)]
    pub monster_id: Option<i64>,
    #[serde(default)]
    pub is_boss: bool,
    #[serde(default)]
    pub class_id: Option<i64>,
    #[serde(default)]
    pub race_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub character_id: i64,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub champion_points: i64,
    #[serde(default)]
    pub disposition: String,
    #[serde(default)]
    pub is_grouped: bool,
    pub is_active: bool,
    pub first_seen_rel_ms: i64,
    pub last_seen_rel_ms: i64,
}

/// A map transition inside a zone segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapChange {
    pub rel_ms: i64,
    pub map_id: i64,
    pub name: String,
    #[serde(default)]
    pub key: String,
}

/// Maximal interval between ZONE_CHANGED boundaries. Fights reference the
/// segment by `id`; the segment does not own them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSegment {
    pub id: i64,
    pub start_rel_ms: i64,
    #[serde(default)]
    pub end_rel_ms: Option<i64>,
    pub zone_id: i64,
    pub zone_name: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub maps: Vec<MapChange>,
}

/// A PLAYER_INFO snapshot (passives, ranks, worn gear, both action bars).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfoSnapshot {
    pub rel_ms: i64,
    pub unit_id: i64,
    #[serde(default)]
    pub passives: Vec<i64>,
    #[serde(default)]
    pub passive_ranks: Vec<i64>,
    #[serde(default)]
    pub gear: Vec<EquipmentPiece>,
    #[serde(default)]
    pub front_bar: Vec<i64>,
    #[serde(default)]
    pub back_bar: Vec<i64>,
}

/// One trial run. `begin_fields`/`end_fields` keep the raw columns; the
/// score block is only partially stable across patches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialRun {
    pub trial_key: i64,
    pub start_rel_ms: i64,
    #[serde(default)]
    pub end_rel_ms: Option<i64>,
    pub start_unix_ms: i64,
    #[serde(default)]
    pub end_unix_ms: Option<i64>,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub final_score: i64,
    #[serde(default)]
    pub vitality: i64,
    #[serde(default)]
    pub begin_fields: Vec<String>,
    #[serde(default)]
    pub end_fields: Vec<String>,
}

/// Everything known about one BEGIN_LOG..END_LOG interval, minus the
/// fights (which are stored and routed by id).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub unix_start_ms: i64,
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub patch: String,
    /// Relative time of the last record seen in this session.
    #[serde(default)]
    pub end_rel_ms: i64,
    #[serde(default)]
    pub abilities: HashMap<i64, AbilityDef>,
    #[serde(default)]
    pub effects: HashMap<i64, EffectDef>,
    #[serde(default)]
    pub units: Vec<UnitInfo>,
    #[serde(default)]
    pub zones: Vec<ZoneSegment>,
    #[serde(default)]
    pub player_infos: Vec<PlayerInfoSnapshot>,
    #[serde(default)]
    pub trials: Vec<TrialRun>,
    #[serde(default)]
    pub unhandled_counts: HashMap<String, u64>,
    #[serde(default)]
    pub trial_init_key: Option<i64>,
}

impl SessionDetail {
    /// The lifetime entry for `unit_id` covering `at_rel_ms`: the last
    /// entry opened at or before that instant, falling back to the first
    /// entry for the id.
    pub fn unit_at(&self, unit_id: i64, at_rel_ms: i64) -> Option<&UnitInfo> {
        self.units
            .iter()
            .filter(|u| u.unit_id == unit_id && u.first_seen_rel_ms <= at_rel_ms)
            .last()
            .or_else(|| self.units.iter().find(|u| u.unit_id == unit_id))
    }
}
