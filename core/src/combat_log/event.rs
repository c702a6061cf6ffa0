//! Event model: every recognised record type as one tagged variant.
//!
//! `parse_event` is the single entry point; it tokenises the framed
//! remainder (bracket-aware only where the format calls for it) and builds
//! the variant. Malformed bodies return `None` and the line is skipped;
//! unrecognised type names become [`Event::Unhandled`] so the session
//! builder can count them.

use super::tokenizer::{parse_int_list, split_fields, split_fields_bracketed, strip_brackets};
use super::unit_frame::{read_unit_frame, Fields, UnitFrame};

/// How an effect changed on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum EffectChangeKind {
    Gained,
    Updated,
    Faded,
}

impl EffectChangeKind {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "GAINED" => Some(Self::Gained),
            "UPDATED" => Some(Self::Updated),
            "FADED" => Some(Self::Faded),
            _ => None,
        }
    }
}

/// One combat outcome record.
#[derive(Debug, Clone)]
pub struct CombatRecord {
    pub result: String,
    pub damage_type: String,
    pub power_type: i64,
    pub damage: i64,
    pub heal: i64,
    pub source_instance_id: i64,
    pub ability_id: i64,
    pub source_unit_id: i64,
    pub source: Option<UnitFrame>,
    /// `None` when the record carried `*` (no target).
    pub target_unit_id: Option<i64>,
    pub target: Option<UnitFrame>,
}

#[derive(Debug, Clone)]
pub struct EffectChange {
    pub change: EffectChangeKind,
    pub effect_slot: i64,
    pub effect_instance_id: i64,
    pub ability_id: i64,
    pub target_unit_id: i64,
    pub frame: Option<UnitFrame>,
}

#[derive(Debug, Clone)]
pub struct CastBegin {
    pub cast_instance_id: i64,
    pub ability_id: i64,
    pub caster_unit_id: i64,
    pub frame: Option<UnitFrame>,
}

#[derive(Debug, Clone)]
pub struct CastEnd {
    pub result: String,
    pub cast_instance_id: i64,
    pub ability_id: i64,
}

#[derive(Debug, Clone)]
pub struct HealthRegen {
    pub unit_id: i64,
    pub regen: i64,
    pub frame: Option<UnitFrame>,
    /// Original fields, kept verbatim; the tail of this record is only
    /// loosely specified across patches.
    pub raw: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UnitAdded {
    pub unit_id: i64,
    pub unit_type: String,
    pub is_local: bool,
    pub group_index: Option<i64>,
    pub monster_id: Option<i64>,
    pub is_boss: bool,
    pub class_id: Option<i64>,
    pub race_id: Option<i64>,
    pub name: String,
    pub account: String,
    pub character_id: i64,
    pub level: i64,
    pub champion_points: i64,
    pub disposition: String,
    pub is_grouped: bool,
}

#[derive(Debug, Clone)]
pub struct UnitChanged {
    pub unit_id: i64,
    pub class_id: Option<i64>,
    pub race_id: Option<i64>,
    pub name: String,
    pub account: String,
    pub character_id: i64,
    pub level: i64,
    pub champion_points: i64,
    pub disposition: String,
    pub is_grouped: bool,
}

/// One piece of worn equipment from a PLAYER_INFO loadout.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EquipmentPiece {
    pub slot: String,
    pub item_id: i64,
    #[serde(default)]
    pub is_cp: bool,
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub item_trait: String,
    #[serde(default)]
    pub quality: String,
    #[serde(default)]
    pub set_id: i64,
    #[serde(default)]
    pub enchant_type: String,
    #[serde(default)]
    pub is_enchant_cp: bool,
    #[serde(default)]
    pub enchant_level: i64,
    #[serde(default)]
    pub enchant_quality: String,
}

#[derive(Debug, Clone)]
pub struct PlayerLoadout {
    pub unit_id: i64,
    pub passives: Vec<i64>,
    pub passive_ranks: Vec<i64>,
    pub gear: Vec<EquipmentPiece>,
    pub front_bar: Vec<i64>,
    pub back_bar: Vec<i64>,
}

#[derive(Debug, Clone)]
pub enum Event {
    BeginLog {
        unix_start_ms: i64,
        server: String,
        language: String,
        patch: String,
    },
    EndLog,
    ZoneChanged {
        zone_id: i64,
        name: String,
        difficulty: String,
    },
    MapChanged {
        map_id: i64,
        name: String,
        key: String,
    },
    UnitAdded(UnitAdded),
    UnitChanged(UnitChanged),
    UnitRemoved {
        unit_id: i64,
    },
    AbilityInfo {
        ability_id: i64,
        name: String,
        icon: String,
        is_passive: bool,
        is_player: bool,
    },
    EffectInfo {
        ability_id: i64,
        kind: String,
        damage_type: String,
        duration_type: String,
        linked_ability_id: Option<i64>,
    },
    PlayerInfo(PlayerLoadout),
    BeginCombat,
    EndCombat,
    Combat(CombatRecord),
    EffectChanged(EffectChange),
    BeginCast(CastBegin),
    EndCast(CastEnd),
    HealthRegen(HealthRegen),
    TrialInit {
        key: i64,
        fields: Vec<String>,
    },
    BeginTrial {
        key: i64,
        unix_start_ms: i64,
        fields: Vec<String>,
    },
    EndTrial {
        key: i64,
        duration_ms: i64,
        success: bool,
        final_score: i64,
        vitality: i64,
        fields: Vec<String>,
    },
    Unhandled {
        kind: String,
    },
}

/// Parse the framed remainder of one record into an [`Event`].
pub fn parse_event(kind: &str, rest: &str) -> Option<Event> {
    match kind {
        "BEGIN_LOG" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::BeginLog {
                unix_start_ms: f.int(),
                // log format version sits between the timestamp and server
                server: skip_one(&mut f).string(),
                language: f.string(),
                patch: f.string(),
            })
        }
        "END_LOG" => Some(Event::EndLog),
        "ZONE_CHANGED" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::ZoneChanged {
                zone_id: f.int(),
                name: f.string(),
                difficulty: f.string(),
            })
        }
        "MAP_CHANGED" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::MapChanged {
                map_id: f.int(),
                name: f.string(),
                key: f.string(),
            })
        }
        "UNIT_ADDED" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::UnitAdded(UnitAdded {
                unit_id: f.opt_int()?,
                unit_type: f.string(),
                is_local: f.boolean(),
                group_index: f.opt_int(),
                monster_id: f.opt_int().filter(|id| *id != 0),
                is_boss: f.boolean(),
                class_id: f.opt_int().filter(|id| *id != 0),
                race_id: f.opt_int().filter(|id| *id != 0),
                name: f.string(),
                account: f.string(),
                character_id: f.int(),
                level: f.int(),
                champion_points: f.int(),
                disposition: skip_one(&mut f).string(),
                is_grouped: f.boolean(),
            }))
        }
        "UNIT_CHANGED" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::UnitChanged(UnitChanged {
                unit_id: f.opt_int()?,
                class_id: f.opt_int().filter(|id| *id != 0),
                race_id: f.opt_int().filter(|id| *id != 0),
                name: f.string(),
                account: f.string(),
                character_id: f.int(),
                level: f.int(),
                champion_points: f.int(),
                disposition: skip_one(&mut f).string(),
                is_grouped: f.boolean(),
            }))
        }
        "UNIT_REMOVED" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::UnitRemoved { unit_id: f.opt_int()? })
        }
        "ABILITY_INFO" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::AbilityInfo {
                ability_id: f.opt_int()?,
                name: f.string(),
                icon: f.string(),
                is_passive: f.boolean(),
                is_player: f.boolean(),
            })
        }
        "EFFECT_INFO" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::EffectInfo {
                ability_id: f.opt_int()?,
                kind: f.string(),
                damage_type: f.string(),
                duration_type: f.string(),
                linked_ability_id: f.opt_int().filter(|id| *id != 0),
            })
        }
        "PLAYER_INFO" => parse_player_info(rest).map(Event::PlayerInfo),
        "BEGIN_COMBAT" => Some(Event::BeginCombat),
        "END_COMBAT" => Some(Event::EndCombat),
        "COMBAT_EVENT" => parse_combat_event(rest).map(Event::Combat),
        "EFFECT_CHANGED" => parse_effect_changed(rest).map(Event::EffectChanged),
        "BEGIN_CAST" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            f.next(); // duration
            f.next(); // channel flag
            Some(Event::BeginCast(CastBegin {
                cast_instance_id: f.opt_int()?,
                ability_id: f.int(),
                caster_unit_id: f.int(),
                frame: read_unit_frame(&mut f),
            }))
        }
        "END_CAST" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::EndCast(CastEnd {
                result: f.string(),
                cast_instance_id: f.opt_int()?,
                ability_id: f.int(),
            }))
        }
        "HEALTH_REGEN" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            let unit_id = f.opt_int()?;
            let regen = f.int();
            let frame = read_unit_frame(&mut f);
            Some(Event::HealthRegen(HealthRegen {
                unit_id,
                regen,
                frame,
                raw: t.clone(),
            }))
        }
        // TRAIL_INIT is a long-standing client misspelling; accept both.
        "TRIAL_INIT" | "TRAIL_INIT" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::TrialInit {
                key: f.opt_int()?,
                fields: t.clone(),
            })
        }
        "BEGIN_TRIAL" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::BeginTrial {
                key: f.opt_int()?,
                unix_start_ms: f.int(),
                fields: t.clone(),
            })
        }
        "END_TRIAL" => {
            let t = split_fields(rest);
            let mut f = Fields::new(&t);
            Some(Event::EndTrial {
                key: f.opt_int()?,
                duration_ms: f.int(),
                success: f.boolean(),
                final_score: f.int(),
                vitality: f.int(),
                fields: t.clone(),
            })
        }
        other => Some(Event::Unhandled {
            kind: other.to_string(),
        }),
    }
}

/// Skip one field, then hand the cursor back. Keeps struct literals linear
/// where the format interleaves reserved columns.
fn skip_one<'c, 'a>(f: &'c mut Fields<'a>) -> &'c mut Fields<'a> {
    f.next();
    f
}

fn parse_combat_event(rest: &str) -> Option<CombatRecord> {
    let t = split_fields(rest);
    let mut f = Fields::new(&t);

    let result = f.string();
    if result.is_empty() {
        return None;
    }
    let damage_type = f.string();
    let power_type = f.int();
    let damage = f.int();
    let heal = f.int();
    let source_instance_id = f.int();
    let ability_id = f.int();
    let source_unit_id = f.opt_int()?;
    let source = read_unit_frame(&mut f);

    let (target_unit_id, target) = match f.peek() {
        None => (None, None),
        Some("*") => {
            f.next();
            (None, None)
        }
        Some(tok) => match tok.parse::<i64>() {
            Ok(id) => {
                f.next();
                (Some(id), read_unit_frame(&mut f))
            }
            Err(_) => (None, None),
        },
    };

    Some(CombatRecord {
        result,
        damage_type,
        power_type,
        damage,
        heal,
        source_instance_id,
        ability_id,
        source_unit_id,
        source,
        target_unit_id,
        target,
    })
}

fn parse_effect_changed(rest: &str) -> Option<EffectChange> {
    let t = split_fields(rest);
    let mut f = Fields::new(&t);

    let change = EffectChangeKind::parse(f.next()?)?;
    Some(EffectChange {
        change,
        effect_slot: f.int(),
        effect_instance_id: f.int(),
        ability_id: f.int(),
        target_unit_id: f.int(),
        frame: read_unit_frame(&mut f),
    })
}

fn parse_player_info(rest: &str) -> Option<PlayerLoadout> {
    let t = split_fields_bracketed(rest);
    let mut parts = t.iter().map(|s| s.trim());

    let unit_id = parts.next()?.parse::<i64>().ok()?;
    let passives = parts.next().map(parse_int_list).unwrap_or_default();
    let passive_ranks = parts.next().map(parse_int_list).unwrap_or_default();
    let gear = parts.next().map(parse_equipment).unwrap_or_default();
    let front_bar = parts.next().map(parse_int_list).unwrap_or_default();
    let back_bar = parts.next().map(parse_int_list).unwrap_or_default();

    Some(PlayerLoadout {
        unit_id,
        passives,
        passive_ranks,
        gear,
        front_bar,
        back_bar,
    })
}

/// Parse the `[[SLOT,id,...],[SLOT,id,...]]` equipment list. Missing
/// trailing columns default; an entry with no slot name is dropped.
fn parse_equipment(field: &str) -> Vec<EquipmentPiece> {
    let inner = strip_brackets(field);
    if inner.is_empty() {
        return Vec::new();
    }
    inner
        .split("],[")
        .filter_map(|entry| {
            let entry = entry.trim_matches(|c| c == '[' || c == ']');
            let cols: Vec<&str> = entry.split(',').map(str::trim).collect();
            let slot = (*cols.first()?).to_string();
            if slot.is_empty() {
                return None;
            }
            let int = |i: usize| cols.get(i).and_then(|s| s.parse().ok()).unwrap_or(0);
            let flag = |i: usize| cols.get(i) == Some(&"T");
            let text = |i: usize| cols.get(i).unwrap_or(&"").to_string();
            Some(EquipmentPiece {
                slot,
                item_id: int(1),
                is_cp: flag(2),
                level: int(3),
                item_trait: text(4),
                quality: text(5),
                set_id: int(6),
                enchant_type: text(7),
                is_enchant_cp: flag(8),
                enchant_level: int(9),
                enchant_quality: text(10),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_log_reads_header_columns() {
        let ev = parse_event("BEGIN_LOG", "1700000000000,15,NA,en,9.2.5").unwrap();
        match ev {
            Event::BeginLog {
                unix_start_ms,
                server,
                language,
                patch,
            } => {
                assert_eq!(unix_start_ms, 1700000000000);
                assert_eq!(server, "NA");
                assert_eq!(language, "en");
                assert_eq!(patch, "9.2.5");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn combat_event_with_star_target() {
        let rest = "ABILITY_ON_COOLDOWN,GENERIC,0,0,0,5,118,1,\
                    22000/22000,12000/12000,15000/15000,100/500,0,0.5,0.6,5.93,*";
        let ev = parse_event("COMBAT_EVENT", rest).unwrap();
        match ev {
            Event::Combat(rec) => {
                assert_eq!(rec.source_unit_id, 1);
                assert!(rec.source.is_some());
                assert_eq!(rec.target_unit_id, None);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn combat_event_with_target_block() {
        let rest = "DAMAGE,PHYSICAL,0,250,0,7,900,1,\
                    1/2,3/4,5/6,7/8,0.1,0.2,0.3,\
                    2,9/10,11/12,13/14,15/16,0.4,0.5,0.6";
        let ev = parse_event("COMBAT_EVENT", rest).unwrap();
        match ev {
            Event::Combat(rec) => {
                assert_eq!(rec.damage, 250);
                assert_eq!(rec.target_unit_id, Some(2));
                let tgt = rec.target.unwrap();
                assert_eq!(tgt.health.cur, 9);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn player_info_round_trip() {
        let rest = "1,[10,20],[1,2],[[HEAD,43529,T,16,ARMOR_DIVINES,LEGENDARY,240,STAMINA,T,16,LEGENDARY],[CHEST,10]],[30,31],[40]";
        let ev = parse_event("PLAYER_INFO", rest).unwrap();
        match ev {
            Event::PlayerInfo(info) => {
                assert_eq!(info.unit_id, 1);
                assert_eq!(info.passives, vec![10, 20]);
                assert_eq!(info.gear.len(), 2);
                assert_eq!(info.gear[0].slot, "HEAD");
                assert_eq!(info.gear[0].set_id, 240);
                assert_eq!(info.gear[1].item_id, 10);
                assert_eq!(info.gear[1].enchant_level, 0);
                assert_eq!(info.back_bar, vec![40]);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_types_become_unhandled() {
        match parse_event("SOMETHING_NEW", "1,2,3").unwrap() {
            Event::Unhandled { kind } => assert_eq!(kind, "SOMETHING_NEW"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn trial_init_accepts_misspelling() {
        assert!(matches!(
            parse_event("TRAIL_INIT", "12,0,0").unwrap(),
            Event::TrialInit { key: 12, .. }
        ));
    }
}
