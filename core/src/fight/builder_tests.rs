//! Tests for the combat-level state machine.

use hashbrown::HashSet;

use super::builder::{FightBuilder, FinishContext};
use super::detail::CAST_RESULT_OPEN;
use crate::combat_log::{
    CastBegin, CastEnd, CombatRecord, EffectChange, EffectChangeKind, Pool, UnitFrame,
};
use crate::game_data::{ResourceKind, UnitType};
use crate::session::info::{SessionDetail, UnitInfo};

fn frame(health_cur: i64, health_max: i64) -> UnitFrame {
    UnitFrame {
        health: Pool {
            cur: health_cur,
            max: health_max,
        },
        magicka: Pool { cur: 100, max: 100 },
        stamina: Pool { cur: 100, max: 100 },
        ultimate: Pool { cur: 0, max: 500 },
        x: 0.1,
        y: 0.2,
        z: 0.3,
    }
}

fn damage_record(source: i64, target: i64, ability: i64, amount: i64) -> CombatRecord {
    CombatRecord {
        result: "DAMAGE".to_string(),
        damage_type: "PHYSICAL".to_string(),
        power_type: 0,
        damage: amount,
        heal: 0,
        source_instance_id: 1,
        ability_id: ability,
        source_unit_id: source,
        source: Some(frame(1000, 1000)),
        target_unit_id: Some(target),
        target: Some(frame(500, 1000)),
    }
}

fn heal_record(source: i64, target: i64, ability: i64, amount: i64) -> CombatRecord {
    CombatRecord {
        result: "HEAL".to_string(),
        damage_type: "GENERIC".to_string(),
        power_type: 0,
        damage: 0,
        heal: amount,
        source_instance_id: 1,
        ability_id: ability,
        source_unit_id: source,
        source: Some(frame(1000, 1000)),
        target_unit_id: Some(target),
        target: Some(frame(900, 1000)),
    }
}

fn unit(unit_id: i64, name: &str, unit_type: UnitType, disposition: &str, is_boss: bool) -> UnitInfo {
    UnitInfo {
        unit_id,
        unit_type,
        name: name.to_string(),
        disposition: disposition.to_string(),
        is_boss,
        is_active: true,
        first_seen_rel_ms: 0,
        last_seen_rel_ms: 0,
        ..UnitInfo::default()
    }
}

fn session_with(units: Vec<UnitInfo>) -> SessionDetail {
    SessionDetail {
        id: "session-1".to_string(),
        units,
        ..SessionDetail::default()
    }
}

fn finish(builder: FightBuilder, session: &SessionDetail, end_rel_ms: i64) -> super::CompletedFight {
    builder.finish(FinishContext {
        session,
        zone: session.zones.last(),
        fight_id: "fight-1".to_string(),
        ordinal: 0,
        end_rel_ms,
    })
}

fn no_markers() -> HashSet<i64> {
    HashSet::new()
}

// ─────────────────────────────────────────────────────────────────────────────
// Damage aggregation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn two_hits_in_one_second_share_an_active_second() {
    let session = session_with(vec![
        unit(1, "Alia", UnitType::Player, "PLAYER_ALLY", false),
        unit(2, "Ogre", UnitType::Monster, "HOSTILE", false),
    ]);
    let mut builder = FightBuilder::new(0, true);
    builder.handle_combat(1000, &damage_record(1, 2, 7, 100));
    builder.handle_combat(1500, &damage_record(1, 2, 7, 100));

    let fight = finish(builder, &session, 2000);

    assert_eq!(fight.series[1].damage, 200);
    let agg = &fight.detail.damage_aggs[0];
    assert_eq!(
        (agg.source_unit_id, agg.target_unit_id, agg.ability_id),
        (1, 2, 7)
    );
    assert_eq!(agg.total, 200);
    assert_eq!(agg.hits, 2);
    assert_eq!(agg.crits, 0);
    assert_eq!(agg.active_seconds, 1);
    assert_eq!(agg.overheal, 0);
}

#[test]
fn critical_results_count_crits() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut rec = damage_record(1, 2, 7, 100);
    rec.result = "CRITICAL_DAMAGE".to_string();
    builder.handle_combat(1000, &rec);
    builder.handle_combat(2100, &damage_record(1, 2, 7, 50));

    let fight = finish(builder, &session, 3000);
    let agg = &fight.detail.damage_aggs[0];
    assert_eq!(agg.hits, 2);
    assert_eq!(agg.crits, 1);
    assert_eq!(agg.active_seconds, 2);
}

#[test]
fn per_unit_totals_follow_source_and_target() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_combat(100, &damage_record(1, 2, 7, 100));
    builder.handle_combat(200, &damage_record(1, 2, 8, 40));

    let fight = finish(builder, &session, 1000);
    assert_eq!(fight.detail.totals[&1].damage_done, 140);
    assert_eq!(fight.detail.totals[&2].damage_taken, 140);
    assert_eq!(fight.detail.damage_done_by_ability[&1][&7], 100);
    assert_eq!(fight.detail.damage_done_by_ability[&1][&8], 40);
    assert_eq!(fight.detail.damage_taken_by_ability[&2][&7], 100);
}

#[test]
fn series_is_dense_up_to_fight_end() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_combat(4500, &damage_record(1, 2, 7, 10));

    let fight = finish(builder, &session, 6200);
    let seconds: Vec<i64> = fight.series.iter().map(|p| p.second).collect();
    assert_eq!(seconds, vec![0, 1, 2, 3, 4, 5, 6]);
    assert_eq!(fight.series[4].damage, 10);
    assert!(fight.series.iter().all(|p| p.damage >= 0 && p.heal >= 0));
}

// ─────────────────────────────────────────────────────────────────────────────
// Heals and overheal
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn overheal_is_surplus_over_missing_health() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    // Target is missing 100 health; a 500 heal overheals by 400.
    let mut rec = heal_record(1, 3, 11, 500);
    rec.target = Some(frame(900, 1000));
    builder.handle_combat(1000, &rec);

    let fight = finish(builder, &session, 2000);
    let agg = &fight.detail.heal_aggs[0];
    assert_eq!(agg.total, 500);
    assert_eq!(agg.overheal, 400);
    assert_eq!(fight.detail.totals[&1].healing_done, 500);
    assert_eq!(fight.detail.totals[&3].healing_taken, 500);
    assert_eq!(fight.series[1].heal, 500);
}

#[test]
fn overheal_is_zero_without_a_target_pool() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut rec = heal_record(1, 3, 11, 500);
    rec.target = None;
    builder.handle_combat(1000, &rec);

    let fight = finish(builder, &session, 2000);
    assert_eq!(fight.detail.heal_aggs[0].overheal, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource changes
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn energize_credits_the_target_when_present() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut rec = damage_record(1, 2, 20, 0);
    rec.result = "ENERGIZE".to_string();
    rec.damage = 300;
    rec.power_type = 4;
    builder.handle_combat(500, &rec);

    let fight = finish(builder, &session, 1000);
    let ev = &fight.detail.resource_events[0];
    assert_eq!(ev.unit_id, 2);
    assert_eq!(ev.amount, 300);
    assert_eq!(ev.kind, ResourceKind::Stamina);
    assert_eq!(fight.detail.totals[&2].resource_gained, 300);
    assert_eq!(fight.detail.resource_gained_by_ability[&2][&20], 300);
    // An ENERGIZE is not damage.
    assert!(fight.detail.damage_aggs.is_empty());
    assert_eq!(fight.series[0].damage, 0);
}

#[test]
fn drain_is_negative_and_not_a_gain() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut rec = damage_record(5, 0, 21, 0);
    rec.result = "POWER_DRAIN".to_string();
    rec.damage = 120;
    rec.power_type = 0;
    rec.target_unit_id = None;
    rec.target = None;
    builder.handle_combat(500, &rec);

    let fight = finish(builder, &session, 1000);
    let ev = &fight.detail.resource_events[0];
    assert_eq!(ev.unit_id, 5);
    assert_eq!(ev.amount, -120);
    assert_eq!(ev.kind, ResourceKind::Magicka);
    assert!(fight.detail.resource_gained_by_ability.is_empty());
}

// ─────────────────────────────────────────────────────────────────────────────
// Deaths
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn killing_blow_attributes_the_source() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut rec = damage_record(1, 2, 7, 900);
    rec.result = "KILLING_BLOW".to_string();
    builder.handle_combat(3000, &rec);

    let fight = finish(builder, &session, 4000);
    let death = &fight.detail.deaths[0];
    assert_eq!(death.victim_unit_id, 2);
    assert_eq!(death.killer_unit_id, Some(1));
    assert_eq!(fight.detail.totals[&2].deaths, 1);
}

#[test]
fn died_marks_the_source_unit() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut rec = damage_record(4, 0, 0, 0);
    rec.result = "DIED".to_string();
    rec.target_unit_id = None;
    rec.target = None;
    builder.handle_combat(3000, &rec);

    let fight = finish(builder, &session, 4000);
    let death = &fight.detail.deaths[0];
    assert_eq!(death.victim_unit_id, 4);
    assert_eq!(death.killer_unit_id, None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Effect uptimes
// ─────────────────────────────────────────────────────────────────────────────

fn effect(change: EffectChangeKind, ability: i64, target: i64) -> EffectChange {
    EffectChange {
        change,
        effect_slot: 1,
        effect_instance_id: 555,
        ability_id: ability,
        target_unit_id: target,
        frame: None,
    }
}

#[test]
fn gained_then_faded_yields_uptime() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_effect_changed(1000, &effect(EffectChangeKind::Gained, 9, 3), &no_markers());
    builder.handle_effect_changed(4000, &effect(EffectChangeKind::Faded, 9, 3), &no_markers());

    let fight = finish(builder, &session, 5000);
    let uptime = fight.detail.uptime_for(3, 9).unwrap();
    assert_eq!(uptime.total_ms, 3000);
    assert_eq!(uptime.applications, 1);
    assert_eq!(fight.detail.effect_changes.len(), 2);
}

#[test]
fn updated_counts_an_application_without_reopening() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_effect_changed(1000, &effect(EffectChangeKind::Gained, 9, 3), &no_markers());
    builder.handle_effect_changed(2000, &effect(EffectChangeKind::Updated, 9, 3), &no_markers());
    builder.handle_effect_changed(4000, &effect(EffectChangeKind::Faded, 9, 3), &no_markers());

    let fight = finish(builder, &session, 5000);
    let uptime = fight.detail.uptime_for(3, 9).unwrap();
    assert_eq!(uptime.total_ms, 3000);
    assert_eq!(uptime.applications, 2);
}

#[test]
fn open_interval_is_closed_at_fight_end() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_effect_changed(1000, &effect(EffectChangeKind::Gained, 9, 3), &no_markers());

    let fight = finish(builder, &session, 6000);
    assert_eq!(fight.detail.uptime_for(3, 9).unwrap().total_ms, 5000);
}

#[test]
fn hard_mode_marker_flags_the_fight() {
    let session = session_with(vec![]);
    let mut markers = HashSet::new();
    markers.insert(99);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_effect_changed(1000, &effect(EffectChangeKind::Gained, 99, 3), &markers);

    let fight = finish(builder, &session, 2000);
    assert!(fight.summary.is_hard_mode);
}

// ─────────────────────────────────────────────────────────────────────────────
// Casts
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn begin_end_cast_closes_and_counts() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_begin_cast(
        1000,
        &CastBegin {
            cast_instance_id: 42,
            ability_id: 7,
            caster_unit_id: 1,
            frame: None,
        },
    );
    builder.handle_end_cast(
        1800,
        &CastEnd {
            result: "COMPLETED".to_string(),
            cast_instance_id: 42,
            ability_id: 7,
        },
    );

    let fight = finish(builder, &session, 3000);
    let cast = &fight.detail.casts[0];
    assert_eq!(cast.caster_unit_id, 1);
    assert_eq!(cast.start_rel_ms, 1000);
    assert_eq!(cast.end_rel_ms, Some(1800));
    assert_eq!(cast.result, "COMPLETED");
    assert_eq!(fight.detail.totals[&1].casts, 1);
}

#[test]
fn orphan_end_cast_uses_the_sentinel_caster() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_end_cast(
        1800,
        &CastEnd {
            result: "INTERRUPTED".to_string(),
            cast_instance_id: 42,
            ability_id: 7,
        },
    );

    let fight = finish(builder, &session, 3000);
    let cast = &fight.detail.casts[0];
    assert_eq!(cast.caster_unit_id, 0);
    assert_eq!(cast.result, "INTERRUPTED");
    assert!(fight.detail.totals.values().all(|t| t.casts == 0));
}

#[test]
fn open_cast_is_emitted_without_end_time() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    builder.handle_begin_cast(
        2000,
        &CastBegin {
            cast_instance_id: 43,
            ability_id: 8,
            caster_unit_id: 1,
            frame: None,
        },
    );

    let fight = finish(builder, &session, 3000);
    let cast = &fight.detail.casts[0];
    assert_eq!(cast.result, CAST_RESULT_OPEN);
    assert_eq!(cast.end_rel_ms, None);
    assert_eq!(fight.detail.totals.get(&1).map(|t| t.casts), None);
}

// ─────────────────────────────────────────────────────────────────────────────
// Partitioning and titles
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn units_partition_by_disposition_and_bosses_title_the_fight() {
    let session = session_with(vec![
        unit(1, "Alia", UnitType::Player, "PLAYER_ALLY", false),
        unit(2, "Warden", UnitType::Monster, "HOSTILE", true),
        unit(3, "Spirit", UnitType::Monster, "NPC_ALLY", false),
        unit(4, "Adds", UnitType::Monster, "HOSTILE", false),
    ]);
    let mut builder = FightBuilder::new(0, true);
    builder.handle_combat(1000, &damage_record(1, 2, 7, 100));
    builder.handle_combat(1200, &damage_record(3, 4, 9, 50));

    let fight = finish(builder, &session, 2000);
    assert_eq!(fight.detail.friendly_unit_ids, vec![1, 3]);
    assert_eq!(fight.detail.enemy_unit_ids, vec![2, 4]);
    assert_eq!(fight.summary.boss_unit_ids, vec![2]);
    assert_eq!(fight.summary.title, "Warden");
}

#[test]
fn bossless_fight_takes_an_ordinal_title() {
    let session = session_with(vec![]);
    let builder = FightBuilder::new(0, false);
    let fight = builder.finish(FinishContext {
        session: &session,
        zone: None,
        fight_id: "fight-9".to_string(),
        ordinal: 2,
        end_rel_ms: 100,
    });
    assert_eq!(fight.summary.title, "Fight 3");
}

// ─────────────────────────────────────────────────────────────────────────────
// Resource samples
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn same_second_sample_is_replaced() {
    let session = session_with(vec![]);
    let mut builder = FightBuilder::new(0, false);
    let mut first = damage_record(1, 2, 7, 10);
    first.source = Some(frame(800, 1000));
    builder.handle_combat(1100, &first);
    let mut second = damage_record(1, 2, 7, 10);
    second.source = Some(frame(600, 1000));
    builder.handle_combat(1900, &second);

    let fight = finish(builder, &session, 3000);
    let samples = &fight.detail.resource_samples[&1];
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].second, 1);
    assert_eq!(samples[0].health.cur, 600);
}
