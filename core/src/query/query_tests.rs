//! Tests for the in-memory query projections.

use super::*;
use crate::fight::{CombatAgg, CombatSample, FightDetail, FightSeriesPoint};

fn agg(src: i64, tgt: i64, ability: i64, total: i64, hits: u32, crits: u32, secs: u32) -> CombatAgg {
    CombatAgg {
        source_unit_id: src,
        target_unit_id: tgt,
        ability_id: ability,
        total,
        hits,
        crits,
        active_seconds: secs,
        overheal: 0,
    }
}

fn detail_with_aggs() -> FightDetail {
    FightDetail {
        fight_id: "f-1".to_string(),
        damage_aggs: vec![
            agg(1, 9, 7, 600, 6, 2, 3),
            agg(1, 10, 7, 200, 2, 0, 2),
            agg(2, 9, 8, 900, 3, 3, 3),
        ],
        heal_aggs: vec![agg(3, 1, 11, 400, 4, 1, 4)],
        ..FightDetail::default()
    }
}

fn dense_series() -> Vec<FightSeriesPoint> {
    vec![
        FightSeriesPoint { second: 0, damage: 0, heal: 0 },
        FightSeriesPoint { second: 1, damage: 100, heal: 30 },
        FightSeriesPoint { second: 2, damage: 50, heal: 0 },
        FightSeriesPoint { second: 3, damage: 0, heal: 20 },
    ]
}

// ─────────────────────────────────────────────────────────────────────────────
// Ability ids
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn ability_ids_respect_filters() {
    let detail = detail_with_aggs();
    assert_eq!(ability_ids(&detail, &AggFilter::default()), vec![7, 8]);
    assert_eq!(
        ability_ids(
            &detail,
            &AggFilter {
                source_unit_id: Some(1),
                ..AggFilter::default()
            }
        ),
        vec![7]
    );
    assert_eq!(
        ability_ids(
            &detail,
            &AggFilter {
                heals: true,
                ..AggFilter::default()
            }
        ),
        vec![11]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Aggregate projection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn aggregates_group_by_ability_and_sort_by_total() {
    let detail = detail_with_aggs();
    let rows = project_aggregates(&detail, &AggFilter::default());
    assert_eq!(rows.len(), 2);

    // Ability 8 (900) outranks ability 7 (600 + 200).
    assert_eq!(rows[0].ability_id, 8);
    assert_eq!(rows[1].ability_id, 7);
    assert_eq!(rows[1].total, 800);
    assert_eq!(rows[1].hits, 8);
    assert_eq!(rows[1].crits, 2);
    assert_eq!(rows[1].active_seconds, 5);
    assert!((rows[1].dps - 160.0).abs() < 1e-9);
    assert!((rows[1].average - 100.0).abs() < 1e-9);
    assert!((rows[1].crit_pct - 0.25).abs() < 1e-9);
    assert!((rows[0].percent - 900.0 / 1700.0).abs() < 1e-9);
    assert!((rows[0].percent + rows[1].percent - 1.0).abs() < 1e-9);
}

#[test]
fn zero_active_seconds_falls_back_to_total() {
    let detail = FightDetail {
        damage_aggs: vec![agg(1, 9, 7, 500, 0, 0, 0)],
        ..FightDetail::default()
    };
    let rows = project_aggregates(&detail, &AggFilter::default());
    assert!((rows[0].dps - 500.0).abs() < 1e-9);
    assert_eq!(rows[0].average, 0.0);
    assert_eq!(rows[0].crit_pct, 0.0);
}

#[test]
fn target_filter_narrows_the_projection() {
    let detail = detail_with_aggs();
    let rows = project_aggregates(
        &detail,
        &AggFilter {
            target_unit_id: Some(10),
            ..AggFilter::default()
        },
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].total, 200);
    assert!((rows[0].percent - 1.0).abs() < 1e-9);
}

// ─────────────────────────────────────────────────────────────────────────────
// Series projection
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn dense_series_is_returned_verbatim_without_samples_or_filters() {
    let detail = FightDetail::default();
    let series = dense_series();
    let projected = project_series(&detail, &series, &AggFilter::default(), 0);
    assert_eq!(projected, series);
}

#[test]
fn heals_flag_zeroes_the_damage_channel_of_the_dense_series() {
    let detail = FightDetail::default();
    let projected = project_series(
        &detail,
        &dense_series(),
        &AggFilter {
            heals: true,
            ..AggFilter::default()
        },
        0,
    );
    assert!(projected.iter().all(|p| p.damage == 0));
    assert_eq!(projected[1].heal, 30);
    assert_eq!(projected.len(), 4);
}

#[test]
fn filters_without_samples_yield_nothing() {
    let detail = FightDetail::default();
    let projected = project_series(
        &detail,
        &dense_series(),
        &AggFilter {
            source_unit_id: Some(1),
            ..AggFilter::default()
        },
        0,
    );
    assert!(projected.is_empty());
}

fn sample(rel_ms: i64, src: i64, tgt: i64, damage: i64, heal: i64) -> CombatSample {
    CombatSample {
        rel_ms,
        source_unit_id: src,
        target_unit_id: tgt,
        ability_id: 7,
        damage,
        heal,
        overheal: 0,
        is_crit: false,
        result: "DAMAGE".to_string(),
    }
}

#[test]
fn samples_rebuild_filtered_sparse_buckets() {
    let detail = FightDetail {
        samples: vec![
            sample(1000, 1, 9, 100, 0),
            sample(1200, 2, 9, 40, 0),
            sample(5500, 1, 9, 60, 0),
        ],
        ..FightDetail::default()
    };
    let projected = project_series(
        &detail,
        &dense_series(),
        &AggFilter {
            source_unit_id: Some(1),
            ..AggFilter::default()
        },
        0,
    );
    // Only non-zero buckets, ascending, and only unit 1's hits.
    assert_eq!(
        projected,
        vec![
            FightSeriesPoint { second: 1, damage: 100, heal: 0 },
            FightSeriesPoint { second: 5, damage: 60, heal: 0 },
        ]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Range stats
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn range_is_empty_for_inverted_bounds() {
    assert!(range_stats(&dense_series(), 2000, 2000).is_none());
    assert!(range_stats(&dense_series(), 3000, 1000).is_none());
}

#[test]
fn range_sums_the_covered_seconds() {
    let series = dense_series();
    let stats = range_stats(&series, 1000, 3000).unwrap();
    assert_eq!(stats.damage, 150);
    assert_eq!(stats.heal, 30);
    assert!((stats.dps - 75.0).abs() < 1e-9);
    assert!((stats.hps - 15.0).abs() < 1e-9);
}

#[test]
fn range_is_additive_on_second_boundaries() {
    let series = dense_series();
    let whole = range_stats(&series, 0, 4000).unwrap();
    let left = range_stats(&series, 0, 2000).unwrap();
    let right = range_stats(&series, 2000, 4000).unwrap();
    assert_eq!(whole.damage, left.damage + right.damage);
    assert_eq!(whole.heal, left.heal + right.heal);
}

#[test]
fn sub_second_ranges_floor_the_duration() {
    let series = vec![FightSeriesPoint { second: 0, damage: 10, heal: 0 }];
    // Sub-millisecond math is clamped rather than dividing by zero.
    let stats = range_stats(&series, 0, 1).unwrap();
    assert_eq!(stats.damage, 10);
    assert!(stats.dps <= 10.0 / 0.001 + 1e-9);
    assert!(stats.duration_sec >= 0.001);
}
