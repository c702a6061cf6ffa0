//! Query layer: projections over one fight's detail and series.
//!
//! Four operations: ability listing, per-ability aggregate projection,
//! filtered per-second series, and time-range stats. All of them read a
//! loaded [`FightDetail`] — the store is consulted once, then everything
//! is in-memory arithmetic.

#[cfg(test)]
mod query_tests;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fight::{CombatAgg, FightDetail, FightSeriesPoint};

/// Filter over the `(source, target, ability)` aggregate space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggFilter {
    pub source_unit_id: Option<i64>,
    pub target_unit_id: Option<i64>,
    /// Project heals instead of damage.
    pub heals: bool,
}

impl AggFilter {
    fn matches(&self, agg: &CombatAgg) -> bool {
        self.source_unit_id
            .map(|id| agg.source_unit_id == id)
            .unwrap_or(true)
            && self
                .target_unit_id
                .map(|id| agg.target_unit_id == id)
                .unwrap_or(true)
    }

    fn is_unfiltered(&self) -> bool {
        self.source_unit_id.is_none() && self.target_unit_id.is_none()
    }

    fn selected<'d>(&self, detail: &'d FightDetail) -> &'d [CombatAgg] {
        if self.heals {
            &detail.heal_aggs
        } else {
            &detail.damage_aggs
        }
    }
}

/// One projected per-ability row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityAggregate {
    pub ability_id: i64,
    pub total: i64,
    pub hits: u32,
    pub crits: u32,
    pub active_seconds: u32,
    pub overheal: i64,
    /// `total / active_seconds`; plain `total` when no active second.
    pub dps: f64,
    pub average: f64,
    pub crit_pct: f64,
    /// Share of the grand total across the projection.
    pub percent: f64,
}

/// Damage/heal sums over a `[from, to)` millisecond range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeStats {
    pub damage: i64,
    pub heal: i64,
    pub dps: f64,
    pub hps: f64,
    pub duration_sec: f64,
}

/// Distinct ability ids contributing to the filtered aggregates.
pub fn ability_ids(detail: &FightDetail, filter: &AggFilter) -> Vec<i64> {
    let mut ids: Vec<i64> = filter
        .selected(detail)
        .iter()
        .filter(|agg| filter.matches(agg))
        .map(|agg| agg.ability_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Group the filtered aggregates by ability, derive rates, sort by total
/// descending.
pub fn project_aggregates(detail: &FightDetail, filter: &AggFilter) -> Vec<AbilityAggregate> {
    let mut by_ability: BTreeMap<i64, CombatAgg> = BTreeMap::new();
    for agg in filter.selected(detail).iter().filter(|a| filter.matches(a)) {
        let entry = by_ability.entry(agg.ability_id).or_insert_with(|| CombatAgg {
            ability_id: agg.ability_id,
            ..CombatAgg::default()
        });
        entry.total += agg.total;
        entry.hits += agg.hits;
        entry.crits += agg.crits;
        entry.active_seconds += agg.active_seconds;
        entry.overheal += agg.overheal;
    }

    let grand_total: i64 = by_ability.values().map(|a| a.total).sum();
    let mut rows: Vec<AbilityAggregate> = by_ability
        .into_values()
        .map(|agg| {
            let dps = if agg.active_seconds > 0 {
                agg.total as f64 / agg.active_seconds as f64
            } else {
                agg.total as f64
            };
            let average = if agg.hits > 0 {
                agg.total as f64 / agg.hits as f64
            } else {
                0.0
            };
            let crit_pct = if agg.hits > 0 {
                agg.crits as f64 / agg.hits as f64
            } else {
                0.0
            };
            let percent = if grand_total > 0 {
                agg.total as f64 / grand_total as f64
            } else {
                0.0
            };
            AbilityAggregate {
                ability_id: agg.ability_id,
                total: agg.total,
                hits: agg.hits,
                crits: agg.crits,
                active_seconds: agg.active_seconds,
                overheal: agg.overheal,
                dps,
                average,
                crit_pct,
                percent,
            }
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total).then(a.ability_id.cmp(&b.ability_id)));
    rows
}

/// Per-second series under a filter.
///
/// With retained combat samples the buckets are rebuilt from them (only
/// non-zero seconds, ascending). Without samples the dense stored series
/// is returned verbatim for the unfiltered case — filters cannot be
/// honoured then, so the projection is empty.
pub fn project_series(
    detail: &FightDetail,
    series: &[FightSeriesPoint],
    filter: &AggFilter,
    fight_start_rel_ms: i64,
) -> Vec<FightSeriesPoint> {
    if detail.samples.is_empty() {
        if !filter.is_unfiltered() {
            return Vec::new();
        }
        if filter.heals {
            return series
                .iter()
                .map(|p| FightSeriesPoint {
                    second: p.second,
                    damage: 0,
                    heal: p.heal,
                })
                .collect();
        }
        return series.to_vec();
    }

    let mut buckets: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
    for sample in &detail.samples {
        let src_ok = filter
            .source_unit_id
            .map(|id| sample.source_unit_id == id)
            .unwrap_or(true);
        let tgt_ok = filter
            .target_unit_id
            .map(|id| sample.target_unit_id == id)
            .unwrap_or(true);
        if !src_ok || !tgt_ok {
            continue;
        }
        let second = (sample.rel_ms - fight_start_rel_ms).max(0) / 1000;
        let bucket = buckets.entry(second).or_insert((0, 0));
        bucket.0 += sample.damage;
        bucket.1 += sample.heal;
    }

    buckets
        .into_iter()
        .filter_map(|(second, (damage, heal))| {
            let (damage, heal) = if filter.heals { (0, heal) } else { (damage, heal) };
            if damage == 0 && heal == 0 {
                return None;
            }
            Some(FightSeriesPoint {
                second,
                damage,
                heal,
            })
        })
        .collect()
}

/// Sum damage/heal for the seconds covered by `[from_ms, to_ms)`.
/// Returns `None` when the range is empty or inverted.
pub fn range_stats(
    series: &[FightSeriesPoint],
    from_ms: i64,
    to_ms: i64,
) -> Option<RangeStats> {
    if to_ms <= from_ms {
        return None;
    }
    let from_sec = from_ms.div_euclid(1000);
    let to_sec = (to_ms + 999).div_euclid(1000);

    let mut damage = 0;
    let mut heal = 0;
    for point in series {
        if point.second >= from_sec && point.second < to_sec {
            damage += point.damage;
            heal += point.heal;
        }
    }

    let duration_sec = ((to_ms - from_ms) as f64 / 1000.0).max(0.001);
    Some(RangeStats {
        damage,
        heal,
        dps: damage as f64 / duration_sec,
        hps: heal as f64 / duration_sec,
        duration_sec,
    })
}
