//! Game-constant lookups: resource kinds, dispositions, unit types and the
//! hard-mode marker heuristic.

use serde::{Deserialize, Serialize};

/// Resource affected by an ENERGIZE/DRAIN combat result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Health,
    Magicka,
    Stamina,
    Ultimate,
    #[default]
    Unknown,
}

impl ResourceKind {
    /// Map a wire `powerType` code. The codes changed across game patches;
    /// both generations are accepted.
    pub fn from_power_type(code: i64) -> ResourceKind {
        match code {
            -2 | 32 => ResourceKind::Health,
            0 | 1 => ResourceKind::Magicka,
            6 | 4 => ResourceKind::Stamina,
            10 | 8 => ResourceKind::Ultimate,
            _ => ResourceKind::Unknown,
        }
    }
}

/// Broad unit classification from UNIT_ADDED's `unitType` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitType {
    Player,
    Monster,
    Object,
    #[default]
    Unknown,
}

impl UnitType {
    pub fn parse(s: &str) -> UnitType {
        match s {
            "PLAYER" => UnitType::Player,
            "MONSTER" => UnitType::Monster,
            "OBJECT" => UnitType::Object,
            _ => UnitType::Unknown,
        }
    }
}

/// Disposition strings are free-form flag-ish values ("HOSTILE",
/// "PLAYER_ALLY", ...); matching is substring-based on purpose.
pub fn is_hostile_disposition(disposition: &str) -> bool {
    disposition.contains("HOSTILE")
}

pub fn is_friendly_disposition(disposition: &str) -> bool {
    disposition.contains("PLAYER_ALLY")
        || disposition.contains("NPC_ALLY")
        || disposition.contains("FRIENDLY")
}

/// Heuristic: an ability whose name reads like a hard-mode marker. Used to
/// flag fights where such an effect is gained. Known to be inexact.
pub fn is_hard_mode_ability_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    if lower.contains("hard mode") {
        return true;
    }
    name.contains("HM") && lower.contains("mode")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn power_type_accepts_both_generations() {
        assert_eq!(ResourceKind::from_power_type(-2), ResourceKind::Health);
        assert_eq!(ResourceKind::from_power_type(32), ResourceKind::Health);
        assert_eq!(ResourceKind::from_power_type(0), ResourceKind::Magicka);
        assert_eq!(ResourceKind::from_power_type(1), ResourceKind::Magicka);
        assert_eq!(ResourceKind::from_power_type(6), ResourceKind::Stamina);
        assert_eq!(ResourceKind::from_power_type(4), ResourceKind::Stamina);
        assert_eq!(ResourceKind::from_power_type(10), ResourceKind::Ultimate);
        assert_eq!(ResourceKind::from_power_type(8), ResourceKind::Ultimate);
        assert_eq!(ResourceKind::from_power_type(99), ResourceKind::Unknown);
    }

    #[test]
    fn hard_mode_heuristic() {
        assert!(is_hard_mode_ability_name("Hard Mode"));
        assert!(is_hard_mode_ability_name("Sanctum HM Mode Marker"));
        assert!(!is_hard_mode_ability_name("Hammer of Might"));
        assert!(!is_hard_mode_ability_name("HM Banner"));
    }
}
