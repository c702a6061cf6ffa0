//! Session building: the log-level state machine and its records.

pub mod builder;
pub mod info;


pub use builder::{CompletedSession, IngestOptions, SessionBuilder};
pub use info::{
    AbilityDef, EffectDef, MapChange, PlayerInfoSnapshot, SessionDetail, TrialRun, UnitInfo,
    ZoneSegment,
};
