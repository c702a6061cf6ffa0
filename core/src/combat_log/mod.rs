//! Encounter log wire format: framing, tokenisation and the event model.

pub mod event;
pub mod record;
pub mod tokenizer;
pub mod unit_frame;

pub use event::{
    CastBegin, CastEnd, CombatRecord, EffectChange, EffectChangeKind, EquipmentPiece, Event,
    HealthRegen, PlayerLoadout, UnitAdded, UnitChanged, parse_event,
};
pub use record::{Frame, frame_line};
pub use unit_frame::{Fields, Pool, UnitFrame, read_unit_frame};
