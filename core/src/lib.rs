pub mod cancel;
pub mod combat_log;
pub mod error;
pub mod fight;
pub mod game_data;
pub mod import;
pub mod index;
pub mod query;
pub mod service;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use cancel::CancelToken;
pub use error::{ImportError, StoreError};
pub use fight::{CombatAgg, FightDetail, FightSeriesPoint, FightSummary};
pub use import::ingest_file;
pub use index::LogIndex;
pub use query::{AbilityAggregate, AggFilter, RangeStats};
pub use service::LogService;
pub use session::{CompletedSession, IngestOptions, SessionBuilder, SessionDetail};
pub use store::{LogStore, SessionSummary, StoreWriter};
