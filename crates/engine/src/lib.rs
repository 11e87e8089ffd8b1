//! Queue orchestration engine for live karaoke events.
//!
//! [`QueueOrchestrator`] owns the decision flow (status resolution,
//! autoplay, the now-playing switch, reorder plans) on top of a
//! transactional [`QueueStore`] and a fire-and-forget
//! [`BroadcastSink`](karaoke_events::BroadcastSink).

pub mod config;
pub mod error;
pub mod hold_cache;
pub mod identity;
pub mod orchestrator;
pub mod payload;
pub mod plans;
pub mod store;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use identity::{IdentityLookup, PgIdentityLookup, StaticIdentities};
pub use orchestrator::{AutoplayOutcome, QueueOrchestrator};
pub use payload::ResolvedEntry;
pub use store::{FinishOutcome, MemoryQueueStore, PgQueueStore, QueueStore};
