//! Row models and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` struct matching the database row
//! - A conversion into the matching `karaoke_core` domain type
//! - A `Deserialize` create DTO where rows are inserted directly

pub mod event;
pub mod presence;
pub mod queue_entry;
pub mod user;
