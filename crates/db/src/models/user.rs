//! User row model.

use karaoke_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserRow {
    pub user_name: String,
    pub display_name: String,
    pub last_seen_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// DTO for registering a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub user_name: String,
    pub display_name: String,
}
