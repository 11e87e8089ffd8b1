//! Read-only user identity lookup (display names, last seen).

use std::collections::HashMap;

use async_trait::async_trait;
use karaoke_core::types::Timestamp;
use karaoke_db::repositories::UserRepo;
use karaoke_db::DbPool;
use serde::Serialize;

use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub user_name: String,
    pub display_name: String,
    pub last_seen_at: Option<Timestamp>,
}

pub type IdentityMap = HashMap<String, UserIdentity>;

#[async_trait]
pub trait IdentityLookup: Send + Sync {
    /// Bulk lookup. Unknown users are absent from the map.
    async fn lookup(&self, user_names: &[String]) -> EngineResult<IdentityMap>;
}

/// Display name for `user_name`, falling back to the user name itself.
pub fn display_name<'a>(identities: &'a IdentityMap, user_name: &'a str) -> &'a str {
    identities
        .get(user_name)
        .map(|identity| identity.display_name.as_str())
        .unwrap_or(user_name)
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Identities backed by the `users` table.
#[derive(Debug, Clone)]
pub struct PgIdentityLookup {
    pool: DbPool,
}

impl PgIdentityLookup {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityLookup for PgIdentityLookup {
    async fn lookup(&self, user_names: &[String]) -> EngineResult<IdentityMap> {
        if user_names.is_empty() {
            return Ok(IdentityMap::new());
        }
        let rows = UserRepo::find_by_names(&self.pool, user_names).await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.user_name.clone(),
                    UserIdentity {
                        user_name: row.user_name,
                        display_name: row.display_name,
                        last_seen_at: row.last_seen_at,
                    },
                )
            })
            .collect())
    }
}

/// Fixed identities, for tests and deployments without a user directory.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentities {
    users: IdentityMap,
}

impl StaticIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_name: &str, display_name: &str) -> Self {
        self.users.insert(
            user_name.to_string(),
            UserIdentity {
                user_name: user_name.to_string(),
                display_name: display_name.to_string(),
                last_seen_at: None,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityLookup for StaticIdentities {
    async fn lookup(&self, user_names: &[String]) -> EngineResult<IdentityMap> {
        Ok(user_names
            .iter()
            .filter_map(|name| self.users.get(name).map(|u| (name.clone(), u.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_lookup_returns_known_users_only() {
        let identities = StaticIdentities::new().with_user("alice", "Alice A.");

        let found = identities
            .lookup(&["alice".to_string(), "bob".to_string()])
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(display_name(&found, "alice"), "Alice A.");
        assert_eq!(display_name(&found, "bob"), "bob");
    }
}
