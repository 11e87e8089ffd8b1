//! Repository for the `users` table.

use sqlx::PgPool;

use crate::models::user::{CreateUser, UserRow};

const COLUMNS: &str = "user_name, display_name, last_seen_at, created_at";

pub struct UserRepo;

impl UserRepo {
    /// Insert a user, or refresh the display name of an existing one.
    pub async fn upsert(pool: &PgPool, input: &CreateUser) -> Result<UserRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (user_name, display_name) VALUES ($1, $2)
             ON CONFLICT (user_name) DO UPDATE SET display_name = EXCLUDED.display_name
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, UserRow>(&query)
            .bind(&input.user_name)
            .bind(&input.display_name)
            .fetch_one(pool)
            .await
    }

    /// Bulk lookup. Unknown names are simply absent from the result.
    pub async fn find_by_names(
        pool: &PgPool,
        user_names: &[String],
    ) -> Result<Vec<UserRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE user_name = ANY($1)");
        sqlx::query_as::<_, UserRow>(&query)
            .bind(user_names)
            .fetch_all(pool)
            .await
    }
}
