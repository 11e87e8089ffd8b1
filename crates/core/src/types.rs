/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Monotonic per-event queue version used for optimistic concurrency.
pub type QueueVersion = i64;
