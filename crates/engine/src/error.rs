use karaoke_core::error::CoreError;

/// Error type for engine operations.
///
/// Domain failures (not found, validation, conflicts) arrive as
/// [`CoreError`]; storage failures as [`sqlx::Error`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    /// Stable machine-readable code for callers that relay errors.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Core(core) => match core {
                CoreError::NotFound { .. } => "NOT_FOUND",
                CoreError::Validation(_) => "VALIDATION_ERROR",
                CoreError::StaleVersion { .. } => "STALE_VERSION",
                CoreError::Conflict(_)
                | CoreError::SingerStatusConflict { .. }
                | CoreError::AttendanceConflict { .. } => "CONFLICT",
                CoreError::Internal(_) => "INTERNAL_ERROR",
            },
            Self::Database(err) => classify_sqlx_error(err),
        }
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Core(core) => core.is_conflict(),
            Self::Database(_) => self.code() == "CONFLICT",
        }
    }

    /// The domain error, if this is one.
    pub fn as_core(&self) -> Option<&CoreError> {
        match self {
            Self::Core(core) => Some(core),
            Self::Database(_) => None,
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Core(CoreError::Validation(errors.to_string()))
    }
}

/// Unique violations on `uq_` constraints are conflicts (for example a
/// second playing entry); everything else is internal.
fn classify_sqlx_error(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::RowNotFound => "NOT_FOUND",
        sqlx::Error::Database(db_err)
            if db_err.code().as_deref() == Some("23505")
                && db_err.constraint().is_some_and(|c| c.starts_with("uq_")) =>
        {
            "CONFLICT"
        }
        _ => "INTERNAL_ERROR",
    }
}
