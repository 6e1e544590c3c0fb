use thiserror::Error;

pub type Result<T> = std::result::Result<T, AttendanceError>;

#[derive(Debug, Error)]
pub enum AttendanceError {
    /// Bad input, rejected before anything is written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Recognition service unreachable, timed out or answered with an error.
    #[error("recognition service unavailable: {0}")]
    Upstream(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

impl AttendanceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AttendanceError::Upstream(_))
    }
}

impl From<sqlx::Error> for AttendanceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AttendanceError::NotFound("row".to_string()),
            other => AttendanceError::Persistence(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AttendanceError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AttendanceError::Persistence(err.to_string())
    }
}

impl From<reqwest::Error> for AttendanceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AttendanceError::Upstream(format!("request timed out: {err}"))
        } else {
            AttendanceError::Upstream(err.to_string())
        }
    }
}
