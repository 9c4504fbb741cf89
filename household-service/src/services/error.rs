use crate::models::ChainBreak;
use service_core::error::AppError;
use thiserror::Error;

/// Failures of ledger operations, independent of the backing store.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Entry {0} not found")]
    NotFound(i64),

    #[error("Datastore unavailable: {0}")]
    DatastoreUnavailable(anyhow::Error),

    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(ChainBreak),
}

impl LedgerError {
    /// Classify a sqlx failure. Connectivity problems become
    /// `DatastoreUnavailable`, numeric overflow in a cascade becomes
    /// `Validation`, everything else is a plain database error.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::WorkerCrashed => {
                LedgerError::DatastoreUnavailable(anyhow::anyhow!("{}: {}", context, err))
            }
            sqlx::Error::Database(ref db_err) if db_err.code().as_deref() == Some("22003") => {
                LedgerError::Validation(format!("{}: balance out of range", context))
            }
            _ => LedgerError::Database(anyhow::anyhow!("{}: {}", context, err)),
        }
    }

    pub(crate) fn overflow(lhs: i64, rhs: i64) -> Self {
        LedgerError::Validation(format!(
            "Balance arithmetic overflows: {} - {}",
            lhs, rhs
        ))
    }

    /// Label for error counters.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "not_found",
            LedgerError::DatastoreUnavailable(_) => "datastore_unavailable",
            LedgerError::Database(_) => "db_error",
            LedgerError::Validation(_) => "validation_error",
            LedgerError::InvariantViolation(_) => "invariant_violation",
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => {
                AppError::NotFound(anyhow::anyhow!("Entry {} not found", id))
            }
            LedgerError::DatastoreUnavailable(e) => AppError::ServiceUnavailable(e),
            LedgerError::Database(e) => AppError::DatabaseError(e),
            LedgerError::Validation(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            LedgerError::InvariantViolation(broken) => {
                AppError::InvariantViolation(anyhow::anyhow!(broken.to_string()))
            }
        }
    }
}
