use database::{DbError, MissingEntity};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// The student or semester to recalculate does not exist. Nothing was
    /// written.
    #[error("Cannot recalculate performance: the {0} does not exist.")]
    NotFound(MissingEntity),

    #[error("Storage error: {0}")]
    Store(DbError),
}

impl EngineError {
    /// Whether retrying the same operation later could succeed. Invalid
    /// stored data and failed migrations stay broken until someone fixes
    /// them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Store(DbError::ConnectionError(_) | DbError::Unavailable(_))
        )
    }
}

impl From<DbError> for EngineError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::NotFound(entity) => EngineError::NotFound(entity),
            other => EngineError::Store(other),
        }
    }
}
