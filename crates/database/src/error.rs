use core_types::{ClassId, CoreError, SemesterId, StudentId, SubjectId};
use std::fmt;
use thiserror::Error;

/// The directory entity a lookup failed to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingEntity {
    Student(StudentId),
    Semester(SemesterId),
    Subject(SubjectId),
    Class(ClassId),
}

impl fmt::Display for MissingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEntity::Student(id) => write!(f, "student {id}"),
            MissingEntity::Semester(id) => write!(f, "semester {id}"),
            MissingEntity::Subject(id) => write!(f, "subject {id}"),
            MissingEntity::Class(id) => write!(f, "class {id}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Failed to load configuration for database connection: {0}")]
    ConnectionConfigError(String),

    #[error("Database error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("The requested {0} does not exist.")]
    NotFound(MissingEntity),

    #[error("Stored data failed validation: {0}")]
    Invalid(#[from] CoreError),

    #[error("The store is unavailable: {0}")]
    Unavailable(String),
}
