//! # Acumen Core Types
//!
//! The shared vocabulary of the workspace: entity identifiers, the academic
//! directory (classes, students, subjects, semesters), grades and the derived
//! performance indicators. Every other crate depends on this one and it
//! depends on no other workspace crate.

pub mod enums;
pub mod error;
pub mod ids;
pub mod structs;
pub mod values;

// Re-export the core types to provide a clean public API.
pub use enums::PerformanceBand;
pub use error::CoreError;
pub use ids::{ClassId, SemesterId, StudentId, SubjectId, UserId};
pub use structs::{
    Class, Grade, GradeKey, PerformanceIndicator, Semester, Student, Subject,
};
pub use values::{Coefficient, GradeValue, round_half_even};
