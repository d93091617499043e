use crate::ids::{ClassId, SemesterId, StudentId, SubjectId, UserId};
use crate::values::{Coefficient, GradeValue};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An academic class: the group of students that ranks and class
/// statistics are computed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub level: String,
    /// Format `YYYY-YYYY`.
    pub academic_year: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Student {
    pub id: StudentId,
    /// The institution's own student identifier (e.g. `STU001`).
    pub student_code: String,
    pub first_name: String,
    pub last_name: String,
    pub class_id: ClassId,
    pub enrollment_date: NaiveDate,
    /// Inactive students keep their grades but are left out of class ranks
    /// and class statistics.
    pub is_active: bool,
}

impl Student {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subject {
    pub id: SubjectId,
    pub code: String,
    pub name: String,
    pub coefficient: Coefficient,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Semester {
    pub id: SemesterId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub academic_year: String,
    pub is_current: bool,
}

impl Semester {
    /// Picks the semester that immediately precedes `self` in the same
    /// academic year: the greatest start date strictly before ours.
    pub fn predecessor_in<'a, I>(&self, candidates: I) -> Option<&'a Semester>
    where
        I: IntoIterator<Item = &'a Semester>,
    {
        candidates
            .into_iter()
            .filter(|s| s.academic_year == self.academic_year && s.start_date < self.start_date)
            .max_by_key(|s| (s.start_date, s.id))
    }
}

/// The natural key of a grade. The grade store holds at most one grade
/// per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GradeKey {
    pub student_id: StudentId,
    pub subject_id: SubjectId,
    pub semester_id: SemesterId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grade {
    pub key: GradeKey,
    pub value: GradeValue,
    pub entered_by: UserId,
    pub entered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A derived performance metric row. Never authored directly: only the
/// recalculation orchestrator writes these.
///
/// `subject_id == None` marks the overall indicator of the
/// (student, semester) pair. Subject indicators only carry `average`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceIndicator {
    pub student_id: StudentId,
    pub semester_id: SemesterId,
    pub subject_id: Option<SubjectId>,
    pub average: Decimal,
    pub standard_deviation: Option<Decimal>,
    pub progression_percentage: Option<Decimal>,
    pub class_rank: Option<u32>,
    pub calculated_at: DateTime<Utc>,
}

impl PerformanceIndicator {
    pub fn is_overall(&self) -> bool {
        self.subject_id.is_none()
    }

    /// Compares every derived field, ignoring `calculated_at`.
    pub fn same_values(&self, other: &PerformanceIndicator) -> bool {
        self.student_id == other.student_id
            && self.semester_id == other.semester_id
            && self.subject_id == other.subject_id
            && self.average == other.average
            && self.standard_deviation == other.standard_deviation
            && self.progression_percentage == other.progression_percentage
            && self.class_rank == other.class_rank
    }
}
