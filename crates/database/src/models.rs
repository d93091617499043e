use analytics::GradeBook;
use chrono::{DateTime, Utc};
use core_types::{
    ClassId, GradeKey, GradeValue, PerformanceIndicator, Semester, SemesterId, Student, StudentId,
    SubjectId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Everything the orchestrator needs to re-derive the indicators of one
/// (student, semester) pair, read from a single consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalculationScope {
    pub student: Student,
    pub semester: Semester,
    /// The chronologically preceding semester of the same academic year.
    pub previous_semester: Option<Semester>,
    /// Active students of the student's class, ascending by id.
    pub roster: Vec<StudentId>,
    /// Grades of the roster and of the student in `semester`, plus the
    /// student's grades in `previous_semester`.
    pub grades: GradeBook,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAverageWrite {
    pub subject_id: SubjectId,
    pub average: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallIndicatorWrite {
    pub average: Decimal,
    pub standard_deviation: Option<Decimal>,
    pub progression_percentage: Option<Decimal>,
    pub class_rank: Option<u32>,
}

/// The full result of one recalculation, written in one transaction by
/// `PerformanceStore::recalculate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorBatch {
    pub student_id: StudentId,
    pub semester_id: SemesterId,
    pub subject_averages: Vec<SubjectAverageWrite>,
    pub overall: Option<OverallIndicatorWrite>,
    pub calculated_at: DateTime<Utc>,
}

impl IndicatorBatch {
    pub fn subject_ids(&self) -> Vec<SubjectId> {
        self.subject_averages.iter().map(|w| w.subject_id).collect()
    }
}

/// Row counts touched by an applied batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedIndicators {
    pub upserted: usize,
    pub removed: usize,
}

/// The batch a recalculation derived and what writing it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecalculatedIndicators {
    pub batch: IndicatorBatch,
    pub applied: AppliedIndicators,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndicatorScope {
    #[default]
    All,
    Overall,
    Subjects,
}

/// Filter for indicator lookups. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorFilter {
    pub student_id: Option<StudentId>,
    pub semester_id: Option<SemesterId>,
    pub subject_id: Option<SubjectId>,
    pub class_id: Option<ClassId>,
    pub scope: IndicatorScope,
}

impl IndicatorFilter {
    pub fn overall() -> Self {
        Self {
            scope: IndicatorScope::Overall,
            ..Self::default()
        }
    }

    pub fn subjects() -> Self {
        Self {
            scope: IndicatorScope::Subjects,
            ..Self::default()
        }
    }

    pub fn student(mut self, id: StudentId) -> Self {
        self.student_id = Some(id);
        self
    }

    pub fn semester(mut self, id: SemesterId) -> Self {
        self.semester_id = Some(id);
        self
    }

    pub fn subject(mut self, id: SubjectId) -> Self {
        self.subject_id = Some(id);
        self
    }

    pub fn class(mut self, id: ClassId) -> Self {
        self.class_id = Some(id);
        self
    }

    /// Whether `indicator` passes every criterion except `class_id`, which
    /// needs the directory to resolve.
    pub fn matches(&self, indicator: &PerformanceIndicator) -> bool {
        let scope_ok = match self.scope {
            IndicatorScope::All => true,
            IndicatorScope::Overall => indicator.is_overall(),
            IndicatorScope::Subjects => !indicator.is_overall(),
        };
        scope_ok
            && self.student_id.is_none_or(|id| id == indicator.student_id)
            && self.semester_id.is_none_or(|id| id == indicator.semester_id)
            && self
                .subject_id
                .is_none_or(|id| indicator.subject_id == Some(id))
    }
}

/// A single grade mutation requested by the grade-entry surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeCommand {
    /// Create the grade, or overwrite its value if one exists for the key.
    Record { key: GradeKey, value: GradeValue },
    /// Delete the grade if it exists.
    Remove { key: GradeKey },
}

impl GradeCommand {
    pub fn key(&self) -> GradeKey {
        match self {
            GradeCommand::Record { key, .. } | GradeCommand::Remove { key } => *key,
        }
    }
}
