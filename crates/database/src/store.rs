use crate::error::DbError;
use crate::models::{
    GradeCommand, IndicatorBatch, IndicatorFilter, RecalculatedIndicators, RecalculationScope,
};
use analytics::{GradeRecord, IndicatorRecord};
use async_trait::async_trait;
use core_types::{
    Class, ClassId, PerformanceIndicator, Semester, SemesterId, Student, StudentId, Subject,
    UserId,
};
use events::GradeChange;

/// The storage the recalculation orchestrator works against.
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    /// Recalculates one (student, semester) pair as a single locked unit.
    ///
    /// The store takes the pair's lock, loads a consistent snapshot, hands it
    /// to `derive` and writes the returned batch before releasing the lock.
    /// Any other recalculation of the same pair, from this process or
    /// another, runs strictly before or strictly after, so the last one to
    /// write always read the latest committed grades.
    ///
    /// Writing a batch:
    /// 1. removes subject indicators of the pair whose subject is not listed,
    /// 2. upserts every listed subject average (only `average` is refreshed),
    /// 3. upserts the overall indicator if present. An absent `overall`
    ///    leaves any existing overall indicator untouched.
    ///
    /// Fails with `DbError::NotFound`, writing nothing, when the student or
    /// the semester does not exist.
    async fn recalculate(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
        derive: &(dyn for<'s> Fn(&'s RecalculationScope) -> IndicatorBatch + Send + Sync),
    ) -> Result<RecalculatedIndicators, DbError>;

    /// Active students of a class, ascending by id.
    async fn class_roster(&self, class_id: ClassId) -> Result<Vec<StudentId>, DbError>;
}

/// Read accessors consumed by the reporting queries.
#[async_trait]
pub trait IndicatorReader: Send + Sync {
    /// Indicators matching `filter`, most recently calculated first.
    async fn find_indicators(
        &self,
        filter: &IndicatorFilter,
    ) -> Result<Vec<PerformanceIndicator>, DbError>;

    /// Like `find_indicators`, joined with semester and subject.
    async fn find_indicator_records(
        &self,
        filter: &IndicatorFilter,
    ) -> Result<Vec<IndicatorRecord>, DbError>;

    /// Active students, optionally restricted to a class and/or one student.
    async fn count_active_students(
        &self,
        class_id: Option<ClassId>,
        student_id: Option<StudentId>,
    ) -> Result<usize, DbError>;

    async fn student_with_class(&self, student_id: StudentId) -> Result<(Student, Class), DbError>;

    /// Every grade of a student, joined with subject and semester.
    async fn grade_records(&self, student_id: StudentId) -> Result<Vec<GradeRecord>, DbError>;
}

/// The grade store's write side.
#[async_trait]
pub trait GradeStore: Send + Sync {
    /// Applies every command in one transaction and returns the resulting
    /// changes. Nothing is written if any command fails.
    ///
    /// Recording a value equal to the stored one and removing an absent
    /// grade are no-ops and produce no change.
    async fn commit_grades(
        &self,
        commands: &[GradeCommand],
        actor: UserId,
    ) -> Result<Vec<GradeChange>, DbError>;
}

/// Upserts for the academic directory. The directory is owned upstream;
/// ids are assigned there and passed in.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn upsert_class(&self, class: &Class) -> Result<(), DbError>;
    async fn upsert_student(&self, student: &Student) -> Result<(), DbError>;
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), DbError>;
    async fn upsert_semester(&self, semester: &Semester) -> Result<(), DbError>;
}
