use crate::error::EngineError;
use crate::locks::KeyedLocks;
use analytics::PerformanceCalculator;
use chrono::{DateTime, Utc};
use core_types::{ClassId, SemesterId, StudentId};
use database::{
    DbError, IndicatorBatch, OverallIndicatorWrite, PerformanceStore, RecalculatedIndicators,
    RecalculationScope, SubjectAverageWrite,
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// What one recalculation wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecalculationSummary {
    pub student_id: StudentId,
    pub semester_id: SemesterId,
    /// Subject indicators upserted.
    pub subject_indicators: usize,
    /// Stale subject indicators deleted.
    pub removed: usize,
    /// `None` when the student has no overall average this semester; any
    /// existing overall indicator was left as it was.
    pub overall: Option<OverallIndicatorWrite>,
}

/// Outcome of recalculating a whole class.
#[derive(Debug, Default)]
pub struct ClassRecalculation {
    pub recalculated: Vec<RecalculationSummary>,
    pub failed: Vec<(StudentId, EngineError)>,
}

/// Re-derives and persists every indicator of a (student, semester) pair.
///
/// Each recalculation hands `derive` to the store, which reads one
/// consistent snapshot and writes the derived batch as a single unit under
/// the pair's lock. The store's lock also holds across processes sharing a
/// database; the in-process lock keeps same-pair callers of one orchestrator
/// from queueing on it. Different pairs run concurrently.
pub struct IndicatorOrchestrator {
    store: Arc<dyn PerformanceStore>,
    calculator: PerformanceCalculator,
    locks: KeyedLocks<(StudentId, SemesterId)>,
}

impl IndicatorOrchestrator {
    pub fn new(store: Arc<dyn PerformanceStore>) -> Self {
        Self {
            store,
            calculator: PerformanceCalculator::new(),
            locks: KeyedLocks::new(),
        }
    }

    #[tracing::instrument(skip_all, fields(student_id = %student_id, semester_id = %semester_id))]
    pub async fn recalculate_all(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> Result<RecalculationSummary, EngineError> {
        let _guard = self.locks.lock((student_id, semester_id)).await;

        let derive = |scope: &RecalculationScope| self.derive(scope, Utc::now());
        let RecalculatedIndicators { batch, applied } =
            match self.store.recalculate(student_id, semester_id, &derive).await {
                Ok(recalculated) => recalculated,
                Err(DbError::NotFound(entity)) => {
                    tracing::error!(missing = %entity, "Cannot recalculate performance indicators.");
                    return Err(EngineError::NotFound(entity));
                }
                Err(e) => return Err(EngineError::Store(e)),
            };

        let summary = RecalculationSummary {
            student_id,
            semester_id,
            subject_indicators: batch.subject_averages.len(),
            removed: applied.removed,
            overall: batch.overall,
        };
        tracing::info!(
            subjects = summary.subject_indicators,
            removed = summary.removed,
            overall_average = ?summary.overall.map(|o| o.average),
            "Performance indicators recalculated."
        );
        Ok(summary)
    }

    /// Computes the indicator batch for the scope's student and semester.
    /// Pure: reads nothing but `scope`.
    pub fn derive(&self, scope: &RecalculationScope, calculated_at: DateTime<Utc>) -> IndicatorBatch {
        let student_id = scope.student.id;
        let semester_id = scope.semester.id;
        let book = &scope.grades;

        let subject_averages = book
            .subjects_of(student_id, semester_id)
            .into_iter()
            .filter_map(|subject_id| {
                self.calculator
                    .subject_average(book, student_id, subject_id, semester_id)
                    .map(|average| SubjectAverageWrite {
                        subject_id,
                        average,
                    })
            })
            .collect();

        let overall = self
            .calculator
            .overall_average(book, student_id, semester_id)
            .map(|average| {
                let progression_percentage = scope.previous_semester.as_ref().and_then(|previous| {
                    self.calculator
                        .progression(book, student_id, semester_id, previous.id)
                });
                let class_rank = self.calculator.class_rank(
                    book,
                    &scope.roster,
                    student_id,
                    semester_id,
                    average,
                );
                let statistics = self
                    .calculator
                    .class_statistics(book, &scope.roster, semester_id);

                OverallIndicatorWrite {
                    average,
                    standard_deviation: statistics.standard_deviation,
                    progression_percentage,
                    class_rank,
                }
            });

        IndicatorBatch {
            student_id,
            semester_id,
            subject_averages,
            overall,
            calculated_at,
        }
    }

    /// Recalculates every active student of a class. A single student's
    /// recalculation does not refresh classmates' ranks; this does.
    pub async fn recalculate_class(
        &self,
        class_id: ClassId,
        semester_id: SemesterId,
    ) -> Result<ClassRecalculation, EngineError> {
        let roster = self.store.class_roster(class_id).await?;
        tracing::info!(
            class_id = %class_id,
            semester_id = %semester_id,
            students = roster.len(),
            "Recalculating class."
        );

        let results = join_all(
            roster
                .iter()
                .map(|student_id| self.recalculate_all(*student_id, semester_id)),
        )
        .await;

        let mut outcome = ClassRecalculation::default();
        for (student_id, result) in roster.into_iter().zip(results) {
            match result {
                Ok(summary) => outcome.recalculated.push(summary),
                Err(e) => outcome.failed.push((student_id, e)),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analytics::{GradeBook, GradeEntry};
    use chrono::NaiveDate;
    use core_types::{ClassId, GradeKey, Semester, Student, SubjectId};
    use database::MemoryStore;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn student(id: i64) -> Student {
        Student {
            id: StudentId(id),
            student_code: format!("STU{id:03}"),
            first_name: "Ada".to_string(),
            last_name: format!("Student{id}"),
            class_id: ClassId(1),
            enrollment_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            is_active: true,
        }
    }

    fn semester(id: i64, start: (i32, u32, u32)) -> Semester {
        let start_date = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
        Semester {
            id: SemesterId(id),
            name: format!("S{id}"),
            start_date,
            end_date: start_date + chrono::Duration::days(120),
            academic_year: "2024-2025".to_string(),
            is_current: false,
        }
    }

    fn entry(student: i64, subject: i64, semester: i64, value: Decimal, coefficient: Decimal) -> GradeEntry {
        GradeEntry::new(
            GradeKey {
                student_id: StudentId(student),
                subject_id: SubjectId(subject),
                semester_id: SemesterId(semester),
            },
            value,
            coefficient,
        )
    }

    fn orchestrator() -> IndicatorOrchestrator {
        IndicatorOrchestrator::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn derive_builds_the_full_batch() {
        let grades: GradeBook = vec![
            entry(1, 1, 2, dec!(16), dec!(2)),
            entry(1, 2, 2, dec!(14), dec!(1.5)),
            entry(1, 1, 1, dec!(14), dec!(2)),
            entry(2, 1, 2, dec!(18), dec!(2)),
            entry(3, 1, 2, dec!(10), dec!(2)),
        ]
        .into_iter()
        .collect();
        let scope = RecalculationScope {
            student: student(1),
            semester: semester(2, (2025, 2, 1)),
            previous_semester: Some(semester(1, (2024, 9, 1))),
            roster: vec![StudentId(1), StudentId(2), StudentId(3)],
            grades,
        };

        let batch = orchestrator().derive(&scope, Utc::now());

        assert_eq!(batch.subject_ids(), vec![SubjectId(1), SubjectId(2)]);
        assert_eq!(batch.subject_averages[0].average, dec!(16));
        let overall = batch.overall.unwrap();
        assert_eq!(overall.average, dec!(15.14));
        // 14.00 -> 15.14
        assert_eq!(overall.progression_percentage, Some(dec!(8.14)));
        assert_eq!(overall.class_rank, Some(2));
        // Population deviation of 15.14, 18.00 and 10.00.
        assert_eq!(overall.standard_deviation, Some(dec!(3.31)));
    }

    #[test]
    fn derive_without_grades_has_no_overall() {
        let scope = RecalculationScope {
            student: student(1),
            semester: semester(1, (2024, 9, 1)),
            previous_semester: None,
            roster: vec![StudentId(1)],
            grades: GradeBook::new(),
        };

        let batch = orchestrator().derive(&scope, Utc::now());
        assert!(batch.subject_averages.is_empty());
        assert!(batch.overall.is_none());
    }

    #[test]
    fn first_semester_has_no_progression() {
        let scope = RecalculationScope {
            student: student(1),
            semester: semester(1, (2024, 9, 1)),
            previous_semester: None,
            roster: vec![StudentId(1)],
            grades: vec![entry(1, 1, 1, dec!(12), dec!(1))].into_iter().collect(),
        };

        let overall = orchestrator().derive(&scope, Utc::now()).overall.unwrap();
        assert_eq!(overall.progression_percentage, None);
        assert_eq!(overall.class_rank, Some(1));
        assert_eq!(overall.standard_deviation, Some(dec!(0.00)));
    }
}
