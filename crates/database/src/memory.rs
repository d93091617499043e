use crate::error::{DbError, MissingEntity};
use crate::models::{
    AppliedIndicators, GradeCommand, IndicatorBatch, IndicatorFilter, RecalculatedIndicators,
    RecalculationScope,
};
use crate::store::{DirectoryStore, GradeStore, IndicatorReader, PerformanceStore};
use analytics::{GradeBook, GradeEntry, GradeRecord, IndicatorRecord};
use async_trait::async_trait;
use chrono::Utc;
use core_types::{
    Class, ClassId, Grade, GradeKey, PerformanceIndicator, Semester, SemesterId, Student,
    StudentId, Subject, SubjectId, UserId,
};
use events::GradeChange;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type IndicatorKey = (StudentId, SemesterId, Option<SubjectId>);

#[derive(Debug, Default)]
struct Tables {
    classes: BTreeMap<ClassId, Class>,
    students: BTreeMap<StudentId, Student>,
    subjects: BTreeMap<SubjectId, Subject>,
    semesters: BTreeMap<SemesterId, Semester>,
    grades: BTreeMap<GradeKey, Grade>,
    indicators: BTreeMap<IndicatorKey, PerformanceIndicator>,
    unavailable: bool,
}

impl Tables {
    fn student(&self, id: StudentId) -> Result<&Student, DbError> {
        self.students
            .get(&id)
            .ok_or(DbError::NotFound(MissingEntity::Student(id)))
    }

    fn semester(&self, id: SemesterId) -> Result<&Semester, DbError> {
        self.semesters
            .get(&id)
            .ok_or(DbError::NotFound(MissingEntity::Semester(id)))
    }

    fn check_grade_key(&self, key: &GradeKey) -> Result<(), DbError> {
        self.student(key.student_id)?;
        self.semester(key.semester_id)?;
        if !self.subjects.contains_key(&key.subject_id) {
            return Err(DbError::NotFound(MissingEntity::Subject(key.subject_id)));
        }
        Ok(())
    }

    fn class_of(&self, student_id: StudentId) -> Option<ClassId> {
        self.students.get(&student_id).map(|s| s.class_id)
    }

    fn load_scope(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> Result<RecalculationScope, DbError> {
        let student = self.student(student_id)?.clone();
        let semester = self.semester(semester_id)?.clone();
        let previous_semester = semester.predecessor_in(self.semesters.values()).cloned();
        let previous_id = previous_semester.as_ref().map(|s| s.id);

        let roster: Vec<StudentId> = self
            .students
            .values()
            .filter(|s| s.is_active && s.class_id == student.class_id)
            .map(|s| s.id)
            .collect();

        let grades: GradeBook = self
            .grades
            .values()
            .filter(|g| {
                let key = g.key;
                let in_class = key.student_id == student_id
                    || roster.binary_search(&key.student_id).is_ok();
                (key.semester_id == semester_id && in_class)
                    || (key.student_id == student_id && Some(key.semester_id) == previous_id)
            })
            .filter_map(|g| {
                let subject = self.subjects.get(&g.key.subject_id)?;
                Some(GradeEntry::new(
                    g.key,
                    g.value.value(),
                    subject.coefficient.value(),
                ))
            })
            .collect();

        tracing::debug!(
            student_id = %student_id,
            semester_id = %semester_id,
            roster = roster.len(),
            grades = grades.len(),
            "Loaded recalculation scope."
        );

        Ok(RecalculationScope {
            student,
            semester,
            previous_semester,
            roster,
            grades,
        })
    }

    fn apply(&mut self, batch: &IndicatorBatch) -> AppliedIndicators {
        let (student_id, semester_id) = (batch.student_id, batch.semester_id);
        let kept = batch.subject_ids();
        let mut applied = AppliedIndicators::default();

        let stale: Vec<IndicatorKey> = self
            .indicators
            .keys()
            .filter(|(s, m, subject)| {
                *s == student_id
                    && *m == semester_id
                    && subject.is_some_and(|id| !kept.contains(&id))
            })
            .copied()
            .collect();
        for key in stale {
            self.indicators.remove(&key);
            applied.removed += 1;
        }

        for write in &batch.subject_averages {
            self
                .indicators
                .entry((student_id, semester_id, Some(write.subject_id)))
                .and_modify(|existing| {
                    existing.average = write.average;
                    existing.calculated_at = batch.calculated_at;
                })
                .or_insert_with(|| PerformanceIndicator {
                    student_id,
                    semester_id,
                    subject_id: Some(write.subject_id),
                    average: write.average,
                    standard_deviation: None,
                    progression_percentage: None,
                    class_rank: None,
                    calculated_at: batch.calculated_at,
                });
            applied.upserted += 1;
        }

        if let Some(overall) = &batch.overall {
            self.indicators.insert(
                (student_id, semester_id, None),
                PerformanceIndicator {
                    student_id,
                    semester_id,
                    subject_id: None,
                    average: overall.average,
                    standard_deviation: overall.standard_deviation,
                    progression_percentage: overall.progression_percentage,
                    class_rank: overall.class_rank,
                    calculated_at: batch.calculated_at,
                },
            );
            applied.upserted += 1;
        }

        applied
    }

    fn matching_indicators<'a>(
        &'a self,
        filter: &'a IndicatorFilter,
    ) -> Vec<&'a PerformanceIndicator> {
        let mut found: Vec<&PerformanceIndicator> = self
            .indicators
            .values()
            .filter(|i| filter.matches(i))
            .filter(|i| {
                filter
                    .class_id
                    .is_none_or(|class_id| self.class_of(i.student_id) == Some(class_id))
            })
            .collect();
        found.sort_by(|a, b| b.calculated_at.cmp(&a.calculated_at));
        found
    }
}

/// An in-process implementation of every store trait.
///
/// Cloning shares the underlying tables. Each trait method takes the lock
/// once, so every write is atomic with respect to every read.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent trait call fail with `DbError::Unavailable`
    /// until reset. Used to exercise failure handling.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.tables.write().await.unavailable = unavailable;
    }

    pub async fn grade(&self, key: GradeKey) -> Option<Grade> {
        self.tables.read().await.grades.get(&key).cloned()
    }

    /// Every stored indicator, ordered by (student, semester, subject) with
    /// the overall indicator first.
    pub async fn indicators(&self) -> Vec<PerformanceIndicator> {
        self.tables.read().await.indicators.values().cloned().collect()
    }

    async fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, DbError> {
        let tables = self.tables.read().await;
        if tables.unavailable {
            return Err(DbError::Unavailable("memory store is offline".to_string()));
        }
        Ok(tables)
    }

    async fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, DbError> {
        let tables = self.tables.write().await;
        if tables.unavailable {
            return Err(DbError::Unavailable("memory store is offline".to_string()));
        }
        Ok(tables)
    }
}

#[async_trait]
impl PerformanceStore for MemoryStore {
    async fn recalculate(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
        derive: &(dyn for<'s> Fn(&'s RecalculationScope) -> IndicatorBatch + Send + Sync),
    ) -> Result<RecalculatedIndicators, DbError> {
        // One write guard spans the snapshot read and the batch write.
        let mut tables = self.write().await?;
        let scope = tables.load_scope(student_id, semester_id)?;
        let batch = derive(&scope);
        let applied = tables.apply(&batch);
        Ok(RecalculatedIndicators { batch, applied })
    }

    async fn class_roster(&self, class_id: ClassId) -> Result<Vec<StudentId>, DbError> {
        let tables = self.read().await?;
        if !tables.classes.contains_key(&class_id) {
            return Err(DbError::NotFound(MissingEntity::Class(class_id)));
        }
        Ok(tables
            .students
            .values()
            .filter(|s| s.is_active && s.class_id == class_id)
            .map(|s| s.id)
            .collect())
    }
}

#[async_trait]
impl IndicatorReader for MemoryStore {
    async fn find_indicators(
        &self,
        filter: &IndicatorFilter,
    ) -> Result<Vec<PerformanceIndicator>, DbError> {
        let tables = self.read().await?;
        Ok(tables
            .matching_indicators(filter)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn find_indicator_records(
        &self,
        filter: &IndicatorFilter,
    ) -> Result<Vec<IndicatorRecord>, DbError> {
        let tables = self.read().await?;
        let mut records = Vec::new();
        for indicator in tables.matching_indicators(filter) {
            let semester = tables.semester(indicator.semester_id)?.clone();
            let subject = match indicator.subject_id {
                Some(id) => Some(
                    tables
                        .subjects
                        .get(&id)
                        .cloned()
                        .ok_or(DbError::NotFound(MissingEntity::Subject(id)))?,
                ),
                None => None,
            };
            records.push(IndicatorRecord {
                indicator: indicator.clone(),
                semester,
                subject,
            });
        }
        Ok(records)
    }

    async fn count_active_students(
        &self,
        class_id: Option<ClassId>,
        student_id: Option<StudentId>,
    ) -> Result<usize, DbError> {
        let tables = self.read().await?;
        Ok(tables
            .students
            .values()
            .filter(|s| s.is_active)
            .filter(|s| class_id.is_none_or(|id| s.class_id == id))
            .filter(|s| student_id.is_none_or(|id| s.id == id))
            .count())
    }

    async fn student_with_class(&self, student_id: StudentId) -> Result<(Student, Class), DbError> {
        let tables = self.read().await?;
        let student = tables.student(student_id)?.clone();
        let class = tables
            .classes
            .get(&student.class_id)
            .cloned()
            .ok_or(DbError::NotFound(MissingEntity::Class(student.class_id)))?;
        Ok((student, class))
    }

    async fn grade_records(&self, student_id: StudentId) -> Result<Vec<GradeRecord>, DbError> {
        let tables = self.read().await?;
        tables
            .grades
            .values()
            .filter(|g| g.key.student_id == student_id)
            .map(|g| -> Result<GradeRecord, DbError> {
                let subject = tables
                    .subjects
                    .get(&g.key.subject_id)
                    .cloned()
                    .ok_or(DbError::NotFound(MissingEntity::Subject(g.key.subject_id)))?;
                let semester = tables.semester(g.key.semester_id)?.clone();
                Ok(GradeRecord {
                    grade: g.clone(),
                    subject,
                    semester,
                })
            })
            .collect()
    }
}

#[async_trait]
impl GradeStore for MemoryStore {
    async fn commit_grades(
        &self,
        commands: &[GradeCommand],
        actor: UserId,
    ) -> Result<Vec<GradeChange>, DbError> {
        let mut tables = self.write().await?;

        // Validate everything before touching anything so a failing command
        // leaves the store as it was.
        for command in commands {
            tables.check_grade_key(&command.key())?;
        }

        let now = Utc::now();
        let mut changes = Vec::new();
        for command in commands {
            match *command {
                GradeCommand::Record { key, value } => match tables.grades.entry(key) {
                    Entry::Occupied(mut slot) => {
                        let existing = slot.get_mut();
                        if existing.value != value {
                            changes.push(GradeChange::updated(key, existing.value, value));
                            existing.value = value;
                            existing.entered_by = actor;
                            existing.updated_at = now;
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(Grade {
                            key,
                            value,
                            entered_by: actor,
                            entered_at: now,
                            updated_at: now,
                        });
                        changes.push(GradeChange::created(key, value));
                    }
                },
                GradeCommand::Remove { key } => {
                    if let Some(removed) = tables.grades.remove(&key) {
                        changes.push(GradeChange::deleted(key, removed.value));
                    }
                }
            }
        }

        Ok(changes)
    }
}

#[async_trait]
impl DirectoryStore for MemoryStore {
    async fn upsert_class(&self, class: &Class) -> Result<(), DbError> {
        self.write().await?.classes.insert(class.id, class.clone());
        Ok(())
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), DbError> {
        let mut tables = self.write().await?;
        if !tables.classes.contains_key(&student.class_id) {
            return Err(DbError::NotFound(MissingEntity::Class(student.class_id)));
        }
        tables.students.insert(student.id, student.clone());
        Ok(())
    }

    async fn upsert_subject(&self, subject: &Subject) -> Result<(), DbError> {
        self.write().await?.subjects.insert(subject.id, subject.clone());
        Ok(())
    }

    async fn upsert_semester(&self, semester: &Semester) -> Result<(), DbError> {
        self.write().await?.semesters.insert(semester.id, semester.clone());
        Ok(())
    }
}

#[cfg(test)]
impl MemoryStore {
    /// One class of three active students and one inactive student, two
    /// subjects (coefficients 2.00 and 1.50) and two semesters of 2024-2025.
    pub(crate) async fn with_demo_directory() -> Self {
        use chrono::NaiveDate;
        use core_types::Coefficient;
        use rust_decimal_macros::dec;

        let store = MemoryStore::new();
        store
            .upsert_class(&Class {
                id: ClassId(1),
                name: "Terminale S1".to_string(),
                level: "Terminale".to_string(),
                academic_year: "2024-2025".to_string(),
            })
            .await
            .unwrap();
        for (id, active) in [(1, true), (2, true), (3, true), (4, false)] {
            store
                .upsert_student(&Student {
                    id: StudentId(id),
                    student_code: format!("STU00{id}"),
                    first_name: format!("First{id}"),
                    last_name: format!("Last{id}"),
                    class_id: ClassId(1),
                    enrollment_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
                    is_active: active,
                })
                .await
                .unwrap();
        }
        for (id, code, name, coefficient) in [
            (1, "MATH", "Mathematics", dec!(2.00)),
            (2, "FR", "French", dec!(1.50)),
        ] {
            store
                .upsert_subject(&Subject {
                    id: SubjectId(id),
                    code: code.to_string(),
                    name: name.to_string(),
                    coefficient: Coefficient::new(coefficient).unwrap(),
                })
                .await
                .unwrap();
        }
        for (id, name, start, end) in [
            (1, "Semester 1", (2024, 9, 1), (2025, 1, 31)),
            (2, "Semester 2", (2025, 2, 1), (2025, 6, 30)),
        ] {
            store
                .upsert_semester(&Semester {
                    id: SemesterId(id),
                    name: name.to_string(),
                    start_date: NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap(),
                    end_date: NaiveDate::from_ymd_opt(end.0, end.1, end.2).unwrap(),
                    academic_year: "2024-2025".to_string(),
                    is_current: id == 2,
                })
                .await
                .unwrap();
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OverallIndicatorWrite, SubjectAverageWrite};
    use core_types::GradeValue;
    use events::GradeChangeKind;
    use rust_decimal_macros::dec;

    fn key(student: i64, subject: i64, semester: i64) -> GradeKey {
        GradeKey {
            student_id: StudentId(student),
            subject_id: SubjectId(subject),
            semester_id: SemesterId(semester),
        }
    }

    fn record(student: i64, subject: i64, semester: i64, value: rust_decimal::Decimal) -> GradeCommand {
        GradeCommand::Record {
            key: key(student, subject, semester),
            value: GradeValue::new(value).unwrap(),
        }
    }

    fn batch(subjects: &[(i64, rust_decimal::Decimal)], overall: Option<rust_decimal::Decimal>) -> IndicatorBatch {
        IndicatorBatch {
            student_id: StudentId(1),
            semester_id: SemesterId(1),
            subject_averages: subjects
                .iter()
                .map(|(id, average)| SubjectAverageWrite {
                    subject_id: SubjectId(*id),
                    average: *average,
                })
                .collect(),
            overall: overall.map(|average| OverallIndicatorWrite {
                average,
                standard_deviation: Some(dec!(1.00)),
                progression_percentage: None,
                class_rank: Some(1),
            }),
            calculated_at: Utc::now(),
        }
    }

    fn empty_batch(scope: &RecalculationScope) -> IndicatorBatch {
        IndicatorBatch {
            student_id: scope.student.id,
            semester_id: scope.semester.id,
            subject_averages: Vec::new(),
            overall: None,
            calculated_at: Utc::now(),
        }
    }

    /// Writes `fixed` through a recalculation, ignoring the snapshot.
    async fn write_batch(store: &MemoryStore, fixed: IndicatorBatch) -> RecalculatedIndicators {
        store
            .recalculate(fixed.student_id, fixed.semester_id, &|_: &RecalculationScope| {
                fixed.clone()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn commit_reports_created_updated_and_deleted() {
        let store = MemoryStore::with_demo_directory().await;

        let changes = store
            .commit_grades(&[record(1, 1, 1, dec!(12))], UserId(1))
            .await
            .unwrap();
        assert_eq!(changes[0].kind, GradeChangeKind::Created);

        let changes = store
            .commit_grades(&[record(1, 1, 1, dec!(14))], UserId(2))
            .await
            .unwrap();
        assert_eq!(changes[0].kind, GradeChangeKind::Updated);
        assert_eq!(changes[0].previous.map(|v| v.value()), Some(dec!(12)));
        assert_eq!(store.grade(key(1, 1, 1)).await.unwrap().entered_by, UserId(2));

        let changes = store
            .commit_grades(&[GradeCommand::Remove { key: key(1, 1, 1) }], UserId(1))
            .await
            .unwrap();
        assert_eq!(changes[0].kind, GradeChangeKind::Deleted);
        assert!(store.grade(key(1, 1, 1)).await.is_none());
    }

    #[tokio::test]
    async fn unchanged_value_and_absent_removal_are_no_ops() {
        let store = MemoryStore::with_demo_directory().await;
        store
            .commit_grades(&[record(1, 1, 1, dec!(12))], UserId(1))
            .await
            .unwrap();

        let changes = store
            .commit_grades(
                &[
                    record(1, 1, 1, dec!(12.00)),
                    GradeCommand::Remove { key: key(1, 2, 1) },
                ],
                UserId(1),
            )
            .await
            .unwrap();
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn invalid_command_rolls_back_the_whole_commit() {
        let store = MemoryStore::with_demo_directory().await;

        let result = store
            .commit_grades(
                &[record(1, 1, 1, dec!(12)), record(1, 99, 1, dec!(13))],
                UserId(1),
            )
            .await;
        assert!(matches!(
            result,
            Err(DbError::NotFound(MissingEntity::Subject(SubjectId(99))))
        ));
        assert!(store.grade(key(1, 1, 1)).await.is_none());
    }

    #[tokio::test]
    async fn scope_holds_roster_and_previous_semester() {
        let store = MemoryStore::with_demo_directory().await;
        store
            .commit_grades(
                &[
                    record(1, 1, 1, dec!(14)),
                    record(1, 1, 2, dec!(16)),
                    record(2, 1, 2, dec!(11)),
                    record(4, 1, 2, dec!(20)),
                ],
                UserId(1),
            )
            .await
            .unwrap();

        let scope = store
            .tables
            .read()
            .await
            .load_scope(StudentId(1), SemesterId(2))
            .unwrap();
        assert_eq!(scope.previous_semester.map(|s| s.id), Some(SemesterId(1)));
        assert_eq!(scope.roster, vec![StudentId(1), StudentId(2), StudentId(3)]);
        // Own grades in both semesters plus the active classmate's; the
        // inactive student is left out.
        assert_eq!(scope.grades.len(), 3);
        assert_eq!(
            scope.grades.get(&key(1, 1, 2)).map(|e| e.coefficient),
            Some(dec!(2.00))
        );
    }

    #[tokio::test]
    async fn scope_for_unknown_entities_is_not_found() {
        let store = MemoryStore::with_demo_directory().await;
        assert!(matches!(
            store.recalculate(StudentId(42), SemesterId(1), &empty_batch).await,
            Err(DbError::NotFound(MissingEntity::Student(StudentId(42))))
        ));
        assert!(matches!(
            store.recalculate(StudentId(1), SemesterId(42), &empty_batch).await,
            Err(DbError::NotFound(MissingEntity::Semester(SemesterId(42))))
        ));
        assert!(store.indicators().await.is_empty());
    }

    #[tokio::test]
    async fn recalculation_prunes_stale_subjects_and_keeps_absent_overall() {
        let store = MemoryStore::with_demo_directory().await;
        write_batch(&store, batch(&[(1, dec!(14)), (2, dec!(12))], Some(dec!(13.14)))).await;
        assert_eq!(store.indicators().await.len(), 3);

        let recalculated = write_batch(&store, batch(&[(1, dec!(15))], None)).await;
        assert_eq!(
            recalculated.applied,
            AppliedIndicators { upserted: 1, removed: 1 }
        );

        let rows = store.indicators().await;
        assert_eq!(rows.len(), 2);
        let overall = rows.iter().find(|i| i.is_overall()).unwrap();
        assert_eq!(overall.average, dec!(13.14));
        let math = rows.iter().find(|i| i.subject_id == Some(SubjectId(1))).unwrap();
        assert_eq!(math.average, dec!(15));
    }

    #[tokio::test]
    async fn class_filter_resolves_through_students() {
        let store = MemoryStore::with_demo_directory().await;
        write_batch(&store, batch(&[(1, dec!(14))], Some(dec!(14)))).await;

        let in_class = store
            .find_indicators(&IndicatorFilter::overall().class(ClassId(1)))
            .await
            .unwrap();
        assert_eq!(in_class.len(), 1);
        let elsewhere = store
            .find_indicators(&IndicatorFilter::default().class(ClassId(2)))
            .await
            .unwrap();
        assert!(elsewhere.is_empty());

        assert_eq!(store.count_active_students(Some(ClassId(1)), None).await.unwrap(), 3);
        assert_eq!(
            store
                .count_active_students(None, Some(StudentId(4)))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::with_demo_directory().await;
        store.set_unavailable(true).await;
        assert!(matches!(
            store.recalculate(StudentId(1), SemesterId(1), &empty_batch).await,
            Err(DbError::Unavailable(_))
        ));
        assert!(matches!(
            store.commit_grades(&[record(1, 1, 1, dec!(10))], UserId(1)).await,
            Err(DbError::Unavailable(_))
        ));

        store.set_unavailable(false).await;
        assert!(
            store
                .recalculate(StudentId(1), SemesterId(1), &empty_batch)
                .await
                .is_ok()
        );
    }
}
