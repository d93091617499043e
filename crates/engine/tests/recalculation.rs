use chrono::NaiveDate;
use core_types::{
    Class, ClassId, Coefficient, GradeKey, GradeValue, PerformanceIndicator, Semester, SemesterId,
    Student, StudentId, Subject, SubjectId, UserId,
};
use async_trait::async_trait;
use database::{
    DbError, DirectoryStore, GradeCommand, GradeWriter, IndicatorBatch, IndicatorFilter,
    IndicatorReader, MemoryStore, PerformanceStore, RecalculatedIndicators, RecalculationScope,
};
use engine::{ChangeTrigger, EngineError, IndicatorOrchestrator, ReportFilter, ReportingQueries};
use events::GradeEventReceiver;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const GRADER: UserId = UserId(100);

struct Harness {
    store: MemoryStore,
    writer: GradeWriter,
    events: GradeEventReceiver,
    orchestrator: Arc<IndicatorOrchestrator>,
    trigger: ChangeTrigger,
}

/// Class 1 holds students 1-3 (active) and 4 (inactive). Subject 1 weighs
/// 2.00, subject 2 weighs 1.50, subjects 3-5 weigh 1.00. Semesters 1 and 2
/// belong to 2024-2025, semester 3 to 2025-2026.
async fn harness() -> Harness {
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
    for id in 1..=4 {
        store
            .upsert_student(&Student {
                id: StudentId(id),
                student_code: format!("STU{id:03}"),
                first_name: format!("First{id}"),
                last_name: format!("Last{id}"),
                class_id: ClassId(1),
                enrollment_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
                is_active: id != 4,
            })
            .await
            .unwrap();
    }
    for (id, code, coefficient) in [
        (1, "MATH", dec!(2.00)),
        (2, "PHYS", dec!(1.50)),
        (3, "HIST", dec!(1.00)),
        (4, "GEO", dec!(1.00)),
        (5, "ENG", dec!(1.00)),
    ] {
        store
            .upsert_subject(&Subject {
                id: SubjectId(id),
                code: code.to_string(),
                name: format!("Subject {code}"),
                coefficient: Coefficient::new(coefficient).unwrap(),
            })
            .await
            .unwrap();
    }
    for (id, year, start) in [
        (1, "2024-2025", (2024, 9, 1)),
        (2, "2024-2025", (2025, 2, 1)),
        (3, "2025-2026", (2025, 9, 1)),
    ] {
        let start_date = NaiveDate::from_ymd_opt(start.0, start.1, start.2).unwrap();
        store
            .upsert_semester(&Semester {
                id: SemesterId(id),
                name: format!("Semester {id}"),
                start_date,
                end_date: start_date + chrono::Duration::days(120),
                academic_year: year.to_string(),
                is_current: false,
            })
            .await
            .unwrap();
    }

    let (publisher, events) = events::channel(64);
    let writer = GradeWriter::new(Arc::new(store.clone()), publisher);
    let orchestrator = Arc::new(IndicatorOrchestrator::new(Arc::new(store.clone())));
    let trigger = ChangeTrigger::new(Arc::clone(&orchestrator));

    Harness {
        store,
        writer,
        events,
        orchestrator,
        trigger,
    }
}

fn key(student: i64, subject: i64, semester: i64) -> GradeKey {
    GradeKey {
        student_id: StudentId(student),
        subject_id: SubjectId(subject),
        semester_id: SemesterId(semester),
    }
}

fn record(student: i64, subject: i64, semester: i64, value: Decimal) -> GradeCommand {
    GradeCommand::Record {
        key: key(student, subject, semester),
        value: GradeValue::new(value).unwrap(),
    }
}

impl Harness {
    /// Commits the commands and lets the trigger process the resulting event.
    async fn commit(&mut self, commands: &[GradeCommand]) -> engine::TriggerOutcome {
        self.writer.commit(commands, GRADER).await.unwrap();
        let event = self.events.recv().await.unwrap();
        self.trigger.handle(&event).await
    }

    async fn overall(&self, student: i64, semester: i64) -> Option<PerformanceIndicator> {
        self.store
            .find_indicators(
                &IndicatorFilter::overall()
                    .student(StudentId(student))
                    .semester(SemesterId(semester)),
            )
            .await
            .unwrap()
            .into_iter()
            .next()
    }

    async fn subject(&self, student: i64, subject: i64, semester: i64) -> Option<PerformanceIndicator> {
        self.store
            .find_indicators(
                &IndicatorFilter::subjects()
                    .student(StudentId(student))
                    .semester(SemesterId(semester))
                    .subject(SubjectId(subject)),
            )
            .await
            .unwrap()
            .into_iter()
            .next()
    }
}

#[tokio::test]
async fn committed_grade_produces_subject_and_overall_indicators() {
    let mut h = harness().await;

    let outcome = h.commit(&[record(1, 3, 1, dec!(15.50))]).await;
    assert_eq!(outcome.recalculated.len(), 1);
    assert!(outcome.failed.is_empty());

    let subject = h.subject(1, 3, 1).await.unwrap();
    assert_eq!(subject.average, dec!(15.50));
    assert_eq!(subject.class_rank, None);
    assert_eq!(subject.standard_deviation, None);

    let overall = h.overall(1, 1).await.unwrap();
    assert_eq!(overall.average, dec!(15.50));
    assert_eq!(overall.class_rank, Some(1));
}

#[tokio::test]
async fn overall_average_is_coefficient_weighted() {
    let mut h = harness().await;
    h.commit(&[record(1, 1, 1, dec!(16.00)), record(1, 2, 1, dec!(14.00))])
        .await;

    let overall = h.overall(1, 1).await.unwrap();
    assert_eq!(overall.average, dec!(15.14));
    assert!(overall.average >= dec!(14.00) && overall.average <= dec!(16.00));
}

#[tokio::test]
async fn progression_compares_with_previous_semester_of_same_year() {
    let mut h = harness().await;
    h.commit(&[record(1, 3, 1, dec!(14.00))]).await;
    h.commit(&[record(1, 3, 2, dec!(16.00)), record(1, 3, 3, dec!(10.00))])
        .await;

    assert_eq!(h.overall(1, 1).await.unwrap().progression_percentage, None);
    assert_eq!(
        h.overall(1, 2).await.unwrap().progression_percentage,
        Some(dec!(14.29))
    );
    // Semester 3 opens a new academic year: no predecessor.
    assert_eq!(h.overall(1, 3).await.unwrap().progression_percentage, None);
}

#[tokio::test]
async fn class_ranks_and_distribution() {
    let mut h = harness().await;
    h.commit(&[
        record(1, 3, 1, dec!(18)),
        record(1, 4, 1, dec!(18)),
        record(1, 5, 1, dec!(18)),
        record(2, 3, 1, dec!(15)),
        record(2, 4, 1, dec!(15)),
        record(2, 5, 1, dec!(14)),
        record(3, 3, 1, dec!(12)),
        record(3, 4, 1, dec!(12)),
        record(3, 5, 1, dec!(12)),
    ])
    .await;

    let expected = [(1, dec!(18.00), 1), (2, dec!(14.67), 2), (3, dec!(12.00), 3)];
    for (student, average, rank) in expected {
        let overall = h.overall(student, 1).await.unwrap();
        assert_eq!(overall.average, average);
        assert_eq!(overall.class_rank, Some(rank));
    }

    let reports = ReportingQueries::new(Arc::new(h.store.clone()));
    let summary = reports
        .summary(&ReportFilter {
            class_id: Some(ClassId(1)),
            semester_id: Some(SemesterId(1)),
            student_id: None,
        })
        .await
        .unwrap();
    assert_eq!(summary.total_students, 3);
    let distribution = summary.performance_distribution;
    assert_eq!(
        (
            distribution.excellent,
            distribution.good,
            distribution.average,
            distribution.poor
        ),
        (1, 1, 1, 0)
    );
}

#[tokio::test]
async fn ranks_form_a_permutation_with_ties_broken_by_id() {
    let mut h = harness().await;
    h.commit(&[
        record(1, 3, 1, dec!(13)),
        record(2, 3, 1, dec!(17)),
        record(3, 3, 1, dec!(13)),
    ])
    .await;
    // A student's own recalculation does not refresh classmates; resync.
    let outcome = h
        .orchestrator
        .recalculate_class(ClassId(1), SemesterId(1))
        .await
        .unwrap();
    assert_eq!(outcome.recalculated.len(), 3);
    assert!(outcome.failed.is_empty());

    let mut ranks = Vec::new();
    for student in 1..=3 {
        ranks.push(h.overall(student, 1).await.unwrap().class_rank.unwrap());
    }
    assert_eq!(ranks, vec![2, 1, 3]);
}

#[tokio::test]
async fn inactive_student_gets_no_rank() {
    let mut h = harness().await;
    h.commit(&[record(1, 3, 1, dec!(10)), record(4, 3, 1, dec!(19))])
        .await;

    assert_eq!(h.overall(4, 1).await.unwrap().class_rank, None);
    assert_eq!(h.overall(1, 1).await.unwrap().class_rank, Some(1));
}

#[tokio::test]
async fn deleting_the_only_grade_removes_the_subject_indicator() {
    let mut h = harness().await;
    h.commit(&[record(1, 3, 1, dec!(12))]).await;
    assert!(h.subject(1, 3, 1).await.is_some());

    let outcome = h
        .commit(&[GradeCommand::Remove {
            key: key(1, 3, 1),
        }])
        .await;
    assert!(outcome.failed.is_empty());

    assert!(h.subject(1, 3, 1).await.is_none());
    // No overall average can be computed; the previous overall row stays.
    assert_eq!(h.overall(1, 1).await.unwrap().average, dec!(12.00));
}

#[tokio::test]
async fn recalculation_is_idempotent() {
    let mut h = harness().await;
    h.commit(&[
        record(1, 1, 1, dec!(11.25)),
        record(1, 2, 1, dec!(17)),
        record(2, 1, 1, dec!(9)),
    ])
    .await;

    let before = h.store.indicators().await;
    h.orchestrator
        .recalculate_all(StudentId(1), SemesterId(1))
        .await
        .unwrap();
    let after = h.store.indicators().await;

    assert_eq!(before.len(), after.len());
    for (a, b) in before.iter().zip(&after) {
        assert!(a.same_values(b), "{a:?} != {b:?}");
    }
}

#[tokio::test]
async fn concurrent_recalculations_of_one_pair_agree() {
    let mut h = harness().await;
    h.commit(&[record(1, 1, 1, dec!(13)), record(2, 1, 1, dec!(15))])
        .await;

    let (a, b) = tokio::join!(
        h.orchestrator.recalculate_all(StudentId(1), SemesterId(1)),
        h.orchestrator.recalculate_all(StudentId(1), SemesterId(1)),
    );
    assert_eq!(a.unwrap().overall, b.unwrap().overall);
    assert_eq!(h.store.indicators().await.len(), 4);
}

/// A store whose derivation step takes `pause`, standing in for a slow
/// recalculation on another process sharing the same database.
struct SlowDerive {
    inner: MemoryStore,
    pause: Duration,
}

#[async_trait]
impl PerformanceStore for SlowDerive {
    async fn recalculate(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
        derive: &(dyn for<'s> Fn(&'s RecalculationScope) -> IndicatorBatch + Send + Sync),
    ) -> Result<RecalculatedIndicators, DbError> {
        let pause = self.pause;
        let slow = move |scope: &RecalculationScope| {
            std::thread::sleep(pause);
            derive(scope)
        };
        self.inner.recalculate(student_id, semester_id, &slow).await
    }

    async fn class_roster(&self, class_id: ClassId) -> Result<Vec<StudentId>, DbError> {
        self.inner.class_roster(class_id).await
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn separate_orchestrators_never_store_a_stale_snapshot() {
    let mut h = harness().await;
    h.commit(&[record(1, 3, 1, dec!(12))]).await;

    let slow = Arc::new(IndicatorOrchestrator::new(Arc::new(SlowDerive {
        inner: h.store.clone(),
        pause: Duration::from_millis(200),
    })));
    let in_flight = tokio::spawn({
        let slow = Arc::clone(&slow);
        async move { slow.recalculate_all(StudentId(1), SemesterId(1)).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The grade changes while the slow recalculation is deriving; the
    // trigger recalculates through the harness's own orchestrator.
    let outcome = h.commit(&[record(1, 3, 1, dec!(18))]).await;
    assert!(outcome.failed.is_empty());
    in_flight.await.unwrap().unwrap();

    assert_eq!(h.store.grade(key(1, 3, 1)).await.unwrap().value.value(), dec!(18));
    assert_eq!(h.overall(1, 1).await.unwrap().average, dec!(18.00));
    assert_eq!(h.subject(1, 3, 1).await.unwrap().average, dec!(18.00));
}

#[tokio::test]
async fn unknown_student_or_semester_is_not_found_and_writes_nothing() {
    let h = harness().await;

    let missing_student = h
        .orchestrator
        .recalculate_all(StudentId(99), SemesterId(1))
        .await;
    assert!(matches!(missing_student, Err(EngineError::NotFound(_))));

    let missing_semester = h
        .orchestrator
        .recalculate_all(StudentId(1), SemesterId(99))
        .await;
    let error = missing_semester.unwrap_err();
    assert!(!error.is_transient());

    assert!(h.store.indicators().await.is_empty());
}

#[tokio::test]
async fn failed_grade_write_publishes_nothing() {
    let mut h = harness().await;

    let result = h
        .writer
        .commit(&[record(1, 3, 1, dec!(12)), record(1, 42, 1, dec!(12))], GRADER)
        .await;
    assert!(result.is_err());
    assert!(h.events.try_recv().is_err());
    assert!(h.store.grade(key(1, 3, 1)).await.is_none());
}

#[tokio::test]
async fn recalculation_failure_keeps_the_committed_grade() {
    let mut h = harness().await;
    h.writer
        .commit(&[record(1, 3, 1, dec!(12))], GRADER)
        .await
        .unwrap();
    let event = h.events.recv().await.unwrap();

    h.store.set_unavailable(true).await;
    let outcome = h.trigger.handle(&event).await;
    h.store.set_unavailable(false).await;

    assert_eq!(outcome.failed, vec![(StudentId(1), SemesterId(1))]);
    assert!(outcome.recalculated.is_empty());
    assert_eq!(
        h.store.grade(key(1, 3, 1)).await.unwrap().value.value(),
        dec!(12.00)
    );
    assert!(h.store.indicators().await.is_empty());
}

#[tokio::test]
async fn one_commit_recalculates_each_pair_once() {
    let mut h = harness().await;
    let outcome = h
        .commit(&[
            record(1, 3, 1, dec!(10)),
            record(1, 4, 1, dec!(11)),
            record(1, 3, 2, dec!(12)),
            record(2, 3, 1, dec!(13)),
        ])
        .await;

    let mut pairs: Vec<(StudentId, SemesterId)> = outcome
        .recalculated
        .iter()
        .map(|s| (s.student_id, s.semester_id))
        .collect();
    pairs.sort();
    assert_eq!(
        pairs,
        vec![
            (StudentId(1), SemesterId(1)),
            (StudentId(1), SemesterId(2)),
            (StudentId(2), SemesterId(1)),
        ]
    );
}

#[tokio::test]
async fn spawned_trigger_drains_the_channel() {
    let h = harness().await;
    let handle = h.trigger.clone().spawn(h.events);

    h.writer
        .commit(&[record(2, 1, 2, dec!(16.5))], GRADER)
        .await
        .unwrap();
    drop(h.writer);
    handle.await.unwrap();

    let overall = h
        .store
        .find_indicators(&IndicatorFilter::overall().student(StudentId(2)))
        .await
        .unwrap();
    assert_eq!(overall.len(), 1);
    assert_eq!(overall[0].average, dec!(16.50));
}

#[tokio::test]
async fn reports_cover_subjects_evolution_and_student_detail() {
    let mut h = harness().await;
    h.commit(&[
        record(1, 3, 1, dec!(12)),
        record(1, 3, 2, dec!(14)),
        record(2, 3, 1, dec!(16)),
        record(1, 4, 2, dec!(10)),
    ])
    .await;
    let reports = ReportingQueries::new(Arc::new(h.store.clone()));

    let by_subject = reports.by_subject(&ReportFilter::default()).await.unwrap();
    let hist = by_subject
        .iter()
        .find(|s| s.subject_code == "HIST")
        .unwrap();
    assert_eq!(hist.student_count, 3);
    assert_eq!(hist.average, dec!(14.00));

    let evolution = reports
        .evolution(&ReportFilter {
            student_id: Some(StudentId(1)),
            ..ReportFilter::default()
        })
        .await
        .unwrap();
    let series: Vec<(SemesterId, Decimal)> =
        evolution.iter().map(|p| (p.semester_id, p.average)).collect();
    assert_eq!(
        series,
        vec![(SemesterId(1), dec!(12.00)), (SemesterId(2), dec!(12.00))]
    );

    let detail = reports.student_detail(StudentId(1)).await.unwrap();
    assert_eq!(detail.student.id, StudentId(1));
    assert_eq!(detail.class.id, ClassId(1));
    assert_eq!(detail.grades.len(), 3);
    assert_eq!(detail.charts_data.performance_evolution.len(), 2);

    assert!(matches!(
        reports.student_detail(StudentId(77)).await,
        Err(EngineError::NotFound(_))
    ));
}
