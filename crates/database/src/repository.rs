use crate::error::{DbError, MissingEntity};
use crate::models::{
    AppliedIndicators, GradeCommand, IndicatorBatch, IndicatorFilter, IndicatorScope,
    RecalculatedIndicators, RecalculationScope,
};
use crate::store::{DirectoryStore, GradeStore, IndicatorReader, PerformanceStore};
use analytics::{GradeBook, GradeEntry, GradeRecord, IndicatorRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_types::{
    Class, ClassId, Grade, GradeKey, GradeValue, PerformanceIndicator, Semester, SemesterId,
    Student, StudentId, Subject, SubjectId, UserId,
};
use events::GradeChange;
use rust_decimal::Decimal;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::{Connection, FromRow, PgConnection, QueryBuilder};
use std::collections::BTreeMap;

const STUDENT_COLUMNS: &str =
    "id, student_code, first_name, last_name, class_id, enrollment_date, is_active";
const SEMESTER_COLUMNS: &str = "id, name, start_date, end_date, academic_year, is_current";

/// The `DbRepository` provides the PostgreSQL implementation of every store
/// trait. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

// A row of `performance_indicators`. Ranks are stored as INTEGER.
#[derive(Debug, FromRow)]
struct IndicatorRow {
    student_id: StudentId,
    semester_id: SemesterId,
    subject_id: Option<SubjectId>,
    average: Decimal,
    standard_deviation: Option<Decimal>,
    progression_percentage: Option<Decimal>,
    class_rank: Option<i32>,
    calculated_at: DateTime<Utc>,
}

impl From<IndicatorRow> for PerformanceIndicator {
    fn from(row: IndicatorRow) -> Self {
        PerformanceIndicator {
            student_id: row.student_id,
            semester_id: row.semester_id,
            subject_id: row.subject_id,
            average: row.average,
            standard_deviation: row.standard_deviation,
            progression_percentage: row.progression_percentage,
            class_rank: row.class_rank.and_then(|rank| u32::try_from(rank).ok()),
            calculated_at: row.calculated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct GradeRow {
    student_id: StudentId,
    subject_id: SubjectId,
    semester_id: SemesterId,
    value: Decimal,
    entered_by: UserId,
    entered_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<GradeRow> for Grade {
    type Error = DbError;

    fn try_from(row: GradeRow) -> Result<Self, Self::Error> {
        Ok(Grade {
            key: GradeKey {
                student_id: row.student_id,
                subject_id: row.subject_id,
                semester_id: row.semester_id,
            },
            value: GradeValue::new(row.value)?,
            entered_by: row.entered_by,
            entered_at: row.entered_at,
            updated_at: row.updated_at,
        })
    }
}

// A grade joined with its subject's coefficient, as loaded into a snapshot.
#[derive(Debug, FromRow)]
struct WeightedGradeRow {
    student_id: StudentId,
    subject_id: SubjectId,
    semester_id: SemesterId,
    value: Decimal,
    coefficient: Decimal,
}

// A pooled connection holding a pair's session advisory lock. If the lock
// is still held on drop the connection is closed instead of pooled, which
// releases the lock server-side.
struct PairLock {
    conn: PoolConnection<Postgres>,
    key: String,
    held: bool,
}

impl Drop for PairLock {
    fn drop(&mut self) {
        if self.held {
            self.conn.close_on_drop();
        }
    }
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_student(
        conn: &mut PgConnection,
        student_id: StudentId,
    ) -> Result<Student, DbError> {
        sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = $1"
        ))
        .bind(student_id)
        .fetch_optional(conn)
        .await?
        .ok_or(DbError::NotFound(MissingEntity::Student(student_id)))
    }

    async fn fetch_semester(
        conn: &mut PgConnection,
        semester_id: SemesterId,
    ) -> Result<Semester, DbError> {
        sqlx::query_as::<_, Semester>(&format!(
            "SELECT {SEMESTER_COLUMNS} FROM semesters WHERE id = $1"
        ))
        .bind(semester_id)
        .fetch_optional(conn)
        .await?
        .ok_or(DbError::NotFound(MissingEntity::Semester(semester_id)))
    }

    /// Subjects and semesters by id, for joining rows in memory.
    async fn lookup_tables(
        &self,
        subject_ids: Vec<i64>,
        semester_ids: Vec<i64>,
    ) -> Result<(BTreeMap<SubjectId, Subject>, BTreeMap<SemesterId, Semester>), DbError> {
        let subjects: BTreeMap<SubjectId, Subject> = sqlx::query_as::<_, Subject>(
            "SELECT id, code, name, coefficient FROM subjects WHERE id = ANY($1)",
        )
        .bind(subject_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

        let semesters: BTreeMap<SemesterId, Semester> = sqlx::query_as::<_, Semester>(&format!(
            "SELECT {SEMESTER_COLUMNS} FROM semesters WHERE id = ANY($1)"
        ))
        .bind(semester_ids)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

        Ok((subjects, semesters))
    }

    /// Locks the grade row for the rest of the transaction and returns its value.
    async fn locked_grade_value(
        conn: &mut PgConnection,
        key: &GradeKey,
    ) -> Result<Option<GradeValue>, DbError> {
        let value: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT value FROM grades
            WHERE student_id = $1 AND subject_id = $2 AND semester_id = $3
            FOR UPDATE
            "#,
        )
        .bind(key.student_id)
        .bind(key.subject_id)
        .bind(key.semester_id)
        .fetch_optional(conn)
        .await?;
        Ok(value.map(GradeValue::new).transpose()?)
    }

    async fn check_grade_key(conn: &mut PgConnection, key: &GradeKey) -> Result<(), DbError> {
        let (student, subject, semester): (bool, bool, bool) = sqlx::query_as(
            r#"
            SELECT
                EXISTS (SELECT 1 FROM students WHERE id = $1),
                EXISTS (SELECT 1 FROM subjects WHERE id = $2),
                EXISTS (SELECT 1 FROM semesters WHERE id = $3)
            "#,
        )
        .bind(key.student_id)
        .bind(key.subject_id)
        .bind(key.semester_id)
        .fetch_one(conn)
        .await?;

        if !student {
            return Err(DbError::NotFound(MissingEntity::Student(key.student_id)));
        }
        if !subject {
            return Err(DbError::NotFound(MissingEntity::Subject(key.subject_id)));
        }
        if !semester {
            return Err(DbError::NotFound(MissingEntity::Semester(key.semester_id)));
        }
        Ok(())
    }

    /// Loads everything a recalculation reads. Runs inside the caller's
    /// transaction so every read sees the same snapshot.
    async fn load_scope(
        conn: &mut PgConnection,
        student_id: StudentId,
        semester_id: SemesterId,
    ) -> Result<RecalculationScope, DbError> {
        let student = Self::fetch_student(conn, student_id).await?;
        let semester = Self::fetch_semester(conn, semester_id).await?;

        let previous_semester = sqlx::query_as::<_, Semester>(&format!(
            r#"
            SELECT {SEMESTER_COLUMNS} FROM semesters
            WHERE academic_year = $1 AND start_date < $2
            ORDER BY start_date DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(&semester.academic_year)
        .bind(semester.start_date)
        .fetch_optional(&mut *conn)
        .await?;

        let roster: Vec<StudentId> = sqlx::query_scalar(
            "SELECT id FROM students WHERE class_id = $1 AND is_active ORDER BY id",
        )
        .bind(student.class_id)
        .fetch_all(&mut *conn)
        .await?;
        let roster_ids: Vec<i64> = roster.iter().map(|id| id.0).collect();

        let rows = sqlx::query_as::<_, WeightedGradeRow>(
            r#"
            SELECT g.student_id, g.subject_id, g.semester_id, g.value, s.coefficient
            FROM grades AS g
            JOIN subjects AS s ON s.id = g.subject_id
            WHERE (g.semester_id = $1 AND (g.student_id = ANY($2) OR g.student_id = $3))
               OR (g.student_id = $3 AND g.semester_id = $4)
            "#,
        )
        .bind(semester_id)
        .bind(roster_ids)
        .bind(student_id)
        .bind(previous_semester.as_ref().map(|s| s.id))
        .fetch_all(&mut *conn)
        .await?;

        let grades: GradeBook = rows
            .into_iter()
            .map(|row| {
                GradeEntry::new(
                    GradeKey {
                        student_id: row.student_id,
                        subject_id: row.subject_id,
                        semester_id: row.semester_id,
                    },
                    row.value,
                    row.coefficient,
                )
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

    /// Replaces the pair's indicators with `batch`. Subject rows missing from
    /// the batch are deleted and an absent overall row is left alone.
    async fn apply_batch(
        conn: &mut PgConnection,
        batch: &IndicatorBatch,
    ) -> Result<AppliedIndicators, DbError> {
        let kept: Vec<i64> = batch.subject_ids().into_iter().map(|id| id.0).collect();
        let removed = sqlx::query(
            r#"
            DELETE FROM performance_indicators
            WHERE student_id = $1 AND semester_id = $2
              AND subject_id IS NOT NULL
              AND NOT (subject_id = ANY($3))
            "#,
        )
        .bind(batch.student_id)
        .bind(batch.semester_id)
        .bind(kept)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        let mut upserted = 0;
        for write in &batch.subject_averages {
            sqlx::query(
                r#"
                INSERT INTO performance_indicators
                    (student_id, semester_id, subject_id, average, calculated_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (student_id, semester_id, subject_id) WHERE subject_id IS NOT NULL
                DO UPDATE SET average = EXCLUDED.average, calculated_at = EXCLUDED.calculated_at
                "#,
            )
            .bind(batch.student_id)
            .bind(batch.semester_id)
            .bind(write.subject_id)
            .bind(write.average)
            .bind(batch.calculated_at)
            .execute(&mut *conn)
            .await?;
            upserted += 1;
        }

        if let Some(overall) = &batch.overall {
            sqlx::query(
                r#"
                INSERT INTO performance_indicators (
                    student_id, semester_id, subject_id, average, standard_deviation,
                    progression_percentage, class_rank, calculated_at
                ) VALUES ($1, $2, NULL, $3, $4, $5, $6, $7)
                ON CONFLICT (student_id, semester_id) WHERE subject_id IS NULL
                DO UPDATE SET
                    average = EXCLUDED.average,
                    standard_deviation = EXCLUDED.standard_deviation,
                    progression_percentage = EXCLUDED.progression_percentage,
                    class_rank = EXCLUDED.class_rank,
                    calculated_at = EXCLUDED.calculated_at
                "#,
            )
            .bind(batch.student_id)
            .bind(batch.semester_id)
            .bind(overall.average)
            .bind(overall.standard_deviation)
            .bind(overall.progression_percentage)
            .bind(overall.class_rank.and_then(|rank| i32::try_from(rank).ok()))
            .bind(batch.calculated_at)
            .execute(&mut *conn)
            .await?;
            upserted += 1;
        }

        Ok(AppliedIndicators {
            upserted,
            removed: removed as usize,
        })
    }

    /// Snapshot, derive and write in one REPEATABLE READ transaction. The
    /// caller holds the pair's advisory lock, so the snapshot is taken after
    /// every earlier writer of the pair has committed.
    async fn recalculate_locked(
        conn: &mut PgConnection,
        student_id: StudentId,
        semester_id: SemesterId,
        derive: &(dyn for<'s> Fn(&'s RecalculationScope) -> IndicatorBatch + Send + Sync),
    ) -> Result<RecalculatedIndicators, DbError> {
        // Dropping `tx` on an early return rolls everything back.
        let mut tx = conn.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;

        let scope = Self::load_scope(&mut tx, student_id, semester_id).await?;
        let batch = derive(&scope);
        let applied = Self::apply_batch(&mut tx, &batch).await?;
        tx.commit().await?;

        Ok(RecalculatedIndicators { batch, applied })
    }
}

fn push_indicator_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &IndicatorFilter) {
    builder.push(" WHERE TRUE");
    if let Some(id) = filter.student_id {
        builder.push(" AND pi.student_id = ").push_bind(id);
    }
    if let Some(id) = filter.semester_id {
        builder.push(" AND pi.semester_id = ").push_bind(id);
    }
    if let Some(id) = filter.subject_id {
        builder.push(" AND pi.subject_id = ").push_bind(id);
    }
    if let Some(id) = filter.class_id {
        builder.push(" AND st.class_id = ").push_bind(id);
    }
    match filter.scope {
        IndicatorScope::All => {}
        IndicatorScope::Overall => {
            builder.push(" AND pi.subject_id IS NULL");
        }
        IndicatorScope::Subjects => {
            builder.push(" AND pi.subject_id IS NOT NULL");
        }
    }
}

#[async_trait]
impl PerformanceStore for DbRepository {
    async fn recalculate(
        &self,
        student_id: StudentId,
        semester_id: SemesterId,
        derive: &(dyn for<'s> Fn(&'s RecalculationScope) -> IndicatorBatch + Send + Sync),
    ) -> Result<RecalculatedIndicators, DbError> {
        let mut lock = PairLock {
            conn: self.pool.acquire().await?,
            key: format!("{student_id}:{semester_id}"),
            held: false,
        };

        // A session lock, taken before the transaction starts. A transaction
        // lock would be granted only after the snapshot was already fixed.
        sqlx::query("SELECT pg_advisory_lock(hashtextextended($1, 0))")
            .bind(&lock.key)
            .execute(&mut *lock.conn)
            .await?;
        lock.held = true;

        let result =
            Self::recalculate_locked(&mut lock.conn, student_id, semester_id, derive).await;

        match sqlx::query("SELECT pg_advisory_unlock(hashtextextended($1, 0))")
            .bind(&lock.key)
            .execute(&mut *lock.conn)
            .await
        {
            Ok(_) => lock.held = false,
            Err(e) => {
                tracing::warn!(lock = %lock.key, error = %e, "Failed to release recalculation lock.");
            }
        }

        result
    }

    async fn class_roster(&self, class_id: ClassId) -> Result<Vec<StudentId>, DbError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM classes WHERE id = $1)")
            .bind(class_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(DbError::NotFound(MissingEntity::Class(class_id)));
        }

        let roster = sqlx::query_scalar(
            "SELECT id FROM students WHERE class_id = $1 AND is_active ORDER BY id",
        )
        .bind(class_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(roster)
    }
}

#[async_trait]
impl IndicatorReader for DbRepository {
    async fn find_indicators(
        &self,
        filter: &IndicatorFilter,
    ) -> Result<Vec<PerformanceIndicator>, DbError> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT pi.student_id, pi.semester_id, pi.subject_id, pi.average,
                   pi.standard_deviation, pi.progression_percentage, pi.class_rank,
                   pi.calculated_at
            FROM performance_indicators AS pi
            JOIN students AS st ON st.id = pi.student_id
            "#,
        );
        push_indicator_filter(&mut builder, filter);
        builder.push(" ORDER BY pi.calculated_at DESC, pi.id");

        let rows = builder
            .build_query_as::<IndicatorRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PerformanceIndicator::from).collect())
    }

    async fn find_indicator_records(
        &self,
        filter: &IndicatorFilter,
    ) -> Result<Vec<IndicatorRecord>, DbError> {
        let indicators = self.find_indicators(filter).await?;
        let subject_ids = indicators.iter().filter_map(|i| i.subject_id).map(|id| id.0).collect();
        let semester_ids = indicators.iter().map(|i| i.semester_id.0).collect();
        let (subjects, semesters) = self.lookup_tables(subject_ids, semester_ids).await?;

        indicators
            .into_iter()
            .map(|indicator| -> Result<IndicatorRecord, DbError> {
                let semester = semesters
                    .get(&indicator.semester_id)
                    .cloned()
                    .ok_or(DbError::NotFound(MissingEntity::Semester(indicator.semester_id)))?;
                let subject = match indicator.subject_id {
                    Some(id) => Some(
                        subjects
                            .get(&id)
                            .cloned()
                            .ok_or(DbError::NotFound(MissingEntity::Subject(id)))?,
                    ),
                    None => None,
                };
                Ok(IndicatorRecord {
                    indicator,
                    semester,
                    subject,
                })
            })
            .collect()
    }

    async fn count_active_students(
        &self,
        class_id: Option<ClassId>,
        student_id: Option<StudentId>,
    ) -> Result<usize, DbError> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM students WHERE is_active");
        if let Some(id) = class_id {
            builder.push(" AND class_id = ").push_bind(id);
        }
        if let Some(id) = student_id {
            builder.push(" AND id = ").push_bind(id);
        }

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn student_with_class(&self, student_id: StudentId) -> Result<(Student, Class), DbError> {
        let mut conn = self.pool.acquire().await?;
        let student = Self::fetch_student(&mut conn, student_id).await?;
        let class = sqlx::query_as::<_, Class>(
            "SELECT id, name, level, academic_year FROM classes WHERE id = $1",
        )
        .bind(student.class_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(DbError::NotFound(MissingEntity::Class(student.class_id)))?;
        Ok((student, class))
    }

    async fn grade_records(&self, student_id: StudentId) -> Result<Vec<GradeRecord>, DbError> {
        let rows = sqlx::query_as::<_, GradeRow>(
            r#"
            SELECT student_id, subject_id, semester_id, value, entered_by, entered_at, updated_at
            FROM grades
            WHERE student_id = $1
            "#,
        )
        .bind(student_id)
        .fetch_all(&self.pool)
        .await?;

        let subject_ids = rows.iter().map(|r| r.subject_id.0).collect();
        let semester_ids = rows.iter().map(|r| r.semester_id.0).collect();
        let (subjects, semesters) = self.lookup_tables(subject_ids, semester_ids).await?;

        rows.into_iter()
            .map(|row| -> Result<GradeRecord, DbError> {
                let subject = subjects
                    .get(&row.subject_id)
                    .cloned()
                    .ok_or(DbError::NotFound(MissingEntity::Subject(row.subject_id)))?;
                let semester = semesters
                    .get(&row.semester_id)
                    .cloned()
                    .ok_or(DbError::NotFound(MissingEntity::Semester(row.semester_id)))?;
                Ok(GradeRecord {
                    grade: Grade::try_from(row)?,
                    subject,
                    semester,
                })
            })
            .collect()
    }
}

#[async_trait]
impl GradeStore for DbRepository {
    async fn commit_grades(
        &self,
        commands: &[GradeCommand],
        actor: UserId,
    ) -> Result<Vec<GradeChange>, DbError> {
        // Dropping `tx` on an early return rolls everything back.
        let mut tx = self.pool.begin().await?;
        let mut changes = Vec::new();

        for command in commands {
            let key = command.key();
            Self::check_grade_key(&mut tx, &key).await?;

            match *command {
                GradeCommand::Record { key, value } => {
                    match Self::locked_grade_value(&mut tx, &key).await? {
                        Some(existing) if existing == value => {}
                        Some(existing) => {
                            sqlx::query(
                                r#"
                                UPDATE grades
                                SET value = $4, entered_by = $5, updated_at = NOW()
                                WHERE student_id = $1 AND subject_id = $2 AND semester_id = $3
                                "#,
                            )
                            .bind(key.student_id)
                            .bind(key.subject_id)
                            .bind(key.semester_id)
                            .bind(value.value())
                            .bind(actor)
                            .execute(&mut *tx)
                            .await?;
                            changes.push(GradeChange::updated(key, existing, value));
                        }
                        None => {
                            sqlx::query(
                                r#"
                                INSERT INTO grades (student_id, subject_id, semester_id, value, entered_by)
                                VALUES ($1, $2, $3, $4, $5)
                                "#,
                            )
                            .bind(key.student_id)
                            .bind(key.subject_id)
                            .bind(key.semester_id)
                            .bind(value.value())
                            .bind(actor)
                            .execute(&mut *tx)
                            .await?;
                            changes.push(GradeChange::created(key, value));
                        }
                    }
                }
                GradeCommand::Remove { key } => {
                    let removed: Option<Decimal> = sqlx::query_scalar(
                        r#"
                        DELETE FROM grades
                        WHERE student_id = $1 AND subject_id = $2 AND semester_id = $3
                        RETURNING value
                        "#,
                    )
                    .bind(key.student_id)
                    .bind(key.subject_id)
                    .bind(key.semester_id)
                    .fetch_optional(&mut *tx)
                    .await?;
                    if let Some(previous) = removed {
                        changes.push(GradeChange::deleted(key, GradeValue::new(previous)?));
                    }
                }
            }
        }

        tx.commit().await?;
        Ok(changes)
    }
}

#[async_trait]
impl DirectoryStore for DbRepository {
    async fn upsert_class(&self, class: &Class) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO classes (id, name, level, academic_year)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                level = EXCLUDED.level,
                academic_year = EXCLUDED.academic_year
            "#,
        )
        .bind(class.id)
        .bind(&class.name)
        .bind(&class.level)
        .bind(&class.academic_year)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_student(&self, student: &Student) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO students
                (id, student_code, first_name, last_name, class_id, enrollment_date, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                student_code = EXCLUDED.student_code,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                class_id = EXCLUDED.class_id,
                enrollment_date = EXCLUDED.enrollment_date,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(student.id)
        .bind(&student.student_code)
        .bind(&student.first_name)
        .bind(&student.last_name)
        .bind(student.class_id)
        .bind(student.enrollment_date)
        .bind(student.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_subject(&self, subject: &Subject) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO subjects (id, code, name, coefficient)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE SET
                code = EXCLUDED.code,
                name = EXCLUDED.name,
                coefficient = EXCLUDED.coefficient
            "#,
        )
        .bind(subject.id)
        .bind(&subject.code)
        .bind(&subject.name)
        .bind(subject.coefficient.value())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_semester(&self, semester: &Semester) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO semesters (id, name, start_date, end_date, academic_year, is_current)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                start_date = EXCLUDED.start_date,
                end_date = EXCLUDED.end_date,
                academic_year = EXCLUDED.academic_year,
                is_current = EXCLUDED.is_current
            "#,
        )
        .bind(semester.id)
        .bind(&semester.name)
        .bind(semester.start_date)
        .bind(semester.end_date)
        .bind(&semester.academic_year)
        .bind(semester.is_current)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
