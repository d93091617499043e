use crate::error::EngineError;
use analytics::report::{self, DashboardSummary, EvolutionPoint, SubjectPerformance};
use analytics::StudentPerformanceDetail;
use core_types::{ClassId, SemesterId, StudentId};
use database::{IndicatorFilter, IndicatorReader, IndicatorScope};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Narrows a report to a class, a semester and/or a single student.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
    pub class_id: Option<ClassId>,
    pub semester_id: Option<SemesterId>,
    pub student_id: Option<StudentId>,
}

impl ReportFilter {
    fn indicators(&self, scope: IndicatorScope) -> IndicatorFilter {
        IndicatorFilter {
            student_id: self.student_id,
            semester_id: self.semester_id,
            subject_id: None,
            class_id: self.class_id,
            scope,
        }
    }
}

/// Read-only rollups over the stored indicators.
#[derive(Clone)]
pub struct ReportingQueries {
    reader: Arc<dyn IndicatorReader>,
}

impl ReportingQueries {
    pub fn new(reader: Arc<dyn IndicatorReader>) -> Self {
        Self { reader }
    }

    pub async fn summary(&self, filter: &ReportFilter) -> Result<DashboardSummary, EngineError> {
        let total_students = self
            .reader
            .count_active_students(filter.class_id, filter.student_id)
            .await?;
        let overall = self
            .reader
            .find_indicators(&filter.indicators(IndicatorScope::Overall))
            .await?;
        Ok(report::summarize(total_students, &overall))
    }

    pub async fn by_subject(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<SubjectPerformance>, EngineError> {
        let records = self
            .reader
            .find_indicator_records(&filter.indicators(IndicatorScope::Subjects))
            .await?;
        Ok(report::performance_by_subject(&records))
    }

    pub async fn evolution(&self, filter: &ReportFilter) -> Result<Vec<EvolutionPoint>, EngineError> {
        let records = self
            .reader
            .find_indicator_records(&filter.indicators(IndicatorScope::Overall))
            .await?;
        Ok(report::performance_evolution(&records))
    }

    /// Everything known about one student. `EngineError::NotFound` if the
    /// student does not exist.
    pub async fn student_detail(
        &self,
        student_id: StudentId,
    ) -> Result<StudentPerformanceDetail, EngineError> {
        let (student, class) = self.reader.student_with_class(student_id).await?;
        let grades = self.reader.grade_records(student_id).await?;
        let indicators = self
            .reader
            .find_indicator_records(&IndicatorFilter::default().student(student_id))
            .await?;
        Ok(report::student_detail(student, class, grades, indicators))
    }
}
