use chrono::NaiveDate;
use core_types::{
    round_half_even, Class, Grade, PerformanceBand, PerformanceIndicator, Semester, SemesterId,
    Student, Subject, SubjectId,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An indicator joined with the semester and (for subject indicators) the
/// subject it refers to. This is the row shape the reporting rollups read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub indicator: PerformanceIndicator,
    pub semester: Semester,
    pub subject: Option<Subject>,
}

/// A grade joined with its subject and semester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeRecord {
    pub grade: Grade,
    pub subject: Subject,
    pub semester: Semester,
}

/// Count of overall indicators per performance band.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceDistribution {
    pub excellent: usize,
    pub good: usize,
    pub average: usize,
    pub poor: usize,
}

impl PerformanceDistribution {
    pub fn record(&mut self, average: Decimal) {
        match PerformanceBand::from_average(average) {
            PerformanceBand::Excellent => self.excellent += 1,
            PerformanceBand::Good => self.good += 1,
            PerformanceBand::Average => self.average += 1,
            PerformanceBand::Poor => self.poor += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.excellent + self.good + self.average + self.poor
    }
}

/// Dashboard headline figures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_students: usize,
    /// Mean of the overall averages; zero when there are none.
    pub overall_average: Decimal,
    /// Mean of the non-null progressions; zero when there are none.
    pub progression_rate: Decimal,
    pub performance_distribution: PerformanceDistribution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPerformance {
    pub subject_id: SubjectId,
    pub subject_code: String,
    pub subject_name: String,
    pub average: Decimal,
    pub student_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionPoint {
    pub semester_id: SemesterId,
    pub semester_name: String,
    pub start_date: NaiveDate,
    pub average: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAverage {
    pub subject: String,
    pub average: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvolutionSample {
    pub semester: String,
    pub average: Decimal,
}

/// Chart-ready series for the student detail page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartsData {
    pub performance_by_subject: Vec<SubjectAverage>,
    pub performance_evolution: Vec<EvolutionSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentPerformanceDetail {
    pub student: Student,
    pub class: Class,
    pub grades: Vec<GradeRecord>,
    pub indicators: Vec<IndicatorRecord>,
    pub charts_data: ChartsData,
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    Some(round_half_even(
        values.iter().sum::<Decimal>() / Decimal::from(values.len()),
    ))
}

/// Builds the dashboard summary from overall indicators. Subject indicators
/// in `overall` are ignored.
pub fn summarize(total_students: usize, overall: &[PerformanceIndicator]) -> DashboardSummary {
    let mut distribution = PerformanceDistribution::default();
    let mut averages = Vec::new();
    let mut progressions = Vec::new();

    for indicator in overall.iter().filter(|i| i.is_overall()) {
        distribution.record(indicator.average);
        averages.push(indicator.average);
        if let Some(progression) = indicator.progression_percentage {
            progressions.push(progression);
        }
    }

    DashboardSummary {
        total_students,
        overall_average: mean(&averages).unwrap_or(Decimal::ZERO),
        progression_rate: mean(&progressions).unwrap_or(Decimal::ZERO),
        performance_distribution: distribution,
    }
}

/// Mean subject indicator per subject, sorted by subject name.
pub fn performance_by_subject(records: &[IndicatorRecord]) -> Vec<SubjectPerformance> {
    let mut by_subject: BTreeMap<SubjectId, (&Subject, Vec<Decimal>)> = BTreeMap::new();
    for record in records {
        if let Some(subject) = &record.subject {
            by_subject
                .entry(subject.id)
                .or_insert_with(|| (subject, Vec::new()))
                .1
                .push(record.indicator.average);
        }
    }

    let mut result: Vec<SubjectPerformance> = by_subject
        .into_values()
        .map(|(subject, averages)| SubjectPerformance {
            subject_id: subject.id,
            subject_code: subject.code.clone(),
            subject_name: subject.name.clone(),
            average: mean(&averages).unwrap_or(Decimal::ZERO),
            student_count: averages.len(),
        })
        .collect();
    result.sort_by(|a, b| a.subject_name.cmp(&b.subject_name));
    result
}

/// Mean overall indicator per semester, sorted by semester start date.
pub fn performance_evolution(records: &[IndicatorRecord]) -> Vec<EvolutionPoint> {
    let mut by_semester: BTreeMap<SemesterId, (&Semester, Vec<Decimal>)> = BTreeMap::new();
    for record in records.iter().filter(|r| r.indicator.is_overall()) {
        by_semester
            .entry(record.semester.id)
            .or_insert_with(|| (&record.semester, Vec::new()))
            .1
            .push(record.indicator.average);
    }

    let mut result: Vec<EvolutionPoint> = by_semester
        .into_values()
        .map(|(semester, averages)| EvolutionPoint {
            semester_id: semester.id,
            semester_name: semester.name.clone(),
            start_date: semester.start_date,
            average: mean(&averages).unwrap_or(Decimal::ZERO),
        })
        .collect();
    result.sort_by_key(|point| (point.start_date, point.semester_id));
    result
}

/// Assembles the per-student page: grades ordered by semester start then
/// subject name, indicators ordered by semester start, and chart series.
pub fn student_detail(
    student: Student,
    class: Class,
    mut grades: Vec<GradeRecord>,
    mut indicators: Vec<IndicatorRecord>,
) -> StudentPerformanceDetail {
    grades.sort_by(|a, b| {
        (a.semester.start_date, &a.subject.name).cmp(&(b.semester.start_date, &b.subject.name))
    });
    indicators.sort_by_key(|r| (r.semester.start_date, r.indicator.subject_id));

    let mut per_subject: BTreeMap<&str, Vec<Decimal>> = BTreeMap::new();
    let mut evolution = Vec::new();
    for record in &indicators {
        match &record.subject {
            Some(subject) => per_subject
                .entry(subject.name.as_str())
                .or_default()
                .push(record.indicator.average),
            None => evolution.push(EvolutionSample {
                semester: record.semester.name.clone(),
                average: record.indicator.average,
            }),
        }
    }

    let performance_by_subject = per_subject
        .into_iter()
        .map(|(name, averages)| SubjectAverage {
            subject: name.to_string(),
            average: mean(&averages).unwrap_or(Decimal::ZERO),
        })
        .collect();

    StudentPerformanceDetail {
        student,
        class,
        grades,
        indicators,
        charts_data: ChartsData {
            performance_by_subject,
            performance_evolution: evolution,
        },
    }
}
