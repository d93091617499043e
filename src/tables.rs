//! Console rendering for the CLI.

use analytics::{
    DashboardSummary, EvolutionPoint, GradeRecord, IndicatorRecord, SubjectPerformance,
};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use core_types::PerformanceBand;
use engine::RecalculationSummary;
use rust_decimal::Decimal;

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn band(average: Decimal) -> &'static str {
    match PerformanceBand::from_average(average) {
        PerformanceBand::Excellent => "excellent",
        PerformanceBand::Good => "good",
        PerformanceBand::Average => "average",
        PerformanceBand::Poor => "poor",
    }
}

pub fn recalculations(summaries: &[RecalculationSummary]) -> Table {
    let mut table = table(vec![
        "Student", "Semester", "Subjects", "Removed", "Average", "Std dev", "Progression %", "Rank",
    ]);
    for s in summaries {
        table.add_row(vec![
            s.student_id.to_string(),
            s.semester_id.to_string(),
            s.subject_indicators.to_string(),
            s.removed.to_string(),
            optional(s.overall.map(|o| o.average)),
            optional(s.overall.and_then(|o| o.standard_deviation)),
            optional(s.overall.and_then(|o| o.progression_percentage)),
            optional(s.overall.and_then(|o| o.class_rank)),
        ]);
    }
    table
}

pub fn indicators(records: &[IndicatorRecord]) -> Table {
    let mut table = table(vec![
        "Student", "Semester", "Subject", "Average", "Std dev", "Progression %", "Rank",
        "Calculated at",
    ]);
    for record in records {
        let indicator = &record.indicator;
        table.add_row(vec![
            indicator.student_id.to_string(),
            record.semester.name.clone(),
            record
                .subject
                .as_ref()
                .map(|s| s.code.clone())
                .unwrap_or_else(|| "overall".to_string()),
            indicator.average.to_string(),
            optional(indicator.standard_deviation),
            optional(indicator.progression_percentage),
            optional(indicator.class_rank),
            indicator.calculated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    table
}

pub fn grades(records: &[GradeRecord]) -> Table {
    let mut table = table(vec!["Semester", "Subject", "Coefficient", "Grade", "Entered by"]);
    for record in records {
        table.add_row(vec![
            record.semester.name.clone(),
            record.subject.name.clone(),
            record.subject.coefficient.value().to_string(),
            record.grade.value.to_string(),
            record.grade.entered_by.to_string(),
        ]);
    }
    table
}

pub fn summary(summary: &DashboardSummary) -> Table {
    let distribution = &summary.performance_distribution;
    let mut table = table(vec!["Metric", "Value"]);
    table
        .add_row(vec!["Active students".to_string(), summary.total_students.to_string()])
        .add_row(vec![
            format!("Overall average ({})", band(summary.overall_average)),
            summary.overall_average.to_string(),
        ])
        .add_row(vec![
            "Progression rate %".to_string(),
            summary.progression_rate.to_string(),
        ])
        .add_row(vec!["Excellent (>= 16)".to_string(), distribution.excellent.to_string()])
        .add_row(vec!["Good [14, 16)".to_string(), distribution.good.to_string()])
        .add_row(vec!["Average [10, 14)".to_string(), distribution.average.to_string()])
        .add_row(vec!["Poor (< 10)".to_string(), distribution.poor.to_string()]);
    table
}

pub fn subjects(rows: &[SubjectPerformance]) -> Table {
    let mut table = table(vec!["Code", "Subject", "Average", "Students"]);
    for row in rows {
        table.add_row(vec![
            row.subject_code.clone(),
            row.subject_name.clone(),
            row.average.to_string(),
            row.student_count.to_string(),
        ]);
    }
    table
}

pub fn evolution(points: &[EvolutionPoint]) -> Table {
    let mut table = table(vec!["Semester", "Start", "Average"]);
    for point in points {
        table.add_row(vec![
            point.semester_name.clone(),
            point.start_date.to_string(),
            point.average.to_string(),
        ]);
    }
    table
}
